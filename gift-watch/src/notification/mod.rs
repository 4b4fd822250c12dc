//! Channel notifications.
//!
//! Renders catalog events into HTML messages and posts them to the
//! configured channel, sticker first with the text threaded underneath.

mod notifier;
mod render;

pub use notifier::{DeliveryOutcome, Notifier, NotifierConfig};
pub use render::{TELEGRAM_MESSAGE_LIMIT, escape_html, render_digest, render_event};

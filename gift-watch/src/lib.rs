//! gift-watch library crate.
//!
//! Polls the Telegram gift catalog, keeps a persisted record of what was
//! already seen and announced, mirrors gift stickers into a bot-owned set
//! and posts channel notifications for new, depleting, sold-out and
//! upgraded gifts.

pub mod api;
pub mod assets;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod utils;

pub use error::{Error, Result};

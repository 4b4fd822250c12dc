//! Channel notifier.
//!
//! Each event becomes a sticker post followed by a text message threaded as
//! a reply to it. When there is no asset, or the sticker cannot be sent, the
//! text is posted on its own. Every send is wrapped in the bounded
//! rate-limit retry.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::render::{render_digest, render_event};
use crate::api::{BotApi, MessageId};
use crate::domain::{AssetRef, Item};
use crate::monitor::CatalogEvent;
use crate::retry::{RetryPolicy, retry_on_rate_limit};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Destination channel (numeric id or `@username`).
    pub chat_id: String,
    pub retry: RetryPolicy,
}

/// Result of delivering one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The text reached the channel.
    Delivered,
    /// Delivery failed after retries (transient or rate limited).
    Failed,
    /// The remote refused the message outright.
    Rejected,
    /// Shutdown interrupted delivery.
    Cancelled,
}

impl DeliveryOutcome {
    fn from_error(err: &Error) -> Self {
        match err {
            Error::Cancelled => Self::Cancelled,
            e if e.is_permanent() => Self::Rejected,
            _ => Self::Failed,
        }
    }

    /// Whether a write-once category should be marked after this outcome.
    ///
    /// Failed deliveries are marked too: a lost alert is preferred over a
    /// duplicate one.
    pub fn marks_notified(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

pub struct Notifier {
    api: Arc<dyn BotApi>,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(api: Arc<dyn BotApi>, config: NotifierConfig) -> Self {
        Self { api, config }
    }

    pub fn chat_id(&self) -> &str {
        &self.config.chat_id
    }

    /// Deliver one event, using `asset` as the visual when present.
    pub async fn notify(
        &self,
        event: &CatalogEvent,
        asset: Option<&AssetRef>,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let item_id = event.item().id.as_str();
        let event_type = event.event_type();

        let reply_to = match asset {
            Some(asset) => match self.send_asset(asset, cancel).await {
                Ok(message_id) => Some(message_id),
                Err(Error::Cancelled) => return DeliveryOutcome::Cancelled,
                Err(e) => {
                    warn!(
                        item_id,
                        event_type,
                        error = %e,
                        "Failed to send sticker, posting text alone"
                    );
                    None
                }
            },
            None => None,
        };

        let text = render_event(event);
        match self.send_text(&text, reply_to, cancel).await {
            Ok(_) => {
                debug!(item_id, event_type, threaded = reply_to.is_some(), "Notification delivered");
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                let outcome = DeliveryOutcome::from_error(&e);
                if outcome != DeliveryOutcome::Cancelled {
                    warn!(item_id, event_type, error = %e, ?outcome, "Failed to deliver notification");
                }
                outcome
            }
        }
    }

    /// Post the first-run digest of `items`, split across as many messages
    /// as the length limit requires.
    pub async fn announce_digest(
        &self,
        items: &[&Item],
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let messages = render_digest(items);
        let parts = messages.len();

        for (index, text) in messages.iter().enumerate() {
            if let Err(e) = self.send_text(text, None, cancel).await {
                let outcome = DeliveryOutcome::from_error(&e);
                if outcome != DeliveryOutcome::Cancelled {
                    warn!(part = index + 1, parts, error = %e, "Failed to deliver digest");
                }
                return outcome;
            }
        }

        info!(items = items.len(), parts, "First-run digest delivered");
        DeliveryOutcome::Delivered
    }

    async fn send_asset(&self, asset: &AssetRef, cancel: &CancellationToken) -> Result<MessageId> {
        retry_on_rate_limit("send_sticker", self.config.retry, cancel, || {
            self.api.send_sticker(&self.config.chat_id, &asset.file_id)
        })
        .await
    }

    async fn send_text(
        &self,
        text: &str,
        reply_to: Option<MessageId>,
        cancel: &CancellationToken,
    ) -> Result<MessageId> {
        retry_on_rate_limit("send_message", self.config.retry, cancel, || {
            self.api.send_message(&self.config.chat_id, text, reply_to)
        })
        .await
    }
}

//! Telegram Bot API client.
//!
//! Every method is a JSON `POST /bot<token>/<method>`. Failures are decoded
//! from the response envelope into the crate error taxonomy; a 429 carries
//! `parameters.retry_after`. The client never retries on its own, callers
//! decide through [`crate::retry`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};

use super::types::{ApiResponse, BotCommand, Gift, Gifts, InputSticker, Message, StickerSet};
use super::{BotApi, MessageId};
use crate::utils::http_client;
use crate::{Error, Result};

/// Back-off used when a 429 arrives without `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Description Telegram returns for a sticker set that does not exist.
const STICKERSET_INVALID: &str = "STICKERSET_INVALID";

/// Telegram client configuration.
#[derive(Debug, Clone)]
pub struct TelegramClientConfig {
    /// Bot API base URL, without trailing slash.
    pub base_url: String,
    pub bot_token: String,
    /// Zero disables the timeout.
    pub request_timeout: Duration,
}

impl Default for TelegramClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Bot API client over HTTPS.
pub struct TelegramClient {
    config: TelegramClientConfig,
    client: Client,
}

impl TelegramClient {
    pub fn new(config: TelegramClientConfig) -> Self {
        let client = http_client::build_api_client(config.request_timeout);
        Self { config, client }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Call `method` with a JSON body and decode its `result`.
    async fn call<P, T>(&self, method: &'static str, payload: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        trace!(method, "Bot API request");

        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            // The request error may echo the URL, which contains the token.
            .map_err(|e| {
                Error::transient(format!("{method} request failed: {}", e.without_url()))
            })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| {
                Error::transient(format!("{method} body read failed: {}", e.without_url()))
            })?;

        decode_response(method, status, &body)
    }
}

/// Decode a raw Bot API response.
pub(crate) fn decode_response<T: DeserializeOwned>(
    method: &str,
    status: u16,
    body: &[u8],
) -> Result<T> {
    let envelope: ApiResponse<T> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Err(classify_failure(
                method,
                status,
                &format!("unparsable response: {e}"),
                None,
            ));
        }
    };

    if envelope.ok {
        return envelope
            .result
            .ok_or_else(|| Error::permanent(format!("{method} returned ok without result")));
    }

    let code = envelope.error_code.unwrap_or(status);
    let description = envelope.description.unwrap_or_default();
    let retry_after = envelope.parameters.and_then(|p| p.retry_after);
    Err(classify_failure(method, code, &description, retry_after))
}

/// Map a failed call onto the error taxonomy.
pub(crate) fn classify_failure(
    method: &str,
    code: u16,
    description: &str,
    retry_after: Option<u64>,
) -> Error {
    if code == 429 {
        let wait = retry_after
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER);
        debug!(method, retry_after = ?wait, "Bot API rate limited");
        return Error::rate_limited(wait);
    }

    if description.contains(STICKERSET_INVALID) {
        return Error::not_found("sticker_set", method);
    }

    match code {
        400..=499 => Error::permanent(format!("{method} failed ({code}): {description}")),
        _ => Error::transient(format!("{method} failed ({code}): {description}")),
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_available_gifts(&self) -> Result<Vec<Gift>> {
        let gifts: Gifts = self.call("getAvailableGifts", &json!({})).await?;
        Ok(gifts.gifts)
    }

    async fn get_sticker_set(&self, name: &str) -> Result<StickerSet> {
        self.call("getStickerSet", &json!({ "name": name }))
            .await
            .map_err(|e| match e {
                Error::NotFound { entity_type, .. } => Error::NotFound {
                    entity_type,
                    id: name.to_string(),
                },
                other => other,
            })
    }

    async fn create_new_sticker_set(
        &self,
        owner_id: i64,
        name: &str,
        title: &str,
        stickers: Vec<InputSticker>,
    ) -> Result<()> {
        let payload = json!({
            "user_id": owner_id,
            "name": name,
            "title": title,
            "stickers": stickers,
        });
        let _: bool = self.call("createNewStickerSet", &payload).await?;
        Ok(())
    }

    async fn add_sticker_to_set(
        &self,
        owner_id: i64,
        name: &str,
        sticker: InputSticker,
    ) -> Result<()> {
        let payload = json!({
            "user_id": owner_id,
            "name": name,
            "sticker": sticker,
        });
        let _: bool = self.call("addStickerToSet", &payload).await?;
        Ok(())
    }

    async fn send_sticker(&self, chat_id: &str, file_id: &str) -> Result<MessageId> {
        let payload = json!({
            "chat_id": chat_id,
            "sticker": file_id,
        });
        let message: Message = self.call("sendSticker", &payload).await?;
        Ok(message.message_id)
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(message_id) = reply_to {
            payload["reply_parameters"] = json!({
                "message_id": message_id,
                "allow_sending_without_reply": true,
            });
        }
        let message: Message = self.call("sendMessage", &payload).await?;
        Ok(message.message_id)
    }

    async fn get_my_commands(&self) -> Result<Vec<BotCommand>> {
        self.call("getMyCommands", &json!({})).await
    }
}

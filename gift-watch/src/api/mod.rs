//! Remote catalog, sticker and messaging API.
//!
//! [`BotApi`] is the only seam between the pipeline and the network. The
//! production implementation is [`TelegramClient`]; tests substitute
//! in-memory fakes.

mod telegram;
pub mod types;

pub use telegram::{TelegramClient, TelegramClientConfig};
pub use types::{BotCommand, Gift, InputSticker, Sticker, StickerSet};

use async_trait::async_trait;

use crate::Result;

/// Identifier of a message posted to the channel.
pub type MessageId = i64;

/// Bot API operations used by the pipeline.
///
/// Every method may fail with [`crate::Error::Transient`] or
/// [`crate::Error::RateLimited`]; `get_sticker_set` answers
/// [`crate::Error::NotFound`] when the set does not exist yet.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Fetch the full current gift catalog.
    async fn get_available_gifts(&self) -> Result<Vec<Gift>>;

    async fn get_sticker_set(&self, name: &str) -> Result<StickerSet>;

    async fn create_new_sticker_set(
        &self,
        owner_id: i64,
        name: &str,
        title: &str,
        stickers: Vec<InputSticker>,
    ) -> Result<()>;

    async fn add_sticker_to_set(&self, owner_id: i64, name: &str, sticker: InputSticker)
    -> Result<()>;

    async fn send_sticker(&self, chat_id: &str, file_id: &str) -> Result<MessageId>;

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    async fn get_my_commands(&self) -> Result<Vec<BotCommand>>;
}

//! Bot API wire types.
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! payloads is ignored by serde.

use serde::{Deserialize, Serialize};

/// Response envelope shared by every Bot API method.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub error_code: Option<u16>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
}

/// `getAvailableGifts` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Gifts {
    #[serde(default)]
    pub gifts: Vec<Gift>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gift {
    #[serde(default)]
    pub id: String,
    pub sticker: Option<Sticker>,
    #[serde(default)]
    pub star_count: i64,
    #[serde(default)]
    pub upgrade_star_count: Option<i64>,
    #[serde(default)]
    pub total_count: Option<i64>,
    #[serde(default)]
    pub remaining_count: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub upgrades: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sticker {
    pub file_id: String,
    pub file_unique_id: String,
    #[serde(default)]
    pub is_animated: bool,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub set_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StickerSet {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
}

/// Sticker payload for `createNewStickerSet` / `addStickerToSet`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSticker {
    /// File id of an existing sticker.
    pub sticker: String,
    pub format: String,
    pub emoji_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

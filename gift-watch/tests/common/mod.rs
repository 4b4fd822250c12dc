//! Shared fixtures for the poll-cycle tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use gift_watch::api::{BotApi, BotCommand, Gift, InputSticker, MessageId, Sticker, StickerSet};
use gift_watch::config::AppConfig;
use gift_watch::scheduler::Scheduler;
use gift_watch::state::StateStore;
use gift_watch::{Error, Result};

/// Something the fake channel received.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Sticker {
        id: MessageId,
        file_id: String,
    },
    Message {
        id: MessageId,
        text: String,
        reply_to: Option<MessageId>,
    },
}

impl Sent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { text, .. } => Some(text),
            Self::Sticker { .. } => None,
        }
    }
}

/// In-memory Bot API: a settable catalog, one sticker set and a channel log.
/// Queued errors are returned by the next call of the matching method.
#[derive(Default)]
pub struct FakeBotApi {
    catalog: Mutex<Vec<Gift>>,
    set: Mutex<Option<StickerSet>>,
    sent: Mutex<Vec<Sent>>,
    fetch_errors: Mutex<VecDeque<Error>>,
    message_errors: Mutex<VecDeque<Error>>,
    next_message_id: AtomicI64,
    fetches: AtomicU32,
}

impl FakeBotApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_catalog(&self, gifts: Vec<Gift>) {
        *self.catalog.lock() = gifts;
    }

    pub fn queue_fetch_error(&self, err: Error) {
        self.fetch_errors.lock().push_back(err);
    }

    pub fn queue_message_error(&self, err: Error) {
        self.message_errors.lock().push_back(err);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn sticker_count(&self) -> usize {
        self.set.lock().as_ref().map_or(0, |set| set.stickers.len())
    }

    fn next_id(&self) -> MessageId {
        self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn to_set_sticker(index: usize, input: &InputSticker) -> Sticker {
        // Re-uploads get a fresh unique id, like the real service.
        Sticker {
            file_id: format!("set-file-{index}"),
            file_unique_id: format!("set-uniq-{index}"),
            is_animated: input.format == "animated",
            is_video: input.format == "video",
            emoji: input.emoji_list.first().cloned(),
            set_name: Some("gifts_by_bot".to_string()),
        }
    }
}

#[async_trait]
impl BotApi for FakeBotApi {
    async fn get_available_gifts(&self) -> Result<Vec<Gift>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fetch_errors.lock().pop_front() {
            return Err(err);
        }
        Ok(self.catalog.lock().clone())
    }

    async fn get_sticker_set(&self, name: &str) -> Result<StickerSet> {
        self.set
            .lock()
            .clone()
            .ok_or_else(|| Error::not_found("sticker_set", name))
    }

    async fn create_new_sticker_set(
        &self,
        _owner_id: i64,
        name: &str,
        title: &str,
        stickers: Vec<InputSticker>,
    ) -> Result<()> {
        let mut set = self.set.lock();
        if set.is_some() {
            return Err(Error::permanent("Bad Request: sticker set name is already occupied"));
        }
        *set = Some(StickerSet {
            name: name.to_string(),
            title: title.to_string(),
            stickers: stickers
                .iter()
                .enumerate()
                .map(|(i, input)| Self::to_set_sticker(i, input))
                .collect(),
        });
        Ok(())
    }

    async fn add_sticker_to_set(
        &self,
        _owner_id: i64,
        name: &str,
        sticker: InputSticker,
    ) -> Result<()> {
        let mut set = self.set.lock();
        let Some(set) = set.as_mut() else {
            return Err(Error::not_found("sticker_set", name));
        };
        let index = set.stickers.len();
        set.stickers.push(Self::to_set_sticker(index, &sticker));
        Ok(())
    }

    async fn send_sticker(&self, _chat_id: &str, file_id: &str) -> Result<MessageId> {
        let id = self.next_id();
        self.sent.lock().push(Sent::Sticker {
            id,
            file_id: file_id.to_string(),
        });
        Ok(id)
    }

    async fn send_message(
        &self,
        _chat_id: &str,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        if let Some(err) = self.message_errors.lock().pop_front() {
            return Err(err);
        }
        let id = self.next_id();
        self.sent.lock().push(Sent::Message {
            id,
            text: text.to_string(),
            reply_to,
        });
        Ok(id)
    }

    async fn get_my_commands(&self) -> Result<Vec<BotCommand>> {
        Ok(vec![])
    }
}

/// A limited gift with a sticker.
pub fn limited(id: &str, total: i64, remaining: i64) -> Gift {
    Gift {
        id: id.to_string(),
        sticker: Some(Sticker {
            file_id: format!("src-file-{id}"),
            file_unique_id: format!("src-uniq-{id}"),
            is_animated: true,
            is_video: false,
            emoji: Some("\u{1f381}".to_string()),
            set_name: None,
        }),
        star_count: 50,
        upgrade_star_count: None,
        total_count: Some(total),
        remaining_count: Some(remaining),
        title: Some(format!("Gift {id}")),
        upgrades: None,
    }
}

/// An unlimited gift with a sticker.
pub fn unlimited(id: &str) -> Gift {
    Gift {
        total_count: None,
        remaining_count: None,
        ..limited(id, 0, 0)
    }
}

/// Configuration pointed at `state_dir`, plus overrides.
pub fn config(state_dir: &Path, overrides: &[(&str, &str)]) -> AppConfig {
    let mut env: HashMap<String, String> = HashMap::from([
        ("BOT_TOKEN".to_string(), "123:test".to_string()),
        ("CHANNEL_ID".to_string(), "@gifts".to_string()),
        ("STATE_DIR".to_string(), state_dir.display().to_string()),
    ]);
    for (key, value) in overrides {
        env.insert(key.to_string(), value.to_string());
    }
    AppConfig::from_lookup(|key| env.get(key).cloned()).unwrap()
}

/// Config with asset sync enabled.
pub const WITH_STICKERS: &[(&str, &str)] = &[
    ("STICKER_OWNER_ID", "42"),
    ("STICKER_SET_NAME", "gifts_by_bot"),
];

/// Config that announces the first snapshot item by item.
pub const NO_DIGEST: &[(&str, &str)] = &[("FIRST_RUN_DIGEST", "false")];

/// Load state from the configured dir and build a scheduler around `api`.
pub async fn scheduler(api: &Arc<FakeBotApi>, config: &AppConfig) -> Scheduler {
    let state = StateStore::load(config.state_dir.clone()).await.unwrap();
    let api: Arc<dyn BotApi> = api.clone();
    Scheduler::new(api, state, config)
}

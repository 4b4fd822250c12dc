//! Sticker set synchronization.
//!
//! Keeps one bot-owned sticker set holding a copy of every gift sticker so
//! notifications can reference a durable file id. The set is created lazily
//! with the first registered sticker.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{BotApi, InputSticker, StickerSet};
use crate::domain::{AssetRef, AssetSource, Item};
use crate::retry::{RetryPolicy, retry_on_rate_limit};
use crate::state::{AssetMap, StateStore};
use crate::{Error, Result};

/// Sticker set the synchronizer maintains.
#[derive(Debug, Clone)]
pub struct AssetSyncConfig {
    /// User that owns the set (required by the Bot API).
    pub owner_id: i64,
    /// Short name, must end in `_by_<bot username>`.
    pub set_name: String,
    pub set_title: String,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionState {
    Unknown,
    Missing,
    Present,
}

/// Per-cycle registration counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Newly added to the remote set.
    pub registered: usize,
    /// Linked through the source index without a remote call.
    pub reused: usize,
    /// Items without a sticker source.
    pub skipped: usize,
    /// Registration failed; retried next cycle.
    pub failed: usize,
}

pub struct AssetSynchronizer {
    api: Arc<dyn BotApi>,
    config: AssetSyncConfig,
    collection: Mutex<CollectionState>,
}

impl AssetSynchronizer {
    pub fn new(api: Arc<dyn BotApi>, config: AssetSyncConfig) -> Self {
        Self {
            api,
            config,
            collection: Mutex::new(CollectionState::Unknown),
        }
    }

    pub fn config(&self) -> &AssetSyncConfig {
        &self.config
    }

    /// Read the set, recording whether it exists. Absence is not an error.
    async fn load_collection(&self) -> Result<Option<StickerSet>> {
        match self.api.get_sticker_set(&self.config.set_name).await {
            Ok(set) => {
                *self.collection.lock() = CollectionState::Present;
                Ok(Some(set))
            }
            Err(e) if e.is_not_found() => {
                *self.collection.lock() = CollectionState::Missing;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the sticker set exists. A positive answer is cached.
    pub async fn ensure_collection_exists(&self, cancel: &CancellationToken) -> Result<bool> {
        if *self.collection.lock() == CollectionState::Present {
            return Ok(true);
        }
        let set = retry_on_rate_limit("get_sticker_set", self.config.retry, cancel, || {
            self.load_collection()
        })
        .await?;
        Ok(set.is_some())
    }

    /// Ensure `item` has a registered sticker and return its reference.
    ///
    /// Returns `Ok(None)` for items without a sticker source. The write and
    /// the read-back are retried separately on rate limiting, so a write that
    /// went through is never repeated. Other errors propagate so the caller
    /// can skip the item for this cycle.
    pub async fn register_item(
        &self,
        item: &Item,
        state: &mut StateStore,
        cancel: &CancellationToken,
    ) -> Result<Option<AssetRef>> {
        if let Some(asset) = state.assets().get(&item.id) {
            return Ok(Some(asset.clone()));
        }

        let Some(source) = item.asset_source.as_ref() else {
            return Ok(None);
        };

        if let Some(asset) = state.assets().by_source(source.dedup_key()).cloned() {
            debug!(gift_id = %item.id, "Reusing sticker registered for the same source");
            state.link_asset(&item.id, Some(source.dedup_key()), asset.clone());
            return Ok(Some(asset));
        }

        let emoji = item.display_emoji();
        let assets = state.assets();
        let existing = retry_on_rate_limit("add_sticker", self.config.retry, cancel, || {
            self.write_once(source, emoji)
        })
        .await?;

        let asset = match existing {
            Some(asset) => asset,
            None => {
                retry_on_rate_limit("resolve_sticker", self.config.retry, cancel, || {
                    self.resolve_once(source, assets)
                })
                .await?
            }
        };

        state.link_asset(&item.id, Some(source.dedup_key()), asset.clone());
        info!(gift_id = %item.id, file_unique_id = %asset.file_unique_id, "Sticker registered");
        Ok(Some(asset))
    }

    /// Create or extend the set with `source`.
    ///
    /// Returns the existing reference when the set already holds the exact
    /// sticker, `None` once the write went through.
    async fn write_once(&self, source: &AssetSource, emoji: &str) -> Result<Option<AssetRef>> {
        let input = InputSticker {
            sticker: source.file_id.clone(),
            format: source.format.as_str().to_string(),
            emoji_list: vec![emoji.to_string()],
        };

        match self.load_collection().await? {
            Some(set) => {
                if let Some(asset) = find_by_unique_id(&set, source) {
                    return Ok(Some(asset));
                }
                self.api
                    .add_sticker_to_set(self.config.owner_id, &self.config.set_name, input)
                    .await?;
            }
            None => {
                info!(set = %self.config.set_name, "Creating sticker set");
                self.api
                    .create_new_sticker_set(
                        self.config.owner_id,
                        &self.config.set_name,
                        &self.config.set_title,
                        vec![input],
                    )
                    .await?;
                *self.collection.lock() = CollectionState::Present;
            }
        }
        Ok(None)
    }

    /// Read the set back and find the reference the remote assigned.
    async fn resolve_once(&self, source: &AssetSource, assets: &AssetMap) -> Result<AssetRef> {
        let set = self.api.get_sticker_set(&self.config.set_name).await?;
        resolve_asset(&set, source, assets).ok_or_else(|| {
            Error::permanent(format!(
                "sticker {} missing from set {} after registration",
                source.file_unique_id, self.config.set_name
            ))
        })
    }

    /// Register every item that lacks an asset. Failures are isolated per item.
    ///
    /// Only cancellation aborts the pass.
    pub async fn sync_items<'a, I>(
        &self,
        items: I,
        state: &mut StateStore,
        cancel: &CancellationToken,
    ) -> Result<SyncReport>
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let mut report = SyncReport::default();
        let mut visited = HashSet::new();

        for item in items {
            if !visited.insert(item.id.as_str()) || state.assets().get(&item.id).is_some() {
                continue;
            }
            let Some(source) = item.asset_source.as_ref() else {
                report.skipped += 1;
                continue;
            };
            let reused = state.assets().by_source(source.dedup_key()).is_some();

            match self.register_item(item, state, cancel).await {
                Ok(Some(_)) if reused => report.reused += 1,
                Ok(Some(_)) => report.registered += 1,
                Ok(None) => report.skipped += 1,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        gift_id = %item.id,
                        error = %e,
                        "Sticker not registered, will retry next cycle"
                    );
                }
            }
        }

        Ok(report)
    }
}

fn to_ref(sticker: &crate::api::Sticker) -> AssetRef {
    AssetRef {
        file_id: sticker.file_id.clone(),
        file_unique_id: sticker.file_unique_id.clone(),
    }
}

fn find_by_unique_id(set: &StickerSet, source: &AssetSource) -> Option<AssetRef> {
    set.stickers
        .iter()
        .find(|s| s.file_unique_id == source.file_unique_id)
        .map(to_ref)
}

/// Locate the sticker created for `source`: an exact unique-id match, else
/// the newest sticker no item is linked to yet.
fn resolve_asset(set: &StickerSet, source: &AssetSource, assets: &AssetMap) -> Option<AssetRef> {
    find_by_unique_id(set, source).or_else(|| {
        set.stickers
            .iter()
            .rev()
            .find(|s| !assets.references(&s.file_unique_id))
            .map(to_ref)
    })
}

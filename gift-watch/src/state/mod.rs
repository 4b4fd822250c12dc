//! Persistent state owned by the poll loop.
//!
//! [`StateStore`] bundles the four documents that make notifications
//! idempotent across restarts:
//! - known items (first-seen metadata, grows monotonically)
//! - asset map (item id to registered sticker)
//! - notified state (write-once threshold / sold-out sets)
//! - upgrade state (last observed upgrade list per item)
//!
//! Documents are loaded once at startup and flushed at the end of a cycle,
//! only when the cycle changed them.

mod documents;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::Result;
use crate::domain::{AssetRef, Item};
use crate::utils::fs;

pub use documents::{
    AssetMap, Document, FirstSeen, KnownItems, NotifiedState, NotifyKind, UpgradeState,
    load_document, save_document,
};

#[derive(Debug, Clone, Copy, Default)]
struct Dirty {
    known: bool,
    assets: bool,
    notified: bool,
    upgrades: bool,
}

impl Dirty {
    fn any(&self) -> bool {
        self.known || self.assets || self.notified || self.upgrades
    }
}

/// In-memory copy of all persisted state plus change tracking.
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    known: KnownItems,
    assets: AssetMap,
    notified: NotifiedState,
    upgrades: UpgradeState,
    dirty: Dirty,
}

impl StateStore {
    /// Load every document from `dir`, creating the directory if needed.
    pub async fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::ensure_dir_all_with_op("creating state directory", &dir).await?;

        let store = Self {
            known: load_document(&dir).await?,
            assets: load_document(&dir).await?,
            notified: load_document(&dir).await?,
            upgrades: load_document(&dir).await?,
            dir,
            dirty: Dirty::default(),
        };

        info!(
            dir = %store.dir.display(),
            known = store.known.len(),
            assets = store.assets.len(),
            threshold_notified = store.notified.count(NotifyKind::Threshold),
            sold_out_notified = store.notified.count(NotifyKind::SoldOut),
            "Loaded persisted state"
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn known(&self) -> &KnownItems {
        &self.known
    }

    pub fn assets(&self) -> &AssetMap {
        &self.assets
    }

    pub fn notified(&self) -> &NotifiedState {
        &self.notified
    }

    pub fn upgrades(&self) -> &UpgradeState {
        &self.upgrades
    }

    /// Record an item's first sighting. Returns `true` if it was new.
    pub fn remember_item(&mut self, item: &Item, now: DateTime<Utc>) -> bool {
        let inserted = self
            .known
            .insert_first_seen(&item.id, FirstSeen::capture(item, now));
        self.dirty.known |= inserted;
        inserted
    }

    /// Undo a first sighting so the next cycle reports the item as new again.
    /// Used when the announcement never went out.
    pub fn forget_item(&mut self, id: &str) -> bool {
        let removed = self.known.remove(id);
        self.dirty.known |= removed;
        removed
    }

    /// Link an item to a registered sticker. Returns `true` if it was newly linked.
    pub fn link_asset(&mut self, id: &str, source_key: Option<&str>, asset: AssetRef) -> bool {
        let linked = self.assets.link(id, source_key, asset);
        self.dirty.assets |= linked;
        linked
    }

    /// Mark an alert category as sent for `id`. Returns `false` if already marked.
    pub fn mark_notified(&mut self, kind: NotifyKind, id: &str) -> bool {
        let marked = self.notified.mark(kind, id);
        self.dirty.notified |= marked;
        marked
    }

    /// Store the current upgrade list for `id`, returning the previous one.
    pub fn observe_upgrades(&mut self, id: &str, current: &[String]) -> Option<Vec<String>> {
        let previous = self.upgrades.get(id).map(<[String]>::to_vec);
        self.dirty.upgrades |= self.upgrades.replace(id, current);
        previous
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.any()
    }

    /// Write every changed document. Returns `true` if anything was written.
    ///
    /// Dirty flags are cleared per document only after its write succeeded, so
    /// a failed flush is retried at the end of the next cycle.
    pub async fn flush(&mut self) -> Result<bool> {
        if !self.dirty.any() {
            return Ok(false);
        }

        if self.dirty.known {
            save_document(&self.dir, &self.known).await?;
            self.dirty.known = false;
        }
        if self.dirty.assets {
            save_document(&self.dir, &self.assets).await?;
            self.dirty.assets = false;
        }
        if self.dirty.notified {
            save_document(&self.dir, &self.notified).await?;
            self.dirty.notified = false;
        }
        if self.dirty.upgrades {
            save_document(&self.dir, &self.upgrades).await?;
            self.dirty.upgrades = false;
        }

        debug!(dir = %self.dir.display(), "State flushed");
        Ok(true)
    }
}

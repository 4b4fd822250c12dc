//! The four persisted documents and their JSON load/save.
//!
//! Every document is a plain serde structure written to its own file inside
//! the state directory. A missing file loads as the empty document.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::domain::{AssetRef, Item};
use crate::utils::fs;

/// A named JSON document in the state directory.
pub trait Document: Serialize + DeserializeOwned + Default {
    /// File name inside the state directory.
    const FILE_NAME: &'static str;
}

/// Load a document, returning the empty document when its file is absent.
pub async fn load_document<D: Document>(dir: &Path) -> Result<D> {
    let path = dir.join(D::FILE_NAME);
    match fs::read_if_exists(&path).await? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => {
            debug!(path = %path.display(), "State document absent, starting empty");
            Ok(D::default())
        }
    }
}

/// Atomically persist a document.
pub async fn save_document<D: Document>(dir: &Path, doc: &D) -> Result<()> {
    let path = dir.join(D::FILE_NAME);
    let bytes = serde_json::to_vec_pretty(doc)?;
    fs::atomic_write(&path, &bytes).await
}

/// Metadata captured the first time an item is seen. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstSeen {
    pub emoji: Option<String>,
    pub title: Option<String>,
    pub price_units: u64,
    pub total_supply: Option<u64>,
    pub remaining_supply: Option<u64>,
    pub first_seen_at: DateTime<Utc>,
}

impl FirstSeen {
    pub fn capture(item: &Item, now: DateTime<Utc>) -> Self {
        Self {
            emoji: item.emoji.clone(),
            title: item.title.clone(),
            price_units: item.price_units,
            total_supply: item.supply.total(),
            remaining_supply: item.supply.remaining(),
            first_seen_at: now,
        }
    }
}

/// Every item id ever observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnownItems(BTreeMap<String, FirstSeen>);

impl Document for KnownItems {
    const FILE_NAME: &'static str = "known_items.json";
}

impl KnownItems {
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&FirstSeen> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert first-seen metadata. Returns `false` if the id was already known.
    pub fn insert_first_seen(&mut self, id: &str, first_seen: FirstSeen) -> bool {
        if self.0.contains_key(id) {
            return false;
        }
        self.0.insert(id.to_string(), first_seen);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id).is_some()
    }
}

/// Registered remote assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMap {
    /// Item id to sticker reference.
    #[serde(default)]
    assets: BTreeMap<String, AssetRef>,
    /// Raw source key (unique file id) to sticker reference.
    #[serde(default)]
    sources: BTreeMap<String, AssetRef>,
}

impl Document for AssetMap {
    const FILE_NAME: &'static str = "assets.json";
}

impl AssetMap {
    pub fn get(&self, id: &str) -> Option<&AssetRef> {
        self.assets.get(id)
    }

    pub fn by_source(&self, source_key: &str) -> Option<&AssetRef> {
        self.sources.get(source_key)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Whether any item already points at this sticker.
    pub fn references(&self, file_unique_id: &str) -> bool {
        self.assets
            .values()
            .any(|asset| asset.file_unique_id == file_unique_id)
    }

    /// Link `id` to `asset`. Existing links are never replaced.
    pub fn link(&mut self, id: &str, source_key: Option<&str>, asset: AssetRef) -> bool {
        if self.assets.contains_key(id) {
            return false;
        }
        if let Some(key) = source_key {
            self.sources
                .entry(key.to_string())
                .or_insert_with(|| asset.clone());
        }
        self.assets.insert(id.to_string(), asset);
        true
    }
}

/// Alert categories guarded by [`NotifiedState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    Threshold,
    SoldOut,
}

/// Write-once sets of ids that already received an alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifiedState {
    #[serde(default)]
    threshold: BTreeMap<String, bool>,
    #[serde(default)]
    sold_out: BTreeMap<String, bool>,
}

impl Document for NotifiedState {
    const FILE_NAME: &'static str = "notified.json";
}

impl NotifiedState {
    fn set(&self, kind: NotifyKind) -> &BTreeMap<String, bool> {
        match kind {
            NotifyKind::Threshold => &self.threshold,
            NotifyKind::SoldOut => &self.sold_out,
        }
    }

    pub fn contains(&self, kind: NotifyKind, id: &str) -> bool {
        self.set(kind).get(id).copied().unwrap_or(false)
    }

    pub fn count(&self, kind: NotifyKind) -> usize {
        self.set(kind).values().filter(|marked| **marked).count()
    }

    /// Mark `id`. Returns `false` if it was already marked.
    pub fn mark(&mut self, kind: NotifyKind, id: &str) -> bool {
        if self.contains(kind, id) {
            return false;
        }
        let set = match kind {
            NotifyKind::Threshold => &mut self.threshold,
            NotifyKind::SoldOut => &mut self.sold_out,
        };
        set.insert(id.to_string(), true);
        true
    }
}

/// Last observed upgrade list per item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpgradeState(BTreeMap<String, Vec<String>>);

impl Document for UpgradeState {
    const FILE_NAME: &'static str = "upgrades.json";
}

impl UpgradeState {
    pub fn get(&self, id: &str) -> Option<&[String]> {
        self.0.get(id).map(Vec::as_slice)
    }

    /// Overwrite the list for `id`. Returns `true` if anything changed.
    pub fn replace(&mut self, id: &str, upgrades: &[String]) -> bool {
        if self.get(id) == Some(upgrades) {
            return false;
        }
        self.0.insert(id.to_string(), upgrades.to_vec());
        true
    }
}

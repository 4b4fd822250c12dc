//! Catalog snapshot fetcher.
//!
//! Pulls the gift catalog and maps the wire records onto [`Item`]s. Records
//! that cannot be mapped are dropped with a warning so a single malformed
//! entry never aborts the cycle.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{BotApi, Gift};
use crate::domain::{AssetSource, Item, StickerFormat, Supply};
use crate::{Error, Result};

/// Wire-to-domain mapping policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchPolicy {
    /// `total_count` value that the remote uses to mean "unlimited".
    pub unlimited_sentinel: Option<i64>,
}

/// Fetches full catalog snapshots.
pub struct CatalogFetcher {
    api: Arc<dyn BotApi>,
    policy: FetchPolicy,
}

impl CatalogFetcher {
    pub fn new(api: Arc<dyn BotApi>, policy: FetchPolicy) -> Self {
        Self { api, policy }
    }

    /// Fetch the current catalog. Transport and rate-limit errors propagate
    /// untouched; the scheduler decides what to do with them.
    pub async fn fetch(&self) -> Result<Vec<Item>> {
        let gifts = self.api.get_available_gifts().await?;
        let received = gifts.len();
        let items = map_snapshot(gifts, &self.policy);
        debug!(received, mapped = items.len(), "Fetched catalog snapshot");
        Ok(items)
    }
}

/// Map a raw snapshot, dropping malformed and duplicate records.
pub fn map_snapshot(gifts: Vec<Gift>, policy: &FetchPolicy) -> Vec<Item> {
    let mut seen = HashSet::with_capacity(gifts.len());
    let mut items = Vec::with_capacity(gifts.len());

    for gift in gifts {
        let raw_id = gift.id.clone();
        match map_gift(gift, policy) {
            Ok(item) => {
                if seen.insert(item.id.clone()) {
                    items.push(item);
                } else {
                    warn!(gift_id = %item.id, "Duplicate gift id in snapshot, keeping first");
                }
            }
            Err(e) => warn!(gift_id = %raw_id, error = %e, "Skipping malformed gift"),
        }
    }

    items
}

fn non_negative(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::permanent(format!("{field} is negative ({value})")))
}

/// Map a single wire gift.
pub fn map_gift(gift: Gift, policy: &FetchPolicy) -> Result<Item> {
    let id = gift.id.trim().to_string();
    if id.is_empty() {
        return Err(Error::permanent("gift has no id"));
    }

    let price_units = non_negative("star_count", gift.star_count)?;

    let supply = match gift.total_count {
        None => Supply::Unlimited,
        Some(total) if policy.unlimited_sentinel == Some(total) => Supply::Unlimited,
        Some(total) => {
            let total = non_negative("total_count", total)?;
            let remaining = gift
                .remaining_count
                .ok_or_else(|| Error::permanent("limited gift without remaining_count"))?;
            let remaining = non_negative("remaining_count", remaining)?;
            if remaining > total {
                return Err(Error::permanent(format!(
                    "remaining_count {remaining} exceeds total_count {total}"
                )));
            }
            Supply::Finite { total, remaining }
        }
    };

    let upgrade_price = match gift.upgrade_star_count {
        Some(price) => Some(non_negative("upgrade_star_count", price)?),
        None => None,
    };

    let (emoji, asset_source) = match gift.sticker {
        Some(sticker) => {
            let format = if sticker.is_video {
                StickerFormat::Video
            } else if sticker.is_animated {
                StickerFormat::Animated
            } else {
                StickerFormat::Static
            };
            let source = (!sticker.file_id.is_empty()).then(|| AssetSource {
                file_id: sticker.file_id,
                file_unique_id: sticker.file_unique_id,
                format,
            });
            (sticker.emoji, source)
        }
        None => (None, None),
    };

    Ok(Item {
        id,
        emoji,
        title: gift.title.filter(|t| !t.trim().is_empty()),
        price_units,
        upgrade_price,
        supply,
        upgrades: gift.upgrades.unwrap_or_default(),
        asset_source,
    })
}

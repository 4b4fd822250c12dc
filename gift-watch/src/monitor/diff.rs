//! Snapshot diffing.
//!
//! Turns a catalog snapshot plus persisted state into [`CycleEvents`].
//! Known items and upgrade lists are updated in the same pass; the notified
//! sets are only read here and get marked after dispatch.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::events::{CatalogEvent, CycleEvents};
use crate::domain::Item;
use crate::state::{NotifyKind, StateStore};

/// Default low-supply ratio (11% of the total remaining).
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.11;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffPolicy {
    /// Fire the threshold alert when `remaining / total <= threshold_ratio`.
    pub threshold_ratio: f64,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    policy: DiffPolicy,
}

impl DiffEngine {
    pub fn new(policy: DiffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DiffPolicy {
        &self.policy
    }

    /// Diff `snapshot` against `state`.
    pub fn diff(
        &self,
        snapshot: &[Item],
        state: &mut StateStore,
        now: DateTime<Utc>,
    ) -> CycleEvents {
        let mut events = CycleEvents::default();

        for item in snapshot {
            if state.remember_item(item, now) {
                events
                    .new_items
                    .push(CatalogEvent::NewItem { item: item.clone() });
            }

            if let Some(ratio) = self.crossed_threshold(item)
                && !state.notified().contains(NotifyKind::Threshold, &item.id)
            {
                events.threshold_crossed.push(CatalogEvent::ThresholdCrossed {
                    item: item.clone(),
                    ratio,
                });
            }

            if item.supply.is_depleted()
                && !state.notified().contains(NotifyKind::SoldOut, &item.id)
            {
                events
                    .sold_out
                    .push(CatalogEvent::SoldOut { item: item.clone() });
            }

            if let Some(previous) = state.observe_upgrades(&item.id, &item.upgrades) {
                let tokens = added_tokens(&previous, &item.upgrades);
                if !tokens.is_empty() {
                    events.upgrades_added.push(CatalogEvent::UpgradeAdded {
                        item: item.clone(),
                        tokens,
                    });
                }
            }
        }

        debug!(
            items = snapshot.len(),
            new = events.new_items.len(),
            threshold = events.threshold_crossed.len(),
            sold_out = events.sold_out.len(),
            upgrades = events.upgrades_added.len(),
            "Snapshot diffed"
        );
        events
    }

    /// Remaining ratio if it is at or below the threshold.
    fn crossed_threshold(&self, item: &Item) -> Option<f64> {
        item.supply
            .remaining_ratio()
            .filter(|ratio| *ratio <= self.policy.threshold_ratio)
    }
}

/// Tokens of `current` missing from `previous`, in `current` order, deduplicated.
fn added_tokens(previous: &[String], current: &[String]) -> Vec<String> {
    let mut added: Vec<String> = Vec::new();
    for token in current {
        if !previous.contains(token) && !added.contains(token) {
            added.push(token.clone());
        }
    }
    added
}

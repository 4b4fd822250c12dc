//! Events produced by diffing a catalog snapshot against persisted state.

use crate::domain::Item;
use crate::state::NotifyKind;

/// One discrete change detected in a poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    /// Item id seen for the first time.
    NewItem { item: Item },
    /// Remaining share of a finite supply fell to or below the threshold.
    ThresholdCrossed { item: Item, ratio: f64 },
    /// Finite supply reached zero.
    SoldOut { item: Item },
    /// Upgrade tokens that were absent from the last observed list.
    UpgradeAdded { item: Item, tokens: Vec<String> },
}

impl CatalogEvent {
    pub fn item(&self) -> &Item {
        match self {
            Self::NewItem { item }
            | Self::ThresholdCrossed { item, .. }
            | Self::SoldOut { item }
            | Self::UpgradeAdded { item, .. } => item,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewItem { .. } => "new_item",
            Self::ThresholdCrossed { .. } => "threshold_crossed",
            Self::SoldOut { .. } => "sold_out",
            Self::UpgradeAdded { .. } => "upgrade_added",
        }
    }

    /// Write-once category guarding this event, if any.
    pub fn notify_kind(&self) -> Option<NotifyKind> {
        match self {
            Self::ThresholdCrossed { .. } => Some(NotifyKind::Threshold),
            Self::SoldOut { .. } => Some(NotifyKind::SoldOut),
            Self::NewItem { .. } | Self::UpgradeAdded { .. } => None,
        }
    }
}

/// All events of one cycle, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleEvents {
    pub new_items: Vec<CatalogEvent>,
    pub threshold_crossed: Vec<CatalogEvent>,
    pub sold_out: Vec<CatalogEvent>,
    pub upgrades_added: Vec<CatalogEvent>,
}

impl CycleEvents {
    pub fn len(&self) -> usize {
        self.new_items.len()
            + self.threshold_crossed.len()
            + self.sold_out.len()
            + self.upgrades_added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events that reference existing assets, dispatched after new items.
    pub fn followups(&self) -> impl Iterator<Item = &CatalogEvent> {
        self.threshold_crossed
            .iter()
            .chain(&self.sold_out)
            .chain(&self.upgrades_added)
    }

    /// Every event, new items first.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEvent> {
        self.new_items.iter().chain(self.followups())
    }
}

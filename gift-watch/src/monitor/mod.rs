//! Catalog monitor.
//!
//! The monitor is responsible for:
//! - Fetching full catalog snapshots and mapping them onto typed items
//! - Diffing each snapshot against persisted state
//! - Emitting typed events for the asset synchronizer and the notifier

mod diff;
mod events;
mod fetcher;

pub use diff::{DEFAULT_THRESHOLD_RATIO, DiffEngine, DiffPolicy};
pub use events::{CatalogEvent, CycleEvents};
pub use fetcher::{CatalogFetcher, FetchPolicy, map_gift, map_snapshot};

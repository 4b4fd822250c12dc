//! Remote media assets for catalog items.

mod synchronizer;

pub use synchronizer::{AssetSyncConfig, AssetSynchronizer, SyncReport};

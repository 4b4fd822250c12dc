//! Domain types shared by the pipeline stages.

pub mod item;

pub use item::{AssetRef, AssetSource, Item, StickerFormat, Supply};

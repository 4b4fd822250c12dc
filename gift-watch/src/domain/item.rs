//! Catalog item model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supply of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Supply {
    /// Limited edition: `remaining` never exceeds `total`.
    Finite { total: u64, remaining: u64 },
    Unlimited,
}

impl Supply {
    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Finite { .. })
    }

    pub fn total(&self) -> Option<u64> {
        match self {
            Self::Finite { total, .. } => Some(*total),
            Self::Unlimited => None,
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        match self {
            Self::Finite { remaining, .. } => Some(*remaining),
            Self::Unlimited => None,
        }
    }

    /// Remaining share of the total, `None` for unlimited or zero-sized supply.
    pub fn remaining_ratio(&self) -> Option<f64> {
        match *self {
            Self::Finite { total, remaining } if total > 0 => {
                Some(remaining as f64 / total as f64)
            }
            _ => None,
        }
    }

    pub fn is_depleted(&self) -> bool {
        matches!(self, Self::Finite { remaining: 0, .. })
    }
}

impl fmt::Display for Supply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite { total, remaining } => write!(f, "{remaining}/{total}"),
            Self::Unlimited => f.write_str("\u{221e}"),
        }
    }
}

/// Encoding of a sticker, as required when re-uploading it to a sticker set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StickerFormat {
    #[default]
    Static,
    Animated,
    Video,
}

impl StickerFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Animated => "animated",
            Self::Video => "video",
        }
    }
}

/// Raw asset handle delivered with a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    /// Sendable file id, valid for re-upload.
    pub file_id: String,
    /// Stable identifier of the underlying file; used for dedup.
    pub file_unique_id: String,
    pub format: StickerFormat,
}

impl AssetSource {
    /// Key of the "already registered" index.
    pub fn dedup_key(&self) -> &str {
        &self.file_unique_id
    }
}

/// Durable reference to a sticker in the remote sticker set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub file_id: String,
    pub file_unique_id: String,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub emoji: Option<String>,
    pub title: Option<String>,
    pub price_units: u64,
    pub upgrade_price: Option<u64>,
    pub supply: Supply,
    /// Ordered sub-attribute tokens; may grow between polls.
    pub upgrades: Vec<String>,
    pub asset_source: Option<AssetSource>,
}

impl Item {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }

    pub fn display_emoji(&self) -> &str {
        self.emoji.as_deref().unwrap_or("\u{1f381}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_ratio() {
        let supply = Supply::Finite {
            total: 100,
            remaining: 9,
        };
        assert_eq!(supply.remaining_ratio(), Some(0.09));
        assert_eq!(Supply::Unlimited.remaining_ratio(), None);

        let empty = Supply::Finite {
            total: 0,
            remaining: 0,
        };
        assert_eq!(empty.remaining_ratio(), None);
    }

    #[test]
    fn test_depleted_only_when_finite() {
        assert!(
            Supply::Finite {
                total: 10,
                remaining: 0
            }
            .is_depleted()
        );
        assert!(!Supply::Unlimited.is_depleted());
    }

    #[test]
    fn test_supply_display() {
        assert_eq!(Supply::Unlimited.to_string(), "\u{221e}");
        assert_eq!(
            Supply::Finite {
                total: 500,
                remaining: 42
            }
            .to_string(),
            "42/500"
        );
    }

    #[test]
    fn test_supply_serde_shape() {
        let json = serde_json::to_value(Supply::Finite {
            total: 3,
            remaining: 1,
        })
        .unwrap();
        assert_eq!(json["kind"], "finite");
        assert_eq!(json["total"], 3);

        let back: Supply = serde_json::from_str(r#"{"kind":"unlimited"}"#).unwrap();
        assert_eq!(back, Supply::Unlimited);
    }
}

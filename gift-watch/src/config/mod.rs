//! Process configuration.
//!
//! Everything is read from the environment (after `.env` has been loaded by
//! `main`). Parsing goes through a lookup closure so tests never touch the
//! process environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::TelegramClientConfig;
use crate::assets::AssetSyncConfig;
use crate::monitor::{DEFAULT_THRESHOLD_RATIO, DiffPolicy, FetchPolicy};
use crate::notification::NotifierConfig;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_STATE_DIR: &str = "data";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_STICKER_SET_TITLE: &str = "Gifts";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 3;
const DEFAULT_NOTIFY_CONCURRENCY: usize = 4;

/// Sticker set used for asset sync. Absent when no owner is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerSetConfig {
    pub owner_id: i64,
    pub name: String,
    pub title: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub sticker_set: Option<StickerSetConfig>,
    pub api_base_url: String,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub threshold_ratio: f64,
    pub unlimited_sentinel: Option<i64>,
    pub max_rate_limit_retries: u32,
    pub notify_concurrency: usize,
    pub first_run_digest: bool,
}

// Manual impl keeps the token out of logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bot_token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("sticker_set", &self.sticker_set)
            .field("api_base_url", &self.api_base_url)
            .field("state_dir", &self.state_dir)
            .field("log_dir", &self.log_dir)
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .field("threshold_ratio", &self.threshold_ratio)
            .field("unlimited_sentinel", &self.unlimited_sentinel)
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .field("notify_concurrency", &self.notify_concurrency)
            .field("first_run_digest", &self.first_run_digest)
            .finish()
    }
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = required(&get, "BOT_TOKEN")?;
        let channel_id = required(&get, "CHANNEL_ID")?;

        let sticker_set = match parse_optional::<i64, _>(&get, "STICKER_OWNER_ID")? {
            Some(owner_id) => Some(StickerSetConfig {
                owner_id,
                name: required(&get, "STICKER_SET_NAME")?,
                title: get("STICKER_SET_TITLE")
                    .unwrap_or_else(|| DEFAULT_STICKER_SET_TITLE.to_string()),
            }),
            None => None,
        };

        let poll_interval_secs =
            parse_or(&get, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            return Err(Error::config("POLL_INTERVAL_SECS must be at least 1"));
        }

        let request_timeout_secs =
            parse_or(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        if request_timeout_secs == 0 {
            return Err(Error::config("REQUEST_TIMEOUT_SECS must be at least 1"));
        }

        let threshold_ratio = parse_or(&get, "THRESHOLD_RATIO", DEFAULT_THRESHOLD_RATIO)?;
        if !(threshold_ratio > 0.0 && threshold_ratio <= 1.0) {
            return Err(Error::config(format!(
                "THRESHOLD_RATIO must be in (0, 1], got {threshold_ratio}"
            )));
        }

        let notify_concurrency =
            parse_or(&get, "NOTIFY_CONCURRENCY", DEFAULT_NOTIFY_CONCURRENCY)?;
        if notify_concurrency == 0 {
            return Err(Error::config("NOTIFY_CONCURRENCY must be at least 1"));
        }

        let first_run_digest = match get("FIRST_RUN_DIGEST") {
            Some(value) => parse_bool("FIRST_RUN_DIGEST", &value)?,
            None => true,
        };

        Ok(Self {
            bot_token,
            channel_id,
            sticker_set,
            api_base_url: get("API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            state_dir: get("STATE_DIR")
                .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string())
                .into(),
            log_dir: get("LOG_DIR")
                .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
                .into(),
            poll_interval: Duration::from_secs(poll_interval_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            threshold_ratio,
            unlimited_sentinel: parse_optional(&get, "UNLIMITED_SUPPLY_SENTINEL")?,
            max_rate_limit_retries: parse_or(
                &get,
                "MAX_RATE_LIMIT_RETRIES",
                DEFAULT_MAX_RATE_LIMIT_RETRIES,
            )?,
            notify_concurrency,
            first_run_digest,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_rate_limit_retries)
    }

    pub fn client_config(&self) -> TelegramClientConfig {
        TelegramClientConfig {
            base_url: self.api_base_url.clone(),
            bot_token: self.bot_token.clone(),
            request_timeout: self.request_timeout,
        }
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            unlimited_sentinel: self.unlimited_sentinel,
        }
    }

    pub fn diff_policy(&self) -> DiffPolicy {
        DiffPolicy {
            threshold_ratio: self.threshold_ratio,
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            chat_id: self.channel_id.clone(),
            retry: self.retry_policy(),
        }
    }

    /// `None` disables asset sync; notifications then go out as text only.
    pub fn asset_sync_config(&self) -> Option<AssetSyncConfig> {
        self.sticker_set.as_ref().map(|set| AssetSyncConfig {
            owner_id: set.owner_id,
            set_name: set.name.clone(),
            set_title: set.title.clone(),
            retry: self.retry_policy(),
        })
    }
}

fn required<G>(get: &G, key: &str) -> Result<String>
where
    G: Fn(&str) -> Option<String>,
{
    get(key).ok_or_else(|| Error::config(format!("{key} is not set")))
}

fn parse_optional<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| Error::config(format!("{key}: invalid value {raw:?}: {e}")))
        })
        .transpose()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(get, key)?.unwrap_or(default))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("{key}: expected a boolean, got {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    const MINIMAL: &[(&str, &str)] = &[("BOT_TOKEN", "123:abc"), ("CHANNEL_ID", "@gifts")];

    #[test]
    fn test_defaults() {
        let config = config_from(MINIMAL).unwrap();
        assert_eq!(config.channel_id, "@gifts");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.state_dir, PathBuf::from("data"));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!((config.threshold_ratio - 0.11).abs() < f64::EPSILON);
        assert_eq!(config.unlimited_sentinel, None);
        assert_eq!(config.max_rate_limit_retries, 3);
        assert_eq!(config.notify_concurrency, 4);
        assert!(config.first_run_digest);
        assert!(config.sticker_set.is_none());
        assert!(config.asset_sync_config().is_none());
    }

    #[test]
    fn test_missing_required_values() {
        let err = config_from(&[("CHANNEL_ID", "@gifts")]).unwrap_err();
        assert!(err.to_string().contains("BOT_TOKEN"));

        let err = config_from(&[("BOT_TOKEN", "t"), ("CHANNEL_ID", "  ")]).unwrap_err();
        assert!(err.to_string().contains("CHANNEL_ID"));
    }

    #[test]
    fn test_sticker_set_requires_name() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("STICKER_OWNER_ID", "42"));
        let err = config_from(&pairs).unwrap_err();
        assert!(err.to_string().contains("STICKER_SET_NAME"));

        pairs.push(("STICKER_SET_NAME", "gifts_by_bot"));
        let config = config_from(&pairs).unwrap();
        let sync = config.asset_sync_config().unwrap();
        assert_eq!(sync.owner_id, 42);
        assert_eq!(sync.set_name, "gifts_by_bot");
        assert_eq!(sync.set_title, DEFAULT_STICKER_SET_TITLE);
    }

    #[test]
    fn test_overrides() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend([
            ("API_BASE_URL", "http://localhost:8081/"),
            ("POLL_INTERVAL_SECS", "30"),
            ("THRESHOLD_RATIO", "0.25"),
            ("UNLIMITED_SUPPLY_SENTINEL", "-1"),
            ("MAX_RATE_LIMIT_RETRIES", "5"),
            ("NOTIFY_CONCURRENCY", "1"),
            ("FIRST_RUN_DIGEST", "off"),
        ]);
        let config = config_from(&pairs).unwrap();

        assert_eq!(config.api_base_url, "http://localhost:8081");
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.diff_policy().threshold_ratio, 0.25);
        assert_eq!(config.fetch_policy().unlimited_sentinel, Some(-1));
        assert_eq!(config.retry_policy(), RetryPolicy::new(5));
        assert_eq!(config.notify_concurrency, 1);
        assert!(!config.first_run_digest);
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("POLL_INTERVAL_SECS", "soon"),
            ("POLL_INTERVAL_SECS", "0"),
            ("THRESHOLD_RATIO", "0"),
            ("THRESHOLD_RATIO", "1.5"),
            ("NOTIFY_CONCURRENCY", "0"),
            ("FIRST_RUN_DIGEST", "maybe"),
            ("STICKER_OWNER_ID", "me"),
        ] {
            let mut pairs = MINIMAL.to_vec();
            pairs.push((key, value));
            let err = config_from(&pairs).unwrap_err();
            assert!(
                matches!(err, Error::Configuration(_)),
                "{key}={value} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = config_from(MINIMAL).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("123:abc"));
        assert!(rendered.contains("<redacted>"));
    }
}

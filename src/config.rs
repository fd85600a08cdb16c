//! Runtime settings and the monitored source list.
//!
//! Settings come from command-line flags with environment fallbacks (a
//! `.env` file is honoured by the binary). The source list lives in a
//! separate JSON file so it can be edited while the monitor runs:
//!
//! ```json
//! { "monitor_urls": ["https://shop.example/cart.php?a=add&pid=1"] }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::product::{is_keyable_source, ChannelId, KEY_DELIMITER};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line output.
    Compact,
    /// One JSON object per line.
    Json,
}

/// Process settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "stockwatch", version, about = "Storefront stock monitor with chat notifications")]
pub struct Settings {
    /// Bot API token.
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: String,

    /// Comma-separated chat ids to notify.
    #[arg(long, env = "TELEGRAM_CHAT_ID", value_delimiter = ',')]
    pub telegram_chat_id: Vec<String>,

    /// Attempts per fetch or send, including the first.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 1)]
    pub max_retries: u32,

    /// Request timeout in seconds.
    #[arg(long, env = "TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// JSON file listing the monitored sources.
    #[arg(long, env = "CONFIG_FILE", default_value = "config.json")]
    pub config_file: PathBuf,

    /// Durable product state.
    #[arg(long, env = "STATE_FILE", default_value = "products.json")]
    pub state_file: PathBuf,

    /// Sources polled at the same time.
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = 2)]
    pub max_concurrent_requests: usize,

    /// Seconds between the end of one round and the start of the next.
    #[arg(long, env = "ROUND_INTERVAL", default_value_t = 30)]
    pub round_interval: u64,

    /// Page the shop redirects to for products that no longer exist.
    #[arg(long, env = "STOREFRONT_ROOT", default_value = "https://bwh81.net/cart.php")]
    pub storefront_root: String,

    /// Text every genuine product page title contains.
    #[arg(long, env = "TITLE_MARKER", default_value = "Bandwagon")]
    pub title_marker: String,

    /// Affiliate id added to purchase links.
    #[arg(long, env = "AFFILIATE_ID")]
    pub affiliate_id: Option<String>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

impl Settings {
    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "telegram_token",
                reason: "must not be empty".to_string(),
            });
        }
        if self.channel_ids().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "telegram_chat_id",
                reason: "at least one chat id is required".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_retries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_concurrent_requests",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.timeout == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "timeout",
                reason: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    /// Configured channels, blanks removed, first occurrence kept.
    #[must_use]
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut seen = BTreeSet::new();
        self.telegram_chat_id
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
            .map(ChannelId::new)
            .collect()
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    #[must_use]
    pub fn round_interval(&self) -> Duration {
        Duration::from_secs(self.round_interval)
    }
}

/// Change token for a source list; opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigMarker(SystemTime);

/// Supplies the list of monitored sources.
pub trait ConfigProvider: Send + Sync {
    /// Read and validate the current list.
    fn load(&self) -> Result<Vec<String>, ConfigError>;

    /// Marker for the list as it is now, if one can be determined.
    fn marker(&self) -> Option<ConfigMarker>;

    /// True when the list may differ from the one `previous` describes.
    fn changed_since(&self, previous: Option<&ConfigMarker>) -> bool {
        self.marker().as_ref() != previous
    }
}

#[derive(Debug, Deserialize)]
struct SourceFile {
    monitor_urls: Vec<String>,
}

/// Source list stored as JSON on disk; the file's mtime is its marker.
#[derive(Debug, Clone)]
pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for JsonFileConfig {
    fn load(&self) -> Result<Vec<String>, ConfigError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::Missing {
                path: self.path.clone(),
            },
            _ => ConfigError::Io {
                path: self.path.clone(),
                message: e.to_string(),
            },
        })?;

        let file: SourceFile = serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let sources = validate_sources(file.monitor_urls)?;
        if sources.is_empty() {
            return Err(ConfigError::EmptySourceList {
                path: self.path.clone(),
            });
        }
        Ok(sources)
    }

    fn marker(&self) -> Option<ConfigMarker> {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(ConfigMarker)
    }
}

/// Trim, drop blanks and duplicates, and reject sources that cannot be keyed.
fn validate_sources(raw: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let mut seen = BTreeSet::new();
    let mut sources = Vec::with_capacity(raw.len());

    for source in raw {
        let source = source.trim().to_string();
        if source.is_empty() || seen.contains(&source) {
            continue;
        }
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Err(ConfigError::InvalidSource {
                source_url: source,
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if !is_keyable_source(&source) {
            return Err(ConfigError::InvalidSource {
                source_url: source,
                reason: format!("must not contain '{KEY_DELIMITER}' or end with ':'"),
            });
        }
        seen.insert(source.clone());
        sources.push(source);
    }

    Ok(sources)
}

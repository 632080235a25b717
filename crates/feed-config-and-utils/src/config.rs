//! Configuration management for the chat feed core.

use crate::{parse_level, CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Collection holding chat messages in the durable feed store.
pub const DEFAULT_COLLECTION_KEY: &str = "messages";

/// Field the store orders the message collection by.
pub const DEFAULT_ORDER_FIELD: &str = "timestamp";

/// Capacity of the in-process snapshot channel between a store and the synchronizer.
pub const DEFAULT_SNAPSHOT_BUFFER: usize = 64;

/// Feed subscription settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Collection key passed to `subscribe_ordered`.
    #[serde(default = "default_collection_key")]
    pub collection_key: String,
    /// Order field passed to `subscribe_ordered`.
    #[serde(default = "default_order_field")]
    pub order_field: String,
    /// Snapshot channel capacity for stores that buffer deliveries.
    #[serde(default = "default_snapshot_buffer")]
    pub snapshot_buffer: usize,
}

fn default_collection_key() -> String {
    DEFAULT_COLLECTION_KEY.to_string()
}

fn default_order_field() -> String {
    DEFAULT_ORDER_FIELD.to_string()
}

fn default_snapshot_buffer() -> usize {
    DEFAULT_SNAPSHOT_BUFFER
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            collection_key: default_collection_key(),
            order_field: default_order_field(),
            snapshot_buffer: default_snapshot_buffer(),
        }
    }
}

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Feed subscription settings.
    #[serde(default)]
    pub feed: FeedConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            feed: FeedConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables win over the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Reject settings the feed cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if parse_level(&self.log_level).is_none() {
            return Err(CoreError::Config(format!("unknown log_level {:?}", self.log_level)));
        }
        if self.feed.collection_key.trim().is_empty() {
            return Err(CoreError::Config("feed.collection_key is empty".to_string()));
        }
        if self.feed.order_field.trim().is_empty() {
            return Err(CoreError::Config("feed.order_field is empty".to_string()));
        }
        if self.feed.snapshot_buffer == 0 {
            return Err(CoreError::Config("feed.snapshot_buffer must be > 0".to_string()));
        }
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognized: `CHATFEED_LOG_LEVEL`, `CHATFEED_COLLECTION`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(log_level) = lookup("CHATFEED_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.log_level = log_level.trim().to_string();
        }
        if let Some(collection) = lookup("CHATFEED_COLLECTION").filter(|v| !v.trim().is_empty()) {
            self.feed.collection_key = collection.trim().to_string();
        }
    }
}

//! # Observability
//!
//! Logging setup for the chat feed workspace.
//!
//! The feed crates only emit `tracing` events. Whoever embeds them calls
//! [`init_with_config`] once; after that every event lands as one JSON line in
//! `~/.chatfeed/logs/dev.jsonl` (and optionally on stderr).
//!
//! - `tail -f ~/.chatfeed/logs/dev.jsonl | jq` to follow the feed
//! - `jq 'select(.principal_id == "u1")'` to isolate one session
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "chat-client".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! ```

#[cfg(feature = "dev")]
mod dev;

mod json_layer;

#[cfg(feature = "dev")]
pub use dev::LogFile;
pub use json_layer::{JsonLayer, LogEntry, REDACTED_FIELDS};

use std::path::PathBuf;

/// What the JSONL layer may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservabilityMode {
    /// Fields are written verbatim.
    #[default]
    DevVerbose,
    /// Message text and profile fields are replaced by a marker.
    ProdMetadataOnly,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every line as `service`.
    pub service_name: String,

    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,

    /// Overrides `~/.chatfeed/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    pub also_stderr: bool,

    pub mode: ObservabilityMode,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "chat-client".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            mode: ObservabilityMode::DevVerbose,
        }
    }
}

/// Installs logging for `service_name` with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Installs logging. Only the first call in a process takes effect.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    dev::init_dev_subscriber(&config);

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .finish()
            .try_init();
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};

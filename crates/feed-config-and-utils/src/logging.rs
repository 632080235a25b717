//! Logging setup for processes that embed the feed.
//!
//! Wraps `observability` with the client's config: the level comes from
//! [`Config::log_level`], the file from [`Paths::log_file`], and
//! `CHATFEED_OBS_MODE=prod` switches on content redaction.

use observability::{LogConfig, ObservabilityMode};

use crate::{Config, Paths};

/// Selects the redaction mode.
pub const OBS_MODE_ENV: &str = "CHATFEED_OBS_MODE";

/// Installs logging as the `chat-client` service.
///
/// ```ignore
/// let paths = Paths::new()?;
/// let config = Config::load(&paths)?;
/// feed_config_and_utils::init_logging(&config, &paths);
/// ```
pub fn init_logging(config: &Config, paths: &Paths) {
    init_logging_for_service("chat-client", config, paths);
}

pub fn init_logging_for_service(service_name: &str, config: &Config, paths: &Paths) {
    let mode = std::env::var(OBS_MODE_ENV).ok();
    observability::init_with_config(log_config(service_name, config, paths, mode.as_deref()));
}

fn log_config(service_name: &str, config: &Config, paths: &Paths, mode: Option<&str>) -> LogConfig {
    LogConfig {
        service_name: service_name.to_string(),
        default_level: config.log_level.clone(),
        log_path: Some(paths.log_file()),
        also_stderr: true,
        mode: parse_mode(mode),
    }
}

fn parse_mode(raw: Option<&str>) -> ObservabilityMode {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("prod" | "production") => ObservabilityMode::ProdMetadataOnly,
        _ => ObservabilityMode::DevVerbose,
    }
}

/// Parses a level name, accepting `warning` for `warn`. Case-insensitive.
pub fn parse_level(level: &str) -> Option<tracing::Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(tracing::Level::WARN),
        other => other.parse().ok(),
    }
}

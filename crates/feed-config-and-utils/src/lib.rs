//! Configuration, paths, and logging setup shared by the chat feed crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, FeedConfig, DEFAULT_COLLECTION_KEY, DEFAULT_LOG_LEVEL, DEFAULT_ORDER_FIELD,
    DEFAULT_SNAPSHOT_BUFFER,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level, OBS_MODE_ENV};
pub use paths::Paths;

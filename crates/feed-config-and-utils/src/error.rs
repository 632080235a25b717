//! Errors raised while loading configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting the feed cannot run with.
    #[error("invalid config: {0}")]
    Config(String),

    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to root `~/.chatfeed` in.
    #[error("path resolution failed: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

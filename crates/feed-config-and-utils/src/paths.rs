//! On-disk layout under `~/.chatfeed`.

use std::path::{Path, PathBuf};

use crate::{CoreError, CoreResult};

const ROOT_DIR: &str = ".chatfeed";

/// Locations of the client's config and log files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// `~/.chatfeed`.
    pub fn new() -> CoreResult<Self> {
        dirs::home_dir()
            .map(|home| Self::with_base_dir(home.join(ROOT_DIR)))
            .ok_or_else(|| CoreError::Path("no home directory".to_string()))
    }

    /// Roots everything at `root` instead, as tests do.
    pub fn with_base_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// JSONL file every process appends to.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("dev.jsonl")
    }

    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

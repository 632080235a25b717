//! Dev-mode subscriber: JSONL to a shared file, compact lines to stderr.
//!
//! Several processes may append to the same file. Every write is flushed
//! immediately so their lines never interleave mid-record.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::json_layer::JsonLayer;
use crate::LogConfig;

/// `~/.chatfeed/logs/dev.jsonl`, or the temp dir without a home directory.
pub(crate) fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".chatfeed")
        .join("logs")
        .join("dev.jsonl")
}

/// Append-only handle to the log file, shared by every layer writer.
#[derive(Clone)]
pub struct LogFile {
    path: Arc<PathBuf>,
    file: Arc<Mutex<BufWriter<File>>>,
}

impl LogFile {
    /// Opens `path` for appending, creating missing parent directories.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            file: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock();
        let written = file.write(buf)?;
        file.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global subscriber.
///
/// An unopenable log file degrades to stderr only. A subscriber installed
/// earlier in the process wins.
pub fn init_dev_subscriber(config: &LogConfig) {
    let path = config.log_path.clone().unwrap_or_else(default_log_path);

    let file = match LogFile::open(&path) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("chatfeed: cannot open log file {}: {err}", path.display());
            None
        }
    };

    let stderr = (config.also_stderr || file.is_none()).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .with_filter(filter(&config.default_level))
    });
    let json = file.map(|file| {
        JsonLayer::new(config.service_name.clone(), config.mode, file)
            .with_filter(filter(&config.default_level))
    });

    if tracing_subscriber::registry()
        .with(json)
        .with(stderr)
        .try_init()
        .is_ok()
    {
        tracing::info!(
            log_path = %path.display(),
            service = %config.service_name,
            mode = ?config.mode,
            "logging initialized"
        );
    }
}

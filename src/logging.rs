//! Tracing setup.
//!
//! Two outputs:
//! - stderr, human readable, filtered by `RUST_LOG` (default `info`);
//! - `<logging.dir>/<unit>.log`, without colours, written from a background
//!   thread via `tracing-appender`.
//!
//! The log file never grows past `logging.file_size_limit_mb`: once it
//! reaches the cap it is truncated and writing starts over.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Append-only file writer that truncates itself at `max_bytes`.
#[derive(Debug)]
pub struct TruncatingFile {
    file: File,
    max_bytes: u64,
    written: u64,
}

impl TruncatingFile {
    pub fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            file,
            max_bytes,
            written,
        })
    }
}

impl Write for TruncatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_bytes > 0 && self.written >= self.max_bytes {
            // append mode: the next write lands at the new end, offset 0
            self.file.set_len(0)?;
            self.written = 0;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Install the global subscriber for `unit`.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init(config: &LoggingConfig, unit: &str) -> Result<WorkerGuard> {
    let path = config.dir.join(format!("{}.log", unit));
    let file = TruncatingFile::open(&path, config.file_size_limit_bytes())
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .context("cannot install tracing subscriber")?;

    Ok(guard)
}

/// Stderr-only logging for short commands that should not touch log files.
pub fn init_stderr() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

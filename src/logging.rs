//! Logging setup
//!
//! CLI commands log to stderr. `run` also writes to a size-rotated file in
//! the cache directory, through a non-blocking writer so the control loop
//! never waits on disk.

use color_eyre::eyre::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::config::Config;

/// Log file name inside the cache directory
pub const LOG_FILE: &str = "posterwall.log";
const LOG_MAX_BYTES: u64 = 1_000_000;

/// `RUST_LOG` if set, otherwise our crate at `level`
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("posterwall={level}")))
}

/// Stderr logging for one-shot commands
pub fn init_cli_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(io::stderr)
        .init();
}

/// Stderr plus rotating file logging for `run`
///
/// Keep the returned guard alive until exit; dropping it flushes the file.
///
/// # Errors
/// Returns an error if the cache directory cannot be created.
pub fn init_daemon_logging(config: &Config) -> Result<WorkerGuard> {
    let dir = &config.kiosk.cache;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {dir:?}"))?;

    let appender = RotatingFileAppender::new(dir, LOG_FILE, LOG_MAX_BYTES);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter(&config.kiosk.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

/// A file appender that rotates by size, keeping `<name>` and `<name>.old`
///
/// Re-creates the file if it is deleted externally. New files are 0600.
pub struct RotatingFileAppender {
    path: PathBuf,
    backup_path: PathBuf,
    max_size_bytes: u64,
    file: Mutex<Option<File>>,
}

impl RotatingFileAppender {
    pub fn new(dir: impl Into<PathBuf>, filename: &str, max_size_bytes: u64) -> Self {
        let dir = dir.into();
        Self {
            path: dir.join(filename),
            backup_path: dir.join(format!("{filename}.old")),
            max_size_bytes,
            file: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_secure(path: &Path, append: bool) -> io::Result<File> {
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true);
        if append {
            options.append(true);
        } else {
            options.truncate(true);
        }

        #[cfg(unix)]
        options.mode(0o600);

        options.open(path)
    }

    /// Open handle to the current file, re-opening after external deletion
    fn current<'a>(&self, slot: &'a mut Option<File>) -> io::Result<&'a mut File> {
        if !self.path.exists() {
            *slot = None;
        }
        if slot.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            *slot = Some(Self::open_secure(&self.path, true)?);
        }
        slot.as_mut()
            .ok_or_else(|| io::Error::other("Log file not open"))
    }

    /// current -> backup, then start an empty current
    fn rotate(&self, slot: &mut Option<File>) -> io::Result<()> {
        *slot = None;
        if self.path.exists() {
            fs::rename(&self.path, &self.backup_path)?;
        }
        *slot = Some(Self::open_secure(&self.path, false)?);
        Ok(())
    }
}

impl Write for RotatingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        let size = match self.current(&mut slot) {
            Ok(file) => file.metadata()?.len(),
            Err(_) => 0,
        };

        if size >= self.max_size_bytes
            && let Err(e) = self.rotate(&mut slot)
        {
            eprintln!("Failed to rotate log file: {e}");
        }

        self.current(&mut slot)?.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut slot = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;
        if let Some(file) = slot.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

//! Process-wide `tracing` setup: console output plus an optional log file.
//!
//! The console always gets events.  When `[log] file_path` is set the same
//! events are also written, without colour codes, to
//! `<file_path>/<file_root>.log`, or to one `<file_root>.<date>.log` per day
//! when `rotate` is on.  File writes go through `tracing-appender`'s
//! non-blocking writer thread.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use super::storage::config::LogConfig;

/// Opens the configured log file, or returns `None` when file logging is off.
///
/// # Errors
///
/// [`InitError`] when the log directory cannot be created or opened.
pub fn file_appender(log: &LogConfig) -> Result<Option<RollingFileAppender>, InitError> {
    let Some(dir) = log.file_path.as_deref() else {
        return Ok(None);
    };
    let rotation = if log.rotate {
        Rotation::DAILY
    } else {
        Rotation::NEVER
    };

    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(log.file_root.trim())
        .filename_suffix("log")
        .build(dir)
        .map(Some)
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `log.level`; an unparsable level falls back to
/// `info`.  Keep the returned guard alive until exit, otherwise buffered
/// file output is lost.
///
/// # Errors
///
/// See [`file_appender`].
pub fn init(log: &LogConfig) -> Result<Option<WorkerGuard>, InitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&log.level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let (file_layer, guard) = match file_appender(log)? {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

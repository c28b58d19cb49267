//! Logging setup for the storage plugin.
//!
//! The host drives logging through the plugin lifecycle: it may ask the
//! plugin to route informational output to a log file, and later to stop
//! logging. The tracing global subscriber can only be installed once per
//! process, so both entry points are idempotent; when several storage
//! contexts race to initialize, the first writer wins and the rest are
//! silent no-ops (the same policy the resource registry applies).

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::StorageError;

/// Filter used when the host asked for silent operation: errors only.
const SILENT_FILTER: &str = "error";
/// Default filter for normal operation.
const DEFAULT_FILTER: &str = "info";

/// Route log output to the file at `info_log_path`.
///
/// The file is created if missing and appended to otherwise. With `silent`
/// set, only errors are written. Idempotent: if a subscriber is already
/// installed this is a no-op.
///
/// # Errors
///
/// Returns [`StorageError::Config`] when the log file cannot be opened.
pub fn init_file_logging(info_log_path: &Path, silent: bool) -> Result<(), StorageError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(info_log_path)
        .map_err(|e| {
            StorageError::Config(format!(
                "failed to open info log file {}: {e}",
                info_log_path.display()
            ))
        })?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if silent { SILENT_FILTER } else { DEFAULT_FILTER }));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();

    Ok(())
}

/// Stop logging. Idempotent.
///
/// The tracing global dispatcher cannot be uninstalled, so this only records
/// the shutdown; subsequent events still pass the installed filter.
pub fn stop_logging() {
    tracing::debug!("Storage layer logging stopped");
}

//! Error taxonomy for the storage plugin.
//!
//! Four failure classes cross the plugin boundary:
//! - Fatal configuration errors (host must abort startup)
//! - Fatal lifecycle-contract misuse (programming errors in the integration)
//! - Administrative disable (fail fast, never touches the database)
//! - Query execution failures (recoverable, wrap the engine cause)
//!
//! A version mismatch during a conditional update is *not* an error; it is
//! reported as `Ok(false)` by the transactional operations.

use thiserror::Error;

/// Error type for all storage plugin operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invalid or missing deployment configuration. The message names the
    /// offending config key; the host is expected to abort startup.
    #[error("{0}")]
    Config(String),

    /// Misuse of the lifecycle contract (wrong init order, init from a
    /// foreign thread, use after close). Not expected in correct operation.
    #[error("{0}")]
    Lifecycle(String),

    /// The storage layer has been administratively disabled.
    #[error("storage layer disabled")]
    Disabled,

    /// A database operation failed. Wraps the underlying engine error.
    #[error("query execution failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// The connection pool could not be built or a pooled connection could
    /// not be acquired within the configured timeout.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

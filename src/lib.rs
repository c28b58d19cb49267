//! Sessionvault: a SQLite-backed session storage plugin.
//!
//! Sessionvault persists the entity set a session-management host hands it:
//! key-value settings (including rotating signing keys), login session
//! records, and past-token audit records. The host owns all session and
//! token business logic; this crate only stores and retrieves records on
//! request, over a bounded connection pool.
//!
//! # Architecture
//!
//! - **Per-context singletons**: config and pool live in a registry owned by
//!   each [`storage::SqliteStorage`]; independent contexts never share state
//! - **Bounded pool**: r2d2 over rusqlite; saturation blocks, never grows
//! - **Optimistic concurrency**: conditional writes with zero-rows-affected
//!   as the version-mismatch (retry) signal
//!
//! # Modules
//!
//! - [`config`]: YAML deployment configuration and validation
//! - [`error`]: the [`StorageError`] taxonomy
//! - [`observability`]: logging setup
//! - [`registry`]: process-scoped singleton registry
//! - [`storage`]: the plugin facade, pool, and persistence operations

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // storage::SqliteStorage is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc       // Error docs can be verbose
)]

pub mod config;
pub mod error;
pub mod observability;
pub mod registry;
pub mod storage;

pub use config::StorageConfig;
pub use error::StorageError;
pub use storage::SqliteStorage;

use uuid::Uuid;

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_millis() as i64
}

/// Generate a fresh opaque update sign for a session row.
///
/// A random UUID rather than a timestamp, so two updates in the same clock
/// tick still get distinct versions.
#[must_use]
pub(crate) fn generate_sign() -> String {
    Uuid::new_v4().to_string()
}

//! Record types persisted by the storage plugin.
//!
//! All timestamps are integer milliseconds since the Unix epoch, matching
//! what the host hands across the plugin boundary. Session data and JWT
//! payload blobs are opaque JSON owned by the host.

use serde_json::Value;

/// A key-value store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueEntry {
    /// Stored value
    pub value: String,
    /// Time of the last write, millis since epoch
    pub last_updated_time: i64,
}

/// A key-value entry observed for a transactional read-modify-write cycle.
///
/// The observed `last_updated_time` doubles as the optimistic-concurrency
/// token: a conditional write is applied only while the stored timestamp
/// still matches. `None` records that no row existed at read time, in which
/// case the conditional write becomes an insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueEntryWithVersion {
    /// Value to store (or the value observed, on the read side)
    pub value: String,
    /// Version token observed at read time; `None` if the row was absent
    pub last_updated_time: Option<i64>,
}

/// A login session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Opaque unique session identifier
    pub session_handle: String,
    /// Owning user
    pub user_id: String,
    /// Hash of the current refresh token, used as a secondary lookup key
    pub refresh_token_hash_2: String,
    /// Opaque session data blob owned by the host
    pub session_data: Value,
    /// Expiry time, millis since epoch
    pub expires_at: i64,
    /// Opaque JWT payload blob owned by the host
    pub jwt_payload: Value,
    /// Creation time, millis since epoch
    pub created_at_time: i64,
}

/// A session record plus its update sign, observed for a transactional
/// mutation.
///
/// The sign is an opaque token regenerated on every transactional session
/// update; a conditional update is applied only while the stored sign still
/// matches the one observed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecordWithSign {
    /// The session row as observed
    pub session: SessionRecord,
    /// Version token observed at read time
    pub last_updated_sign: String,
}

/// An audit record for a consumed refresh token.
///
/// Kept after the owning session is gone so the host can detect token
/// replay. Append-only; purged in bulk by an age cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PastTokenInfo {
    /// Hash of the consumed refresh token
    pub refresh_token_hash_2: String,
    /// Session the token belonged to
    pub session_handle: String,
    /// Expiry of the token, millis since epoch
    pub expiry: i64,
    /// Time the token was consumed, millis since epoch
    pub created_at_time: i64,
}

//! SQLite storage layer: the plugin facade the host drives.
//!
//! Provides:
//! - Lifecycle: construct, load config, init (pool + schema), close
//! - Key-value CRUD plus conditional writes for signing-key rotation
//! - Session CRUD plus conditional mutation for refresh-token rotation
//! - Past-token audit records and bulk cleanup
//!
//! Every operation borrows one pooled connection for its duration; the pool
//! and config are per-context singletons held in the context's registry, so
//! independent [`SqliteStorage`] instances never share state.

pub mod pool;
mod queries;
pub mod types;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use serde_json::Value;

use crate::config;
use crate::error::StorageError;
use crate::observability::logging;
use crate::registry::ResourceRegistry;
use crate::storage::pool::ConnectionPool;
use crate::storage::types::{
    KeyValueEntry, KeyValueEntryWithVersion, PastTokenInfo, SessionRecord, SessionRecordWithSign,
};

/// Well-known key for the host application id.
const APP_ID_KEY: &str = "app_id";
/// Well-known key for the host dev/production mode flag.
const USER_DEV_PRODUCTION_MODE_KEY: &str = "user_dev_production_mode";
/// Well-known key for the access-token signing key, rotated transactionally.
const ACCESS_TOKEN_SIGNING_KEY: &str = "access_token_signing_key";
/// Well-known key for the refresh-token signing key, rotated transactionally.
const REFRESH_TOKEN_KEY: &str = "refresh_token_key";

/// One logical storage context.
///
/// The host constructs one instance per process, drives its lifecycle
/// (`load_config` → `init_storage` → operations → `close`), and may share it
/// across worker threads; every operation is synchronous and self-contained.
pub struct SqliteStorage {
    /// Host-assigned process identifier, used in log output
    process_id: String,
    /// Suppress informational console logging
    silent: bool,
    /// Administrative disable switch
    enabled: AtomicBool,
    /// Thread that constructed this context; init must happen on it
    main_thread: ThreadId,
    /// Per-context singleton registry (config, connection pool)
    registry: ResourceRegistry,
}

impl SqliteStorage {
    /// Construct a storage context. Records the constructing thread: only it
    /// may later call [`SqliteStorage::init_storage`].
    pub fn new(process_id: impl Into<String>, silent: bool) -> Self {
        Self {
            process_id: process_id.into(),
            silent,
            enabled: AtomicBool::new(true),
            main_thread: std::thread::current().id(),
            registry: ResourceRegistry::new(),
        }
    }

    /// Host-assigned process identifier.
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// The per-context singleton registry.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Whether the storage layer is administratively enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the administrative disable switch. While disabled, every
    /// operation fails fast with [`StorageError::Disabled`] without touching
    /// the pool.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn main_thread_id(&self) -> ThreadId {
        self.main_thread
    }

    // -- lifecycle ----------------------------------------------------------

    /// Load the YAML config document at `path` into this context.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] on any load or validation failure;
    /// the host is expected to abort startup.
    pub fn load_config(&self, path: &Path) -> Result<(), StorageError> {
        config::load_config(self, path)
    }

    /// Initialize the connection pool and create the tables.
    ///
    /// Must run on the constructing thread, after
    /// [`SqliteStorage::load_config`]. Idempotent with respect to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Lifecycle`] on contract misuse and
    /// [`StorageError::Query`]/[`StorageError::Pool`] when the database
    /// cannot be opened or the schema cannot be created.
    pub fn init_storage(&self) -> Result<(), StorageError> {
        ConnectionPool::init(self)?;
        queries::create_tables_if_not_exists(self)
    }

    /// Route informational log output to a file in addition to the console.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] when the log file cannot be opened.
    pub fn init_file_logging(&self, info_log_path: &Path) -> Result<(), StorageError> {
        logging::init_file_logging(info_log_path, self.silent)
    }

    /// Stop routing log output. Idempotent.
    pub fn stop_logging(&self) {
        logging::stop_logging();
    }

    /// Release the connection pool. Idempotent; a no-op if storage was never
    /// initialized.
    pub fn close(&self) {
        ConnectionPool::close(self);
    }

    /// Clear every table. Whole-store reset used by the host between test
    /// runs; the schema stays in place.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] on engine failure.
    pub fn delete_all_information(&self) -> Result<(), StorageError> {
        queries::delete_all_information(self)
    }

    // -- key-value ----------------------------------------------------------

    /// Fetch a key-value entry.
    pub fn get_key_value(&self, key: &str) -> Result<Option<KeyValueEntry>, StorageError> {
        queries::get_key_value(self, key)
    }

    /// Upsert a key-value entry. Last writer wins; no version check.
    pub fn set_key_value(&self, key: &str, entry: &KeyValueEntry) -> Result<(), StorageError> {
        queries::set_key_value(self, key, entry)
    }

    /// Read a key together with its version token, starting a
    /// read-modify-write cycle.
    pub fn get_key_value_with_version(
        &self,
        key: &str,
    ) -> Result<Option<KeyValueEntryWithVersion>, StorageError> {
        queries::get_key_value_with_version(self, key)
    }

    /// Conditionally write a key-value entry: applied only while the stored
    /// version still equals the one observed at read time. `Ok(false)` means
    /// another writer won the race; retry the cycle.
    pub fn set_key_value_if_unchanged(
        &self,
        key: &str,
        entry: &KeyValueEntryWithVersion,
    ) -> Result<bool, StorageError> {
        queries::set_key_value_if_unchanged(self, key, entry)
    }

    /// Host application id, if one has been stored.
    pub fn get_app_id(&self) -> Result<Option<String>, StorageError> {
        Ok(self.get_key_value(APP_ID_KEY)?.map(|entry| entry.value))
    }

    /// Store the host application id.
    pub fn set_app_id(&self, app_id: &str) -> Result<(), StorageError> {
        self.set_key_value(
            APP_ID_KEY,
            &KeyValueEntry {
                value: app_id.to_string(),
                last_updated_time: crate::now_millis(),
            },
        )
    }

    /// Host dev/production mode flag, if one has been stored.
    pub fn get_user_dev_production_mode(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .get_key_value(USER_DEV_PRODUCTION_MODE_KEY)?
            .map(|entry| entry.value))
    }

    /// Store the host dev/production mode flag.
    pub fn set_user_dev_production_mode(&self, mode: &str) -> Result<(), StorageError> {
        self.set_key_value(
            USER_DEV_PRODUCTION_MODE_KEY,
            &KeyValueEntry {
                value: mode.to_string(),
                last_updated_time: crate::now_millis(),
            },
        )
    }

    /// Read the access-token signing key with its version, starting a
    /// rotation cycle.
    pub fn get_access_token_signing_key_transaction(
        &self,
    ) -> Result<Option<KeyValueEntryWithVersion>, StorageError> {
        self.get_key_value_with_version(ACCESS_TOKEN_SIGNING_KEY)
    }

    /// Conditionally rotate the access-token signing key.
    pub fn set_access_token_signing_key_transaction(
        &self,
        entry: &KeyValueEntryWithVersion,
    ) -> Result<bool, StorageError> {
        self.set_key_value_if_unchanged(ACCESS_TOKEN_SIGNING_KEY, entry)
    }

    /// Read the refresh-token signing key with its version, starting a
    /// rotation cycle.
    pub fn get_refresh_token_signing_key_transaction(
        &self,
    ) -> Result<Option<KeyValueEntryWithVersion>, StorageError> {
        self.get_key_value_with_version(REFRESH_TOKEN_KEY)
    }

    /// Conditionally rotate the refresh-token signing key.
    pub fn set_refresh_token_signing_key_transaction(
        &self,
        entry: &KeyValueEntryWithVersion,
    ) -> Result<bool, StorageError> {
        self.set_key_value_if_unchanged(REFRESH_TOKEN_KEY, entry)
    }

    // -- sessions -----------------------------------------------------------

    /// Persist a new login session.
    #[allow(clippy::too_many_arguments)] // mirrors the host's create-session call
    pub fn create_new_session(
        &self,
        session_handle: &str,
        user_id: &str,
        refresh_token_hash_2: &str,
        session_data: &Value,
        expires_at: i64,
        jwt_payload: &Value,
        created_at_time: i64,
    ) -> Result<(), StorageError> {
        queries::create_new_session(
            self,
            session_handle,
            user_id,
            refresh_token_hash_2,
            session_data,
            expires_at,
            jwt_payload,
            created_at_time,
        )
    }

    /// Fetch a session by handle.
    pub fn get_session(
        &self,
        session_handle: &str,
    ) -> Result<Option<SessionRecord>, StorageError> {
        queries::get_session(self, session_handle)
    }

    /// Replace a session's data and JWT payload blobs. Returns the number of
    /// rows changed (0 when the handle does not exist).
    pub fn update_session(
        &self,
        session_handle: &str,
        session_data: &Value,
        jwt_payload: &Value,
    ) -> Result<u64, StorageError> {
        queries::update_session(self, session_handle, session_data, jwt_payload)
    }

    /// Read a session together with its update sign, starting a
    /// transactional mutation cycle.
    pub fn get_session_info_transaction(
        &self,
        session_handle: &str,
    ) -> Result<Option<SessionRecordWithSign>, StorageError> {
        queries::get_session_with_sign(self, session_handle)
    }

    /// Conditionally rotate a session's refresh token and expiry: applied
    /// only while the stored sign still equals `expected_sign`. `Ok(false)`
    /// means another writer won the race; retry the cycle.
    pub fn update_session_info_transaction(
        &self,
        session_handle: &str,
        refresh_token_hash_2: &str,
        expires_at: i64,
        expected_sign: &str,
    ) -> Result<bool, StorageError> {
        queries::update_session_if_unchanged(
            self,
            session_handle,
            refresh_token_hash_2,
            expires_at,
            expected_sign,
        )
    }

    /// Number of stored sessions.
    pub fn get_number_of_sessions(&self) -> Result<u64, StorageError> {
        queries::session_count(self)
    }

    /// Delete the given session handles. An empty set is a no-op returning
    /// 0. Returns the number of sessions actually removed.
    pub fn delete_sessions(&self, session_handles: &[String]) -> Result<u64, StorageError> {
        queries::delete_sessions(self, session_handles)
    }

    /// All session handles belonging to a user.
    pub fn get_all_session_handles_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        queries::session_handles_for_user(self, user_id)
    }

    /// Remove every session whose expiry has passed.
    pub fn delete_all_expired_sessions(&self) -> Result<(), StorageError> {
        queries::delete_expired_sessions(self)
    }

    // -- past tokens --------------------------------------------------------

    /// Record a consumed refresh token for replay detection.
    pub fn insert_past_token(&self, info: &PastTokenInfo) -> Result<(), StorageError> {
        queries::insert_past_token(self, info)
    }

    /// Look up a past-token audit record by token hash.
    pub fn get_past_token_info(
        &self,
        refresh_token_hash_2: &str,
    ) -> Result<Option<PastTokenInfo>, StorageError> {
        queries::get_past_token(self, refresh_token_hash_2)
    }

    /// Number of stored past-token records.
    pub fn get_number_of_past_tokens(&self) -> Result<u64, StorageError> {
        queries::past_token_count(self)
    }

    /// Purge past-token records created strictly before the cutoff.
    pub fn delete_past_orphaned_tokens(&self, created_before: i64) -> Result<(), StorageError> {
        queries::delete_orphaned_past_tokens(self, created_before)
    }
}

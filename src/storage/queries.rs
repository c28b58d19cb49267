//! SQL for the three persisted tables.
//!
//! Every operation here borrows one pooled connection for its duration and
//! runs a single statement (or a short fixed sequence). Engine failures map
//! to [`StorageError::Query`] at this boundary; no rusqlite types leak
//! further up.
//!
//! Table names come from the loaded config, so they are interpolated into
//! the SQL text; all values are bound as parameters.

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde_json::Value;

use crate::config;
use crate::error::StorageError;
use crate::storage::types::{
    KeyValueEntry, KeyValueEntryWithVersion, PastTokenInfo, SessionRecord, SessionRecordWithSign,
};
use crate::storage::{pool::ConnectionPool, SqliteStorage};
use crate::{generate_sign, now_millis};

/// Create the three tables if they do not exist. Run once at init; this is
/// the only schema management in scope.
pub(crate) fn create_tables_if_not_exists(storage: &SqliteStorage) -> Result<(), StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {kv} (
            key TEXT NOT NULL PRIMARY KEY,
            value TEXT NOT NULL,
            last_updated_time INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {session} (
            session_handle TEXT NOT NULL PRIMARY KEY,
            user_id TEXT NOT NULL,
            refresh_token_hash_2 TEXT NOT NULL,
            session_data TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            jwt_payload TEXT NOT NULL,
            created_at_time INTEGER NOT NULL,
            last_updated_sign TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {past} (
            refresh_token_hash_2 TEXT NOT NULL PRIMARY KEY,
            session_handle TEXT NOT NULL,
            expiry INTEGER NOT NULL,
            created_at_time INTEGER NOT NULL
        );",
        kv = config.key_value_table(),
        session = config.session_info_table(),
        past = config.past_tokens_table(),
    ))?;
    Ok(())
}

/// Clear every table. Whole-store reset; the schema stays in place.
pub(crate) fn delete_all_information(storage: &SqliteStorage) -> Result<(), StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    conn.execute_batch(&format!(
        "DELETE FROM {kv};
         DELETE FROM {session};
         DELETE FROM {past};",
        kv = config.key_value_table(),
        session = config.session_info_table(),
        past = config.past_tokens_table(),
    ))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key-value store
// ---------------------------------------------------------------------------

pub(crate) fn get_key_value(
    storage: &SqliteStorage,
    key: &str,
) -> Result<Option<KeyValueEntry>, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let entry = conn
        .query_row(
            &format!(
                "SELECT value, last_updated_time FROM {} WHERE key = ?1",
                config.key_value_table()
            ),
            params![key],
            |row| {
                Ok(KeyValueEntry {
                    value: row.get(0)?,
                    last_updated_time: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

/// Plain upsert. Last writer wins; no version check.
pub(crate) fn set_key_value(
    storage: &SqliteStorage,
    key: &str,
    entry: &KeyValueEntry,
) -> Result<(), StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (key, value, last_updated_time) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 last_updated_time = excluded.last_updated_time",
            config.key_value_table()
        ),
        params![key, entry.value, entry.last_updated_time],
    )?;
    Ok(())
}

/// Read a key together with its version token for a read-modify-write cycle.
pub(crate) fn get_key_value_with_version(
    storage: &SqliteStorage,
    key: &str,
) -> Result<Option<KeyValueEntryWithVersion>, StorageError> {
    Ok(get_key_value(storage, key)?.map(|entry| KeyValueEntryWithVersion {
        value: entry.value,
        last_updated_time: Some(entry.last_updated_time),
    }))
}

/// Conditional write for the key-value protocol.
///
/// Applies the write only while the stored version still equals the one
/// observed at read time. When the caller observed no row, the write becomes
/// an insert-if-absent. Returns whether the write was applied; `false` means
/// another writer won the race and the caller should retry the cycle.
///
/// A single conditional statement is atomic under SQLite's write lock, so no
/// explicit lock phase is needed.
pub(crate) fn set_key_value_if_unchanged(
    storage: &SqliteStorage,
    key: &str,
    entry: &KeyValueEntryWithVersion,
) -> Result<bool, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let now = now_millis();
    let changed = match entry.last_updated_time {
        Some(expected) => conn.execute(
            &format!(
                "UPDATE {} SET value = ?1, last_updated_time = ?2
                 WHERE key = ?3 AND last_updated_time = ?4",
                config.key_value_table()
            ),
            params![entry.value, now, key, expected],
        )?,
        None => conn.execute(
            &format!(
                "INSERT INTO {} (key, value, last_updated_time) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO NOTHING",
                config.key_value_table()
            ),
            params![key, entry.value, now],
        )?,
    };
    Ok(changed == 1)
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        session_handle: row.get(0)?,
        user_id: row.get(1)?,
        refresh_token_hash_2: row.get(2)?,
        session_data: json_column(row, 3)?,
        expires_at: row.get(4)?,
        jwt_payload: json_column(row, 5)?,
        created_at_time: row.get(6)?,
    })
}

/// Parse a JSON blob column, reporting a malformed blob as a column
/// conversion failure so it surfaces as a query error like any other.
fn json_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}

#[allow(clippy::too_many_arguments)] // mirrors the host's create-session call
pub(crate) fn create_new_session(
    storage: &SqliteStorage,
    session_handle: &str,
    user_id: &str,
    refresh_token_hash_2: &str,
    session_data: &Value,
    expires_at: i64,
    jwt_payload: &Value,
    created_at_time: i64,
) -> Result<(), StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (session_handle, user_id, refresh_token_hash_2, session_data,
                 expires_at, jwt_payload, created_at_time, last_updated_sign)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            config.session_info_table()
        ),
        params![
            session_handle,
            user_id,
            refresh_token_hash_2,
            session_data.to_string(),
            expires_at,
            jwt_payload.to_string(),
            created_at_time,
            generate_sign(),
        ],
    )?;
    Ok(())
}

pub(crate) fn get_session(
    storage: &SqliteStorage,
    session_handle: &str,
) -> Result<Option<SessionRecord>, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let record = conn
        .query_row(
            &format!(
                "SELECT session_handle, user_id, refresh_token_hash_2, session_data,
                     expires_at, jwt_payload, created_at_time
                 FROM {} WHERE session_handle = ?1",
                config.session_info_table()
            ),
            params![session_handle],
            session_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Plain session mutation (data and JWT payload blobs). Returns the number
/// of rows changed: 0 when the handle does not exist.
pub(crate) fn update_session(
    storage: &SqliteStorage,
    session_handle: &str,
    session_data: &Value,
    jwt_payload: &Value,
) -> Result<u64, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET session_data = ?1, jwt_payload = ?2 WHERE session_handle = ?3",
            config.session_info_table()
        ),
        params![session_data.to_string(), jwt_payload.to_string(), session_handle],
    )?;
    Ok(changed as u64)
}

/// Read a session together with its update sign for a transactional cycle.
pub(crate) fn get_session_with_sign(
    storage: &SqliteStorage,
    session_handle: &str,
) -> Result<Option<SessionRecordWithSign>, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let record = conn
        .query_row(
            &format!(
                "SELECT session_handle, user_id, refresh_token_hash_2, session_data,
                     expires_at, jwt_payload, created_at_time, last_updated_sign
                 FROM {} WHERE session_handle = ?1",
                config.session_info_table()
            ),
            params![session_handle],
            |row| {
                Ok(SessionRecordWithSign {
                    session: session_from_row(row)?,
                    last_updated_sign: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Conditional session mutation for refresh-token rotation.
///
/// Updates the refresh-token hash and expiry, regenerating the update sign,
/// only while the stored sign still equals `expected_sign`. Returns whether
/// the update was applied; `false` is the normal retry signal.
pub(crate) fn update_session_if_unchanged(
    storage: &SqliteStorage,
    session_handle: &str,
    refresh_token_hash_2: &str,
    expires_at: i64,
    expected_sign: &str,
) -> Result<bool, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET refresh_token_hash_2 = ?1, expires_at = ?2, last_updated_sign = ?3
             WHERE session_handle = ?4 AND last_updated_sign = ?5",
            config.session_info_table()
        ),
        params![
            refresh_token_hash_2,
            expires_at,
            generate_sign(),
            session_handle,
            expected_sign,
        ],
    )?;
    Ok(changed == 1)
}

pub(crate) fn session_count(storage: &SqliteStorage) -> Result<u64, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", config.session_info_table()),
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Delete the given session handles with one parameterized statement.
///
/// An empty set is a no-op returning 0 without issuing SQL. Returns the
/// number of rows actually removed.
pub(crate) fn delete_sessions(
    storage: &SqliteStorage,
    session_handles: &[String],
) -> Result<u64, StorageError> {
    if session_handles.is_empty() {
        return Ok(0);
    }
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let placeholders = vec!["?"; session_handles.len()].join(", ");
    let changed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE session_handle IN ({placeholders})",
            config.session_info_table()
        ),
        params_from_iter(session_handles.iter()),
    )?;
    Ok(changed as u64)
}

pub(crate) fn session_handles_for_user(
    storage: &SqliteStorage,
    user_id: &str,
) -> Result<Vec<String>, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT session_handle FROM {} WHERE user_id = ?1",
        config.session_info_table()
    ))?;
    let handles = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(handles)
}

/// Remove every session whose expiry has passed. Unexpired sessions are
/// untouched.
pub(crate) fn delete_expired_sessions(storage: &SqliteStorage) -> Result<(), StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    conn.execute(
        &format!(
            "DELETE FROM {} WHERE expires_at <= ?1",
            config.session_info_table()
        ),
        params![now_millis()],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Past tokens
// ---------------------------------------------------------------------------

pub(crate) fn insert_past_token(
    storage: &SqliteStorage,
    info: &PastTokenInfo,
) -> Result<(), StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (refresh_token_hash_2, session_handle, expiry, created_at_time)
             VALUES (?1, ?2, ?3, ?4)",
            config.past_tokens_table()
        ),
        params![
            info.refresh_token_hash_2,
            info.session_handle,
            info.expiry,
            info.created_at_time,
        ],
    )?;
    Ok(())
}

pub(crate) fn get_past_token(
    storage: &SqliteStorage,
    refresh_token_hash_2: &str,
) -> Result<Option<PastTokenInfo>, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let info = conn
        .query_row(
            &format!(
                "SELECT refresh_token_hash_2, session_handle, expiry, created_at_time
                 FROM {} WHERE refresh_token_hash_2 = ?1",
                config.past_tokens_table()
            ),
            params![refresh_token_hash_2],
            |row| {
                Ok(PastTokenInfo {
                    refresh_token_hash_2: row.get(0)?,
                    session_handle: row.get(1)?,
                    expiry: row.get(2)?,
                    created_at_time: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(info)
}

pub(crate) fn past_token_count(storage: &SqliteStorage) -> Result<u64, StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", config.past_tokens_table()),
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Purge audit records older than the cutoff (strictly before).
pub(crate) fn delete_orphaned_past_tokens(
    storage: &SqliteStorage,
    created_before: i64,
) -> Result<(), StorageError> {
    let config = config::get_config(storage)?;
    let conn = ConnectionPool::connection(storage)?;
    conn.execute(
        &format!(
            "DELETE FROM {} WHERE created_at_time < ?1",
            config.past_tokens_table()
        ),
        params![created_before],
    )?;
    Ok(())
}

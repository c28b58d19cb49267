//! Bounded SQLite connection pool, one per storage context.
//!
//! Uses r2d2 with r2d2_sqlite. The pool is a registry singleton created
//! exactly once by the thread that constructed the storage context; every
//! persistence operation borrows one connection for its duration and never
//! retains it. Exceeding the pool size blocks callers up to a fixed timeout
//! instead of opening unbounded connections.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::config;
use crate::error::StorageError;
use crate::storage::SqliteStorage;

/// Registry key under which the pool singleton is stored.
pub(crate) const RESOURCE_KEY: &str = "sessionvault.connection_pool";

/// How long a saturated `connection()` call blocks before failing.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
/// Busy timeout applied to every pooled connection.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// A pooled SQLite connection, released back to the pool on drop.
pub type StorageConnection = PooledConnection<SqliteConnectionManager>;

/// Connection pool singleton for a storage context.
///
/// The inner option is taken on [`ConnectionPool::close`]; the registry slot
/// itself is write-once, so a closed pool stays closed for the lifetime of
/// the context.
pub struct ConnectionPool {
    /// The r2d2 pool, `None` once closed
    pool: Mutex<Option<Pool<SqliteConnectionManager>>>,
}

impl ConnectionPool {
    /// Build the pool from the loaded config.
    fn new(storage: &SqliteStorage) -> Result<Self, StorageError> {
        if !storage.is_enabled() {
            return Err(StorageError::Disabled);
        }
        let config = config::get_config(storage)?;
        let manager = SqliteConnectionManager::file(config.database_path());
        let pool = Pool::builder()
            .max_size(config.pool_size())
            .connection_timeout(ACQUIRE_TIMEOUT)
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(manager)?;
        Ok(Self {
            pool: Mutex::new(Some(pool)),
        })
    }

    /// Initialize the pool for this storage context.
    ///
    /// Idempotent: a silent no-op if the pool singleton already exists. Must
    /// be invoked from the thread that constructed the storage context; any
    /// other thread signals a host integration bug.
    ///
    /// Opens the database file, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Lifecycle`] when called from a foreign thread,
    /// [`StorageError::Disabled`] while the layer is disabled, and
    /// [`StorageError::Pool`] when the pool cannot be built.
    pub fn init(storage: &SqliteStorage) -> Result<(), StorageError> {
        if storage.registry().get::<Self>(RESOURCE_KEY).is_some() {
            return Ok(());
        }
        if std::thread::current().id() != storage.main_thread_id() {
            return Err(StorageError::Lifecycle(
                "init_storage must be called from the thread that constructed the storage \
                 context"
                    .to_string(),
            ));
        }
        tracing::info!(process_id = %storage.process_id(), "Setting up SQLite connection pool");
        let pool = Self::new(storage)?;
        storage.registry().set(RESOURCE_KEY, Arc::new(pool));
        Ok(())
    }

    /// Borrow one connection from the pool, blocking up to the acquire
    /// timeout when the pool is saturated.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Lifecycle`] before [`ConnectionPool::init`]
    /// or after [`ConnectionPool::close`], [`StorageError::Disabled`] while
    /// the layer is disabled, and [`StorageError::Pool`] on acquire timeout.
    pub fn connection(storage: &SqliteStorage) -> Result<StorageConnection, StorageError> {
        let Some(instance) = storage.registry().get::<Self>(RESOURCE_KEY) else {
            return Err(StorageError::Lifecycle(
                "init_storage must be called before acquiring a connection".to_string(),
            ));
        };
        if !storage.is_enabled() {
            return Err(StorageError::Disabled);
        }
        let pool = {
            let guard = instance.pool.lock().unwrap();
            guard.clone()
        };
        let Some(pool) = pool else {
            return Err(StorageError::Lifecycle(
                "the connection pool has been closed".to_string(),
            ));
        };
        Ok(pool.get()?)
    }

    /// Release the pool and all its connections. Idempotent; a no-op when
    /// the pool was never initialized.
    pub fn close(storage: &SqliteStorage) {
        let Some(instance) = storage.registry().get::<Self>(RESOURCE_KEY) else {
            return;
        };
        let mut guard = instance.pool.lock().unwrap();
        guard.take();
    }
}

/// Connection customizer applying per-connection pragmas.
#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        // WAL lets readers proceed while one writer holds the write lock.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)
    }
}

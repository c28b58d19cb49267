//! Deployment configuration for the storage plugin.
//!
//! The host hands the plugin a path to a YAML config document. Parsing and
//! validation happen once per storage context; the resulting immutable
//! [`StorageConfig`] is stored in the context's resource registry.
//!
//! Every validation failure is a fatal [`StorageError::Config`] whose message
//! names the offending key, so an operator can fix the file and restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::StorageError;
use crate::storage::SqliteStorage;

/// Registry key under which the loaded config singleton is stored.
pub(crate) const RESOURCE_KEY: &str = "sessionvault.config";

/// Default connection pool size.
const DEFAULT_POOL_SIZE: i64 = 10;
/// Default database file name (without the `.db` extension).
const DEFAULT_DATABASE_NAME: &str = "auth_session";

/// Immutable deployment settings parsed from the YAML config document.
///
/// Unknown keys in the document are ignored so the same file can carry
/// settings for other components of the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximum number of pooled SQLite connections. Parsed as signed so a
    /// negative value reaches validation instead of failing deserialization.
    connection_pool_size: i64,
    /// Directory that holds the database file. Required, no default.
    database_folder_location: Option<String>,
    /// Database file name, stored as `<name>.db` inside the folder.
    database_name: String,
    /// Table name for the key-value store.
    key_value_table_name: String,
    /// Table name for session records.
    session_info_table_name: String,
    /// Table name for past-token audit records.
    past_tokens_table_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_pool_size: DEFAULT_POOL_SIZE,
            database_folder_location: None,
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            key_value_table_name: "key_value".to_string(),
            session_info_table_name: "session_info".to_string(),
            past_tokens_table_name: "past_tokens".to_string(),
        }
    }
}

impl StorageConfig {
    /// Load and validate a config document from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] when the file cannot be read or
    /// parsed, or when any validation rule fails.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            StorageError::Config(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Pre-flight probe: report whether a full load of `path` would succeed,
    /// without surfacing the error itself.
    pub fn can_be_used(path: &Path) -> bool {
        Self::load(path).is_ok()
    }

    /// Validate the parsed settings.
    fn validate(&self) -> Result<(), StorageError> {
        let location = self
            .database_folder_location
            .as_deref()
            .filter(|loc| !loc.is_empty())
            .ok_or_else(|| {
                StorageError::Config(
                    "'database_folder_location' is not set in the config file. Please set this \
                     value and restart"
                        .to_string(),
                )
            })?;

        if location.contains('~') {
            return Err(StorageError::Config(
                "The database location set in 'database_folder_location' cannot contain '~'. \
                 Please set a valid location and restart"
                    .to_string(),
            ));
        }

        if !Path::new(location).is_dir() {
            return Err(StorageError::Config(
                "The database location set in 'database_folder_location' does not exist. Please \
                 set a valid location and restart"
                    .to_string(),
            ));
        }

        if self.connection_pool_size <= 0 {
            return Err(StorageError::Config(
                "'connection_pool_size' in the config file must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Bounded pool size. Only meaningful after validation.
    pub fn pool_size(&self) -> u32 {
        u32::try_from(self.connection_pool_size).unwrap_or(DEFAULT_POOL_SIZE as u32)
    }

    /// Full path of the database file. SQLite creates the file on first open.
    pub fn database_path(&self) -> PathBuf {
        let folder = self.database_folder_location.as_deref().unwrap_or_default();
        Path::new(folder).join(format!("{}.db", self.database_name))
    }

    /// Key-value table name.
    pub fn key_value_table(&self) -> &str {
        &self.key_value_table_name
    }

    /// Session record table name.
    pub fn session_info_table(&self) -> &str {
        &self.session_info_table_name
    }

    /// Past-token audit table name.
    pub fn past_tokens_table(&self) -> &str {
        &self.past_tokens_table_name
    }
}

/// Load the config document at `path` into the storage context.
///
/// Idempotent: a no-op if the context already holds a config.
///
/// # Errors
///
/// Returns [`StorageError::Config`] when loading or validation fails.
pub fn load_config(storage: &SqliteStorage, path: &Path) -> Result<(), StorageError> {
    if storage.registry().get::<StorageConfig>(RESOURCE_KEY).is_some() {
        return Ok(());
    }
    tracing::info!(process_id = %storage.process_id(), "Loading SQLite config");
    let config = StorageConfig::load(path)?;
    storage.registry().set(RESOURCE_KEY, Arc::new(config));
    Ok(())
}

/// Fetch the loaded config for this storage context.
///
/// # Errors
///
/// Returns [`StorageError::Lifecycle`] when called before [`load_config`].
pub fn get_config(storage: &SqliteStorage) -> Result<Arc<StorageConfig>, StorageError> {
    storage
        .registry()
        .get::<StorageConfig>(RESOURCE_KEY)
        .ok_or_else(|| {
            StorageError::Lifecycle(
                "load_config must be called before the storage layer is used".to_string(),
            )
        })
}

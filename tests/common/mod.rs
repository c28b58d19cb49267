//! Test fixtures for the storage plugin tests.
//!
//! Provides:
//! - A temporary database directory with a YAML config file
//! - A fully initialized storage context per test

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use sessionvault::SqliteStorage;
use tempfile::TempDir;

/// Test fixture managing a temporary database directory and config file.
///
/// Everything is cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory holding the config file and database
    pub temp_dir: TempDir,
    /// Path to the generated config file
    pub config_path: PathBuf,
}

impl TestFixture {
    /// Create a fixture with a default config (pool size 10).
    pub fn new() -> Self {
        Self::with_extra_config("")
    }

    /// Create a fixture whose config file carries extra YAML lines on top of
    /// the required `database_folder_location`.
    pub fn with_extra_config(extra: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&config_path).expect("failed to create config file");
        writeln!(
            file,
            "database_folder_location: \"{}\"",
            temp_dir.path().display()
        )
        .expect("failed to write config");
        if !extra.is_empty() {
            writeln!(file, "{extra}").expect("failed to write config");
        }
        Self {
            temp_dir,
            config_path,
        }
    }

    /// Construct, configure, and initialize a storage context against this
    /// fixture's database.
    pub fn storage(&self) -> SqliteStorage {
        let storage = SqliteStorage::new("test-process", true);
        storage
            .load_config(&self.config_path)
            .expect("config should load");
        storage.init_storage().expect("storage should initialize");
        storage
    }

    /// Construct a storage context with the config loaded but storage not
    /// yet initialized.
    pub fn unstarted_storage(&self) -> SqliteStorage {
        let storage = SqliteStorage::new("test-process", true);
        storage
            .load_config(&self.config_path)
            .expect("config should load");
        storage
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

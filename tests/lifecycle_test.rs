//! Lifecycle contract tests: init order, thread affinity, the
//! administrative disable switch, and bounded pool behavior.

mod common;

use std::time::{Duration, Instant};

use common::TestFixture;
use sessionvault::storage::pool::ConnectionPool;
use sessionvault::{SqliteStorage, StorageError};

#[test]
fn test_operations_before_init_fail_with_lifecycle_error() {
    let fixture = TestFixture::new();
    let storage = fixture.unstarted_storage();

    let result = storage.get_key_value("anything");
    assert!(matches!(result, Err(StorageError::Lifecycle(_))));
}

#[test]
fn test_config_must_be_loaded_before_init() {
    let storage = SqliteStorage::new("test-process", true);
    let result = storage.init_storage();
    assert!(matches!(result, Err(StorageError::Lifecycle(_))));
}

#[test]
fn test_init_is_idempotent() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    storage.init_storage().unwrap();
    storage.init_storage().unwrap();
    assert!(storage.get_key_value("anything").unwrap().is_none());
}

#[test]
fn test_load_config_is_idempotent() {
    let fixture = TestFixture::new();
    let storage = fixture.unstarted_storage();
    storage.load_config(&fixture.config_path).unwrap();
    storage.init_storage().unwrap();
}

#[test]
fn test_init_from_foreign_thread_is_a_lifecycle_error() {
    let fixture = TestFixture::new();
    let storage = fixture.unstarted_storage();

    let result = std::thread::scope(|scope| {
        scope.spawn(|| storage.init_storage()).join().unwrap()
    });
    assert!(matches!(result, Err(StorageError::Lifecycle(_))));

    // The constructing thread may still initialize.
    storage.init_storage().unwrap();
}

#[test]
fn test_disabled_storage_fails_fast() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    storage.set_enabled(false);
    assert!(matches!(
        storage.get_key_value("anything"),
        Err(StorageError::Disabled)
    ));

    storage.set_enabled(true);
    assert!(storage.get_key_value("anything").unwrap().is_none());
}

#[test]
fn test_init_while_disabled_is_refused() {
    let fixture = TestFixture::new();
    let storage = fixture.unstarted_storage();

    storage.set_enabled(false);
    assert!(matches!(
        storage.init_storage(),
        Err(StorageError::Disabled)
    ));
}

#[test]
fn test_close_is_idempotent_and_final() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    storage.close();
    storage.close();
    assert!(matches!(
        storage.get_key_value("anything"),
        Err(StorageError::Lifecycle(_))
    ));
}

#[test]
fn test_close_without_init_is_a_noop() {
    let fixture = TestFixture::new();
    let storage = fixture.unstarted_storage();
    storage.close();
}

#[test]
fn test_independent_contexts_do_not_share_state() {
    let fixture_a = TestFixture::new();
    let fixture_b = TestFixture::new();
    let storage_a = fixture_a.storage();
    let storage_b = fixture_b.storage();

    storage_a.set_app_id("app-a").unwrap();
    assert!(storage_b.get_app_id().unwrap().is_none());

    storage_a.close();
    assert!(storage_b.get_app_id().unwrap().is_none());
}

#[test]
fn test_saturated_pool_blocks_until_a_connection_frees_up() {
    let fixture = TestFixture::with_extra_config("connection_pool_size: 5");
    let storage = fixture.storage();

    let mut held: Vec<_> = (0..5)
        .map(|_| ConnectionPool::connection(&storage).expect("pool should hand out 5"))
        .collect();

    let hold_time = Duration::from_millis(300);
    let elapsed = std::thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let start = Instant::now();
            let conn = ConnectionPool::connection(&storage).expect("acquire should succeed");
            drop(conn);
            start.elapsed()
        });

        std::thread::sleep(hold_time);
        held.pop();

        waiter.join().unwrap()
    });

    assert!(
        elapsed >= hold_time - Duration::from_millis(50),
        "sixth acquire should have blocked while the pool was saturated, \
         but completed after {elapsed:?}"
    );
}

//! Key-value store tests: plain CRUD, named wrappers, and the conditional
//! write protocol used for signing-key rotation.

mod common;

use common::TestFixture;
use sessionvault::now_millis;
use sessionvault::storage::types::{KeyValueEntry, KeyValueEntryWithVersion};

#[test]
fn test_set_then_get_roundtrip() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    let before = now_millis();
    storage
        .set_key_value(
            "greeting",
            &KeyValueEntry {
                value: "hello".into(),
                last_updated_time: now_millis(),
            },
        )
        .unwrap();

    let entry = storage.get_key_value("greeting").unwrap().unwrap();
    assert_eq!(entry.value, "hello");
    assert!(entry.last_updated_time >= before);
}

#[test]
fn test_get_missing_key_returns_none() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    assert!(storage.get_key_value("missing").unwrap().is_none());
}

#[test]
fn test_set_overwrites_in_place() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    for value in ["one", "two"] {
        storage
            .set_key_value(
                "counter",
                &KeyValueEntry {
                    value: value.into(),
                    last_updated_time: now_millis(),
                },
            )
            .unwrap();
    }

    let entry = storage.get_key_value("counter").unwrap().unwrap();
    assert_eq!(entry.value, "two");
}

#[test]
fn test_app_id_wrappers() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    assert!(storage.get_app_id().unwrap().is_none());
    storage.set_app_id("my-app").unwrap();
    assert_eq!(storage.get_app_id().unwrap().as_deref(), Some("my-app"));

    storage.set_user_dev_production_mode("DEV").unwrap();
    assert_eq!(
        storage.get_user_dev_production_mode().unwrap().as_deref(),
        Some("DEV")
    );
}

#[test]
fn test_conditional_insert_when_no_row_observed() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    assert!(storage
        .get_access_token_signing_key_transaction()
        .unwrap()
        .is_none());

    // Observed no row: the conditional write is an insert-if-absent.
    let applied = storage
        .set_access_token_signing_key_transaction(&KeyValueEntryWithVersion {
            value: "key-v1".into(),
            last_updated_time: None,
        })
        .unwrap();
    assert!(applied);

    // A second insert-if-absent loses.
    let applied = storage
        .set_access_token_signing_key_transaction(&KeyValueEntryWithVersion {
            value: "key-v1-other".into(),
            last_updated_time: None,
        })
        .unwrap();
    assert!(!applied);

    let stored = storage
        .get_access_token_signing_key_transaction()
        .unwrap()
        .unwrap();
    assert_eq!(stored.value, "key-v1");
}

#[test]
fn test_conditional_update_with_matching_version() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    storage
        .set_refresh_token_signing_key_transaction(&KeyValueEntryWithVersion {
            value: "key-v1".into(),
            last_updated_time: None,
        })
        .unwrap();

    let observed = storage
        .get_refresh_token_signing_key_transaction()
        .unwrap()
        .unwrap();

    let applied = storage
        .set_refresh_token_signing_key_transaction(&KeyValueEntryWithVersion {
            value: "key-v2".into(),
            last_updated_time: observed.last_updated_time,
        })
        .unwrap();
    assert!(applied);

    let stored = storage
        .get_refresh_token_signing_key_transaction()
        .unwrap()
        .unwrap();
    assert_eq!(stored.value, "key-v2");
}

#[test]
fn test_conditional_update_with_stale_version_is_rejected() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    storage
        .set_key_value(
            "rotating",
            &KeyValueEntry {
                value: "v1".into(),
                last_updated_time: 1_000,
            },
        )
        .unwrap();

    // Claims to have observed a version that was never stored.
    let applied = storage
        .set_key_value_if_unchanged(
            "rotating",
            &KeyValueEntryWithVersion {
                value: "v2".into(),
                last_updated_time: Some(999),
            },
        )
        .unwrap();
    assert!(!applied);

    let stored = storage.get_key_value("rotating").unwrap().unwrap();
    assert_eq!(stored.value, "v1");
}

#[test]
fn test_concurrent_writers_exactly_one_wins() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    storage
        .set_key_value(
            "signing_key",
            &KeyValueEntry {
                value: "original".into(),
                last_updated_time: now_millis(),
            },
        )
        .unwrap();

    // Keep the racing writes out of the millisecond the original landed in,
    // so a winner's new timestamp can never equal the observed version.
    std::thread::sleep(std::time::Duration::from_millis(5));

    let observed = storage
        .get_key_value_with_version("signing_key")
        .unwrap()
        .unwrap();

    let barrier = std::sync::Barrier::new(2);
    let results: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["writer-a", "writer-b"]
            .into_iter()
            .map(|value| {
                let observed = observed.clone();
                let storage = &storage;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    storage
                        .set_key_value_if_unchanged(
                            "signing_key",
                            &KeyValueEntryWithVersion {
                                value: value.into(),
                                last_updated_time: observed.last_updated_time,
                            },
                        )
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let wins = results.iter().filter(|&&applied| applied).count();
    assert_eq!(wins, 1, "exactly one concurrent writer must win");

    let stored = storage.get_key_value("signing_key").unwrap().unwrap();
    let winner = if results[0] { "writer-a" } else { "writer-b" };
    assert_eq!(stored.value, winner);
}

//! Past-token audit record tests: insert, lookup, count, and the
//! age-cutoff cleanup.

mod common;

use common::TestFixture;
use sessionvault::now_millis;
use sessionvault::storage::types::PastTokenInfo;

fn token(hash: &str, created_at_time: i64) -> PastTokenInfo {
    PastTokenInfo {
        refresh_token_hash_2: hash.to_string(),
        session_handle: "s1".to_string(),
        expiry: created_at_time + 60_000,
        created_at_time,
    }
}

#[test]
fn test_insert_then_get_roundtrip() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    let info = token("hash-1", now_millis());
    storage.insert_past_token(&info).unwrap();

    let stored = storage.get_past_token_info("hash-1").unwrap().unwrap();
    assert_eq!(stored, info);
    assert!(storage.get_past_token_info("hash-2").unwrap().is_none());
}

#[test]
fn test_count_tracks_inserts() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    assert_eq!(storage.get_number_of_past_tokens().unwrap(), 0);
    for i in 0..3 {
        storage
            .insert_past_token(&token(&format!("hash-{i}"), now_millis()))
            .unwrap();
    }
    assert_eq!(storage.get_number_of_past_tokens().unwrap(), 3);
}

#[test]
fn test_orphan_cleanup_cutoff_is_strict() {
    let fixture = TestFixture::new();
    let storage = fixture.storage();

    let t = now_millis();
    storage.insert_past_token(&token("old", t)).unwrap();

    // Cutoff after the insert time removes the record.
    storage.delete_past_orphaned_tokens(t + 1).unwrap();
    assert!(storage.get_past_token_info("old").unwrap().is_none());

    // A newer record survives a cutoff before its insert time.
    storage.insert_past_token(&token("new", t)).unwrap();
    storage.delete_past_orphaned_tokens(t - 1).unwrap();
    assert!(storage.get_past_token_info("new").unwrap().is_some());

    // A record created exactly at the cutoff also survives (strictly before).
    storage.delete_past_orphaned_tokens(t).unwrap();
    assert!(storage.get_past_token_info("new").unwrap().is_some());
}

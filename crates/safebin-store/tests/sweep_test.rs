//! Cleanup: expired artifacts disappear from disk and database; stale temp
//! entries are removed by age.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tempfile::TempDir;

use safebin_store::Store;

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path(), 100).expect("open store")
}

#[test]
fn expired_artifact_is_fully_reaped() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let now = Utc::now();

    // An artifact registered two hours ago with a one-hour retention.
    let id = "expiredfile1";
    std::fs::write(store.artifact_path(id), b"placeholder ciphertext").unwrap();
    store
        .db()
        .register_at(id, 22, Duration::from_secs(3600), now - TimeDelta::hours(2))
        .unwrap();

    let reaped = store.sweep_expired(now).unwrap();
    assert_eq!(reaped, 1);

    assert!(!store.artifact_path(id).exists());
    assert!(store.db().lookup(id).unwrap().is_none());
    assert!(store.db().expiry_rows().unwrap().is_empty());
}

#[test]
fn live_artifact_survives_sweep() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let id = "livefile0001";
    std::fs::write(store.artifact_path(id), b"data").unwrap();
    store.register(id, 4).unwrap();

    assert_eq!(store.sweep_expired(Utc::now()).unwrap(), 0);
    assert!(store.artifact_path(id).exists());
    assert!(store.db().lookup(id).unwrap().is_some());
}

#[test]
fn sweep_twice_equals_sweep_once() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let now = Utc::now();

    let id = "expiredfile2";
    std::fs::write(store.artifact_path(id), b"x").unwrap();
    store
        .db()
        .register_at(id, 1, Duration::from_secs(60), now - TimeDelta::hours(1))
        .unwrap();

    assert_eq!(store.sweep_expired(now).unwrap(), 1);
    assert_eq!(store.sweep_expired(now).unwrap(), 0);
    assert!(!store.artifact_path(id).exists());
}

#[test]
fn missing_ciphertext_does_not_abort_reap() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let now = Utc::now();

    // Record without a file and a record with one, both expired.
    store
        .db()
        .register_at("noartifact01", 5, Duration::from_secs(60), now - TimeDelta::hours(1))
        .unwrap();
    std::fs::write(store.artifact_path("withfile0001"), b"y").unwrap();
    store
        .db()
        .register_at("withfile0001", 1, Duration::from_secs(60), now - TimeDelta::hours(1))
        .unwrap();

    assert_eq!(store.sweep_expired(now).unwrap(), 2);
    assert!(!store.artifact_path("withfile0001").exists());
}

#[test]
fn stale_temp_entries_are_removed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    // A stale session directory and a stale scratch file.
    let session = store.tmp_dir().join("oldsession12");
    std::fs::create_dir_all(&session).unwrap();
    std::fs::write(session.join("0"), b"chunk").unwrap();
    std::fs::write(store.tmp_dir().join("up_orphan"), b"scratch").unwrap();

    std::thread::sleep(Duration::from_millis(50));
    let removed = store.sweep_temp(Duration::from_millis(10)).unwrap();
    assert_eq!(removed, 2);
    assert!(!session.exists());

    // Fresh entries stay.
    std::fs::write(store.tmp_dir().join("up_fresh"), b"scratch").unwrap();
    let removed = store.sweep_temp(Duration::from_secs(3600)).unwrap();
    assert_eq!(removed, 0);
    assert!(store.tmp_dir().join("up_fresh").exists());
}

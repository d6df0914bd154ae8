//! End-to-end ingestion: finalize, read back through the decryptor,
//! deduplicate repeats.

use std::fs::File;
use std::io::Read;

use tempfile::TempDir;

use safebin_crypto::{derive_key, Decryptor};
use safebin_store::Store;

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path(), 100).expect("open store")
}

fn read_artifact(store: &Store, id: &str, key: &safebin_crypto::FileKey) -> Vec<u8> {
    let path = store.artifact_path(id);
    let file = File::open(&path).expect("open artifact");
    let len = file.metadata().unwrap().len();
    let mut dec = Decryptor::new(file, key, len).expect("decryptor");
    let mut out = Vec::new();
    dec.read_to_end(&mut out).expect("decrypt artifact");
    out
}

#[test]
fn finalize_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let plaintext = b"Hello Safebin";
    let key = derive_key(&mut &plaintext[..]).unwrap();

    let outcome = store
        .finalize(&mut &plaintext[..], &key, "test.txt")
        .unwrap();
    assert!(!outcome.deduplicated);
    assert_eq!(outcome.id.len(), 12);

    // Record and ciphertext both exist, sizes agree.
    let meta = store.db().lookup(&outcome.id).unwrap().expect("metadata");
    assert_eq!(meta.size, outcome.size);
    assert_eq!(
        store.artifact_path(&outcome.id).metadata().unwrap().len(),
        outcome.size
    );

    assert_eq!(read_artifact(&store, &outcome.id, &key), plaintext);
}

#[test]
fn identical_uploads_share_one_artifact() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let plaintext = b"duplicate me!";
    let key = derive_key(&mut &plaintext[..]).unwrap();

    let first = store.finalize(&mut &plaintext[..], &key, "a.txt").unwrap();
    let second = store.finalize(&mut &plaintext[..], &key, "a.txt").unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.deduplicated);

    // Exactly one artifact file on disk (plus db/ and tmp/).
    let artifacts: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    assert_eq!(artifacts.len(), 1);
}

#[test]
fn repeat_upload_refreshes_expiry() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let plaintext = b"refresh target";
    let key = derive_key(&mut &plaintext[..]).unwrap();

    let outcome = store.finalize(&mut &plaintext[..], &key, "f.bin").unwrap();
    let before = store.db().lookup(&outcome.id).unwrap().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(1100));
    store.finalize(&mut &plaintext[..], &key, "f.bin").unwrap();
    let after = store.db().lookup(&outcome.id).unwrap().unwrap();

    assert!(after.expires_at > before.expires_at);
}

#[test]
fn same_content_different_extension_is_a_new_artifact() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let plaintext = b"shared bytes";
    let key = derive_key(&mut &plaintext[..]).unwrap();

    let txt = store.finalize(&mut &plaintext[..], &key, "x.txt").unwrap();
    let png = store.finalize(&mut &plaintext[..], &key, "x.png").unwrap();

    assert_ne!(txt.id, png.id);
    assert!(!png.deduplicated);
}

#[test]
fn empty_upload_is_storable() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let key = derive_key(&mut &b""[..]).unwrap();
    let outcome = store.finalize(&mut &b""[..], &key, "empty").unwrap();

    assert_eq!(outcome.size, 0);
    assert!(read_artifact(&store, &outcome.id, &key).is_empty());
}

//! Resumable sessions: chunks in, digested key and merged artifact out.

use std::fs::File;
use std::io::Read;

use tempfile::TempDir;

use safebin_crypto::{derive_key, Decryptor};
use safebin_store::Store;

const UPLOAD_ID: &str = "testchunkid123";

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path(), 100).expect("open store")
}

#[test]
fn two_chunks_merge_to_original() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store
        .save_chunk(UPLOAD_ID, 0, &mut &b"Chunk1Content"[..])
        .unwrap();
    store
        .save_chunk(UPLOAD_ID, 1, &mut &b"-Chunk2Content"[..])
        .unwrap();

    let expected = b"Chunk1Content-Chunk2Content";

    let (key, plain_size) = store.digest_session(UPLOAD_ID, 2).unwrap();
    assert_eq!(plain_size, expected.len() as u64);
    let direct = derive_key(&mut &expected[..]).unwrap();
    assert_eq!(key.as_bytes(), direct.as_bytes());

    let mut src = store.session_reader(UPLOAD_ID, 2).unwrap();
    let outcome = store.finalize(&mut src, &key, "chunked.txt").unwrap();
    store.remove_session(UPLOAD_ID);

    let path = store.artifact_path(&outcome.id);
    let file = File::open(&path).unwrap();
    let len = file.metadata().unwrap().len();
    let mut dec = Decryptor::new(file, &key, len).unwrap();
    let mut merged = Vec::new();
    dec.read_to_end(&mut merged).unwrap();
    assert_eq!(merged, expected);

    // Session directory is gone.
    assert!(!store.tmp_dir().join(UPLOAD_ID).exists());
}

#[test]
fn chunk_files_carry_key_prefix() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store
        .save_chunk(UPLOAD_ID, 0, &mut &b"some chunk data"[..])
        .unwrap();

    let chunk_path = store.tmp_dir().join(UPLOAD_ID).join("0");
    let on_disk = std::fs::read(&chunk_path).unwrap();
    // 16-byte key prefix, then ciphertext with a 16-byte tag.
    assert_eq!(on_disk.len(), 16 + 15 + 16);
    assert!(!on_disk.windows(15).any(|w| w == b"some chunk data"));
}

#[test]
fn digest_rejects_missing_chunk() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store
        .save_chunk(UPLOAD_ID, 0, &mut &b"first"[..])
        .unwrap();
    // Index 1 was never uploaded.
    assert!(store.digest_session(UPLOAD_ID, 2).is_err());
}

#[test]
fn invalid_upload_ids_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    for bad in ["short", "../escape000", "has space 123", ""] {
        assert!(
            store.save_chunk(bad, 0, &mut &b"x"[..]).is_err(),
            "{bad:?} must be rejected"
        );
    }
    assert!(store.save_chunk(UPLOAD_ID, u64::MAX, &mut &b"x"[..]).is_err());
}

#[test]
fn session_reader_is_rereadable() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store
        .save_chunk(UPLOAD_ID, 0, &mut &b"alpha"[..])
        .unwrap();
    store
        .save_chunk(UPLOAD_ID, 1, &mut &b"beta"[..])
        .unwrap();

    // Two independent passes see the same bytes.
    for _ in 0..2 {
        let mut src = store.session_reader(UPLOAD_ID, 2).unwrap();
        let mut out = Vec::new();
        src.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"alphabeta");
    }
}

#[test]
fn remove_session_is_quiet_when_absent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    // Never created; must not error or panic.
    store.remove_session(UPLOAD_ID);
}

//! Artifact ingestion: scratch files and the finalize step shared by the
//! single-shot and resumable paths.
//!
//! Finalize is the only writer of `<root>/<id>`: the plaintext is encrypted
//! under its convergent key into `<id>.tmp`, fsynced, then renamed into
//! place. The rename is the linearization point; metadata is registered
//! after it, so a reader that finds a record always finds the file.

use std::cell::Cell;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use safebin_core::{SafebinError, SafebinResult, MEGABYTE, TEMP_DIR_NAME};
use safebin_crypto::{artifact_id, encrypt_stream, extension_of, FileKey};

use crate::db::{FileMeta, MetaDb};
use crate::retention::retention_for;

/// The storage engine: artifact files, metadata database, temp area.
pub struct Store {
    root: PathBuf,
    db: MetaDb,
    max_mb: u64,
}

/// Result of a finalized upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub id: String,
    /// Ciphertext bytes on disk.
    pub size: u64,
    /// True when an identical artifact already existed and only its
    /// expiry was refreshed.
    pub deduplicated: bool,
}

impl Store {
    /// Open the storage root, creating the temp area and database as needed.
    pub fn open(root: impl Into<PathBuf>, max_mb: u64) -> SafebinResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(TEMP_DIR_NAME))?;
        let db = MetaDb::open(&root)?;
        Ok(Self { root, db, max_mb })
    }

    pub fn db(&self) -> &MetaDb {
        &self.db
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_mb * MEGABYTE
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR_NAME)
    }

    /// Scratch file for a single-shot upload, removed on drop unless
    /// persisted. Lives under `tmp/` with the `up_` prefix so abandoned
    /// ones are swept by age.
    pub fn scratch(&self) -> SafebinResult<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("up_")
            .tempfile_in(self.tmp_dir())?;
        Ok(file)
    }

    /// Register (or refresh) metadata for an artifact of `size` bytes.
    pub fn register(&self, id: &str, size: u64) -> SafebinResult<FileMeta> {
        self.db.register(id, size, retention_for(size, self.max_mb))
    }

    /// Persist `src` as the content-addressed artifact for `key`.
    ///
    /// A plaintext that already exists under this id keeps its ciphertext;
    /// only the expiry is refreshed. Otherwise the stream is encrypted to a
    /// sibling `.tmp` file and atomically renamed in.
    pub fn finalize(
        &self,
        src: &mut dyn Read,
        key: &FileKey,
        filename: &str,
    ) -> SafebinResult<UploadOutcome> {
        let ext = extension_of(filename);
        let id = artifact_id(key, &ext);
        let path = self.artifact_path(&id);

        if self.db.lookup(&id)?.is_some() {
            let size = fs::metadata(&path)
                .map_err(|e| {
                    SafebinError::Integrity(format!("registered artifact missing on disk: {e}"))
                })?
                .len();
            self.register(&id, size)?;
            debug!(id = %id, "existing artifact, expiry refreshed");
            return Ok(UploadOutcome {
                id,
                size,
                deduplicated: true,
            });
        }

        let tmp_path = self.root.join(format!("{id}.tmp"));
        let cleanup = RemoveOnDrop::new(&tmp_path);

        let mut out = File::create(&tmp_path)?;
        encrypt_stream(&mut out, src, key)?;
        out.sync_all()?;
        drop(out);

        fs::rename(&tmp_path, &path)?;
        cleanup.disarm();

        let size = fs::metadata(&path)?.len();
        self.register(&id, size)?;
        debug!(id = %id, size, "artifact stored");

        Ok(UploadOutcome {
            id,
            size,
            deduplicated: false,
        })
    }
}

/// Removes a path on drop unless disarmed; covers every error exit between
/// create and rename.
struct RemoveOnDrop {
    path: PathBuf,
    armed: Cell<bool>,
}

impl RemoveOnDrop {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: Cell::new(true),
        }
    }

    fn disarm(&self) {
        self.armed.set(false);
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.armed.get() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

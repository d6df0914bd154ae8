use std::path::PathBuf;

use crate::{CHUNK_SAFETY_MARGIN, MEGABYTE, MIN_CHUNK_SIZE, TEMP_DIR_NAME};

/// Runtime configuration resolved from flags and environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind address (default: 0.0.0.0)
    pub host: String,
    /// Listen port (default: 8080)
    pub port: u16,
    /// Storage root; artifacts, the database, and temp files live under it
    pub storage_dir: PathBuf,
    /// Upload size limit in MB
    pub max_mb: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            storage_dir: PathBuf::from("./storage"),
            max_mb: 512,
        }
    }
}

impl ServiceConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Largest accepted plaintext, in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_mb * MEGABYTE
    }

    /// Request body ceiling for single-shot uploads (one extra MiB of
    /// multipart framing overhead).
    pub fn upload_body_limit(&self) -> u64 {
        self.max_bytes() + MEGABYTE
    }

    /// Highest chunk index a resumable upload may use.
    pub fn max_chunks(&self) -> u64 {
        self.max_bytes() / MIN_CHUNK_SIZE + CHUNK_SAFETY_MARGIN
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.storage_dir.join(TEMP_DIR_NAME)
    }
}

//! Cleanup passes: reap expired artifacts, drop stale temp entries.

use std::fs;
use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use safebin_core::SafebinResult;

use crate::ingest::Store;

impl Store {
    /// Remove every artifact whose expiry is at or before `now`: metadata
    /// rows first (one transaction), then the ciphertext files. An unlink
    /// failure is logged and skipped; the orphan file is unreachable once
    /// its record is gone.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> SafebinResult<usize> {
        let reaped = self.db().reap(now)?;
        for id in &reaped {
            if let Err(e) = fs::remove_file(self.artifact_path(id)) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(id = %id, error = %e, "failed to remove expired artifact");
                }
            }
        }
        if !reaped.is_empty() {
            debug!(count = reaped.len(), "expired artifacts reaped");
        }
        Ok(reaped.len())
    }

    /// Remove any entry directly under `tmp/` older than `max_age` by
    /// modification time: abandoned chunk sessions and orphaned scratch
    /// files alike.
    pub fn sweep_temp(&self, max_age: Duration) -> SafebinResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(self.tmp_dir())? {
            let entry = entry?;
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            let expired = modified
                .elapsed()
                .map(|age| age > max_age)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            let path = entry.path();
            let result = if meta.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp entry"),
            }
        }
        Ok(removed)
    }
}

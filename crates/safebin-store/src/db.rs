//! Metadata database: artifact records plus a time-ordered expiry index.
//!
//! Two tables in one redb file:
//!   - `files`: id → JSON-encoded [`FileMeta`]
//!   - `expiry_index`: `<rfc3339>_<id>` → id
//!
//! RFC3339 UTC strings at second precision sort lexicographically in time
//! order, so the reaper is a single forward range scan. Every operation is
//! one transaction; the two tables are always updated together, so readers
//! never observe a record without its index row or vice versa.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use safebin_core::{SafebinResult, DB_DIR_NAME, DB_FILE_NAME};

const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const EXPIRY_INDEX: TableDefinition<&str, &str> = TableDefinition::new("expiry_index");

/// Metadata for one stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMeta {
    pub id: String,
    /// Ciphertext size on disk in bytes.
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// RFC3339 at second precision in UTC, the expiry-index key prefix.
pub fn format_expiry(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn index_key(expires_at: DateTime<Utc>, id: &str) -> String {
    format!("{}_{}", format_expiry(expires_at), id)
}

pub struct MetaDb {
    db: Database,
}

impl MetaDb {
    /// Open (or create) the database under `<storage_dir>/db/`, ensuring both
    /// tables exist.
    pub fn open(storage_dir: &Path) -> SafebinResult<Self> {
        let dir = storage_dir.join(DB_DIR_NAME);
        std::fs::create_dir_all(&dir)?;
        let db = Database::create(dir.join(DB_FILE_NAME))?;

        let tx = db.begin_write()?;
        {
            tx.open_table(FILES)?;
            tx.open_table(EXPIRY_INDEX)?;
        }
        tx.commit()?;

        Ok(Self { db })
    }

    /// Insert or refresh a record, expiring `retention` after now.
    pub fn register(&self, id: &str, size: u64, retention: Duration) -> SafebinResult<FileMeta> {
        self.register_at(id, size, retention, Utc::now())
    }

    /// Insert or refresh a record with an explicit creation time.
    ///
    /// A refresh replaces the previous expiry-index row, keeping the index in
    /// one-to-one correspondence with the records.
    pub fn register_at(
        &self,
        id: &str,
        size: u64,
        retention: Duration,
        created_at: DateTime<Utc>,
    ) -> SafebinResult<FileMeta> {
        let expires_at = created_at + TimeDelta::seconds(retention.as_secs() as i64);
        let meta = FileMeta {
            id: id.to_string(),
            size,
            created_at,
            expires_at,
        };
        let encoded = serde_json::to_vec(&meta)?;

        let tx = self.db.begin_write()?;
        {
            let mut files = tx.open_table(FILES)?;
            let mut index = tx.open_table(EXPIRY_INDEX)?;

            let previous_expiry = match files.get(id)? {
                Some(raw) => Some(serde_json::from_slice::<FileMeta>(raw.value())?.expires_at),
                None => None,
            };
            if let Some(previous) = previous_expiry {
                index.remove(index_key(previous, id).as_str())?;
            }

            files.insert(id, encoded.as_slice())?;
            index.insert(index_key(expires_at, id).as_str(), id)?;
        }
        tx.commit()?;

        Ok(meta)
    }

    pub fn lookup(&self, id: &str) -> SafebinResult<Option<FileMeta>> {
        let tx = self.db.begin_read()?;
        let files = tx.open_table(FILES)?;
        match files.get(id)? {
            Some(raw) => Ok(Some(serde_json::from_slice(raw.value())?)),
            None => Ok(None),
        }
    }

    /// Delete every record whose expiry is at or before `now` and return the
    /// reaped ids; the caller unlinks the ciphertexts.
    pub fn reap(&self, now: DateTime<Utc>) -> SafebinResult<Vec<String>> {
        let cutoff = format_expiry(now);

        let mut due: Vec<(String, String)> = Vec::new();
        {
            let tx = self.db.begin_read()?;
            let index = tx.open_table(EXPIRY_INDEX)?;
            for row in index.range::<&str>(..)? {
                let (key, id) = row?;
                let stamp = key.value().split('_').next().unwrap_or("");
                if stamp > cutoff.as_str() {
                    break;
                }
                due.push((key.value().to_string(), id.value().to_string()));
            }
        }

        if due.is_empty() {
            return Ok(Vec::new());
        }

        let tx = self.db.begin_write()?;
        {
            let mut files = tx.open_table(FILES)?;
            let mut index = tx.open_table(EXPIRY_INDEX)?;
            for (key, id) in &due {
                index.remove(key.as_str())?;
                files.remove(id.as_str())?;
            }
        }
        tx.commit()?;

        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    /// All expiry-index rows, in key order.
    pub fn expiry_rows(&self) -> SafebinResult<Vec<(String, String)>> {
        let tx = self.db.begin_read()?;
        let index = tx.open_table(EXPIRY_INDEX)?;
        let mut rows = Vec::new();
        for row in index.range::<&str>(..)? {
            let (key, id) = row?;
            rows.push((key.value().to_string(), id.value().to_string()));
        }
        Ok(rows)
    }
}

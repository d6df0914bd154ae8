//! Resumable upload sessions: one directory per upload id, one encrypted
//! file per chunk.
//!
//! Chunk file layout: `ephemeral_key(16B) || sealed chunks of the chunk
//! plaintext under that key`. Every chunk gets its own random key, so the
//! temp area never holds anything decryptable without the file in hand, and
//! session directories can be swept by age alone.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use safebin_core::{SafebinError, SafebinResult, CHUNK_SAFETY_MARGIN, MIN_CHUNK_SIZE};
use safebin_crypto::{derive_key, encrypt_stream, Decryptor, FileKey, KEY_SIZE};

use crate::ingest::Store;

static UPLOAD_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[A-Za-z0-9]{10,50}$").expect("upload id pattern")
});

impl Store {
    /// Highest chunk index a client may send.
    pub fn max_chunks(&self) -> u64 {
        self.max_bytes() / MIN_CHUNK_SIZE + CHUNK_SAFETY_MARGIN
    }

    /// Session directory for a validated upload id. The pattern check is what
    /// keeps client-supplied ids from escaping `tmp/`.
    fn checked_session_dir(&self, upload_id: &str) -> SafebinResult<PathBuf> {
        if !UPLOAD_ID_RE.is_match(upload_id) {
            return Err(SafebinError::InvalidInput("bad upload id".into()));
        }
        Ok(self.tmp_dir().join(upload_id))
    }

    /// Encrypt one incoming chunk under a fresh ephemeral key and persist it
    /// as `tmp/<upload_id>/<index>`.
    pub fn save_chunk(
        &self,
        upload_id: &str,
        index: u64,
        src: &mut dyn Read,
    ) -> SafebinResult<()> {
        let dir = self.checked_session_dir(upload_id)?;
        if index > self.max_chunks() {
            return Err(SafebinError::InvalidInput("chunk index out of range".into()));
        }
        fs::create_dir_all(&dir)?;

        let key = FileKey::generate();
        let mut out = File::create(dir.join(index.to_string()))?;
        out.write_all(key.as_bytes())?;
        encrypt_stream(&mut out, src, &key)?;
        Ok(())
    }

    /// First pass over a session: hash the decrypted chunks in order.
    ///
    /// Returns the convergent key and the total plaintext size. Every index
    /// in `[0, total)` must exist.
    pub fn digest_session(&self, upload_id: &str, total: u64) -> SafebinResult<(FileKey, u64)> {
        let mut reader = self.session_reader(upload_id, total)?;
        for index in 0..total {
            if !reader.dir.join(index.to_string()).is_file() {
                return Err(SafebinError::InvalidInput(format!("missing chunk {index}")));
            }
        }
        let key = derive_key(&mut reader)?;
        Ok((key, reader.bytes_read()))
    }

    /// Lazy concatenation of the session's decrypted chunks, the re-readable
    /// plaintext source for finalize.
    pub fn session_reader(&self, upload_id: &str, total: u64) -> SafebinResult<SessionReader> {
        let dir = self.checked_session_dir(upload_id)?;
        if total == 0 || total > self.max_chunks() {
            return Err(SafebinError::InvalidInput("chunk count out of range".into()));
        }
        Ok(SessionReader {
            dir,
            total,
            next_index: 0,
            current: None,
            bytes_read: 0,
        })
    }

    /// Best-effort removal of a session directory; called on finish success
    /// or fatal failure.
    pub fn remove_session(&self, upload_id: &str) {
        let Ok(dir) = self.checked_session_dir(upload_id) else {
            return;
        };
        if let Err(e) = fs::remove_dir_all(&dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(upload_id, error = %e, "failed to remove upload session");
            }
        }
    }
}

/// Sequential reader over a session's chunks, opening each decryptor only
/// when the previous one is exhausted.
pub struct SessionReader {
    dir: PathBuf,
    total: u64,
    next_index: u64,
    current: Option<Decryptor<SectionReader<File>>>,
    bytes_read: u64,
}

impl SessionReader {
    /// Plaintext bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl Read for SessionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(decryptor) = self.current.as_mut() {
                let n = decryptor.read(buf)?;
                if n > 0 {
                    self.bytes_read += n as u64;
                    return Ok(n);
                }
                self.current = None;
                self.next_index += 1;
            } else {
                if self.next_index >= self.total {
                    return Ok(0);
                }
                self.current = Some(open_chunk(&self.dir, self.next_index)?);
            }
        }
    }
}

/// Open one chunk file: peel the 16-byte ephemeral key, then wrap the
/// ciphertext body in a decryptor.
fn open_chunk(dir: &Path, index: u64) -> io::Result<Decryptor<SectionReader<File>>> {
    let mut file = File::open(dir.join(index.to_string()))?;
    let mut key_bytes = [0u8; KEY_SIZE];
    file.read_exact(&mut key_bytes)?;
    let body_len = file.metadata()?.len().saturating_sub(KEY_SIZE as u64);
    let section = SectionReader::new(file, KEY_SIZE as u64, body_len);
    Decryptor::new(section, &FileKey::from_bytes(key_bytes), body_len)
}

/// Read + Seek view over a fixed window of an underlying reader, offset by
/// `base`. Seeks are applied to the inner reader eagerly; reads advance both
/// cursors in step.
pub(crate) struct SectionReader<R> {
    inner: R,
    base: u64,
    len: u64,
    pos: u64,
    positioned: bool,
}

impl<R: Read + Seek> SectionReader<R> {
    pub(crate) fn new(inner: R, base: u64, len: u64) -> Self {
        Self {
            inner,
            base,
            len,
            pos: 0,
            positioned: false,
        }
    }
}

impl<R: Read + Seek> Read for SectionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.positioned {
            self.inner.seek(SeekFrom::Start(self.base + self.pos))?;
            self.positioned = true;
        }
        let remaining = self.len.saturating_sub(self.pos);
        let want = (buf.len() as u64).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for SectionReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let abs: i128 = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.len as i128 + delta as i128,
        };
        if abs < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "negative seek position",
            ));
        }
        self.pos = abs as u64;
        self.positioned = false;
        Ok(self.pos)
    }
}

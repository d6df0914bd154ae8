//! Chunked AES-128-GCM sealing.
//!
//! `Streamer` binds a cipher to one key; `EncryptWriter` is the incremental
//! sink used by the upload tee (buffers at most one chunk); `encrypt_stream`
//! drains a reader through it. Chunks are sealed in strictly increasing index
//! order because the nonce is the chunk counter.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use std::io::{self, Read, Write};

use crate::keys::FileKey;
use crate::{CHUNK_SIZE, NONCE_SIZE};

pub(crate) fn nonce_bytes(chunk_index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[4..].copy_from_slice(&chunk_index.to_be_bytes());
    nonce
}

/// AES-128-GCM bound to a single file key.
pub struct Streamer {
    cipher: Aes128Gcm,
}

impl std::fmt::Debug for Streamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streamer").finish_non_exhaustive()
    }
}

impl Streamer {
    pub fn new(key: &FileKey) -> Self {
        Self {
            cipher: Aes128Gcm::new(key.as_bytes().into()),
        }
    }

    pub(crate) fn seal(&self, chunk_index: u64, plaintext: &[u8]) -> io::Result<Vec<u8>> {
        let nonce = nonce_bytes(chunk_index);
        self.cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| io::Error::other("chunk encryption failed"))
    }

    pub(crate) fn open(&self, chunk_index: u64, sealed: &[u8]) -> io::Result<Vec<u8>> {
        let nonce = nonce_bytes(chunk_index);
        self.cipher
            .decrypt(Nonce::from_slice(&nonce), sealed)
            .map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "chunk authentication failed")
            })
    }

    /// Encrypt `src` to `dst` as a sequence of sealed chunks.
    pub fn encrypt_stream<R, W>(&self, dst: &mut W, src: &mut R) -> io::Result<()>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut chunk_index = 0u64;
        loop {
            let filled = read_full(src, &mut buf)?;
            if filled > 0 {
                let sealed = self.seal(chunk_index, &buf[..filled])?;
                dst.write_all(&sealed)?;
                chunk_index += 1;
            }
            if filled < CHUNK_SIZE {
                break;
            }
        }
        dst.flush()
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Incremental chunked encryptor implementing [`Write`].
///
/// Holds at most one plaintext chunk in memory; a full buffer is sealed and
/// written through immediately. The trailing short chunk is sealed by
/// [`EncryptWriter::finish`], which must be called exactly once.
pub struct EncryptWriter<W: Write> {
    dst: W,
    streamer: Streamer,
    buf: Vec<u8>,
    chunk_index: u64,
}

impl<W: Write> EncryptWriter<W> {
    pub fn new(dst: W, key: &FileKey) -> Self {
        Self {
            dst,
            streamer: Streamer::new(key),
            buf: Vec::with_capacity(CHUNK_SIZE),
            chunk_index: 0,
        }
    }

    fn seal_buffered(&mut self) -> io::Result<()> {
        let sealed = self.streamer.seal(self.chunk_index, &self.buf)?;
        self.dst.write_all(&sealed)?;
        self.chunk_index += 1;
        self.buf.clear();
        Ok(())
    }

    /// Seal the remainder and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.buf.is_empty() {
            self.seal_buffered()?;
        }
        self.dst.flush()?;
        Ok(self.dst)
    }
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut rest = data;
        while !rest.is_empty() {
            let room = CHUNK_SIZE - self.buf.len();
            let take = room.min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buf.len() == CHUNK_SIZE {
                self.seal_buffered()?;
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.dst.flush()
    }
}

/// Convenience wrapper: encrypt all of `src` into `dst` under `key`.
pub fn encrypt_stream<R, W>(dst: &mut W, src: &mut R, key: &FileKey) -> io::Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    Streamer::new(key).encrypt_stream(dst, src)
}

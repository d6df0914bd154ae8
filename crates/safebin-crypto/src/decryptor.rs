//! Seekable random-access decryption over sealed-chunk ciphertext.
//!
//! A logical byte offset maps to a chunk index and intra-chunk offset; only
//! the chunk covering the requested position is read and opened, which keeps
//! byte-range requests proportional to the range, not the file. Seeking is
//! lazy: the inner reader is repositioned on the next read, and sequential
//! reads skip the seek entirely by tracking the physical offset.

use std::io::{self, Read, Seek, SeekFrom};

use crate::keys::FileKey;
use crate::stream::{read_full, Streamer};
use crate::{CHUNK_SIZE, TAG_SIZE};

const FRAME: u64 = (CHUNK_SIZE + TAG_SIZE) as u64;

#[derive(Debug)]
pub struct Decryptor<R: Read + Seek> {
    inner: R,
    streamer: Streamer,
    plain_size: u64,
    offset: u64,
    phys_offset: Option<u64>,
}

impl<R: Read + Seek> Decryptor<R> {
    /// Wrap a ciphertext reader of `ciphertext_len` bytes.
    ///
    /// Fails when the final sealed chunk is shorter than a tag plus one byte,
    /// which can only come from a truncated file.
    pub fn new(inner: R, key: &FileKey, ciphertext_len: u64) -> io::Result<Self> {
        let remainder = ciphertext_len % FRAME;
        if remainder > 0 && remainder <= TAG_SIZE as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "truncated final chunk",
            ));
        }
        let plain_size =
            (ciphertext_len / FRAME) * CHUNK_SIZE as u64 + remainder.saturating_sub(TAG_SIZE as u64);
        Ok(Self {
            inner,
            streamer: Streamer::new(key),
            plain_size,
            offset: 0,
            phys_offset: None,
        })
    }

    /// Logical plaintext length.
    pub fn plain_size(&self) -> u64 {
        self.plain_size
    }
}

impl<R: Read + Seek> Read for Decryptor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.offset >= self.plain_size {
            return Ok(0);
        }

        let chunk_index = self.offset / CHUNK_SIZE as u64;
        let overhang = (self.offset % CHUNK_SIZE as u64) as usize;
        let target = chunk_index * FRAME;

        if self.phys_offset != Some(target) {
            self.inner.seek(SeekFrom::Start(target))?;
            self.phys_offset = Some(target);
        }

        let mut sealed = vec![0u8; FRAME as usize];
        let got = read_full(&mut self.inner, &mut sealed)?;
        if let Some(pos) = self.phys_offset.as_mut() {
            *pos += got as u64;
        }

        let plaintext = self.streamer.open(chunk_index, &sealed[..got])?;
        if overhang >= plaintext.len() {
            return Ok(0);
        }

        let n = (plaintext.len() - overhang).min(buf.len());
        buf[..n].copy_from_slice(&plaintext[overhang..overhang + n]);
        self.offset += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for Decryptor<R> {
    /// Moves the logical offset only; the inner reader is untouched until
    /// the next read.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let abs: i128 = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(delta) => self.offset as i128 + delta as i128,
            SeekFrom::End(delta) => self.plain_size as i128 + delta as i128,
        };
        if abs < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "negative seek position",
            ));
        }
        self.offset = abs as u64;
        Ok(self.offset)
    }
}

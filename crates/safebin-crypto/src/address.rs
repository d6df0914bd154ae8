//! Convergent addressing: plaintext → key, (key, extension) → id, slug codec.
//!
//! The key is the truncated SHA-256 of the plaintext, so identical files
//! converge on one key and one ciphertext. The id is the truncated SHA-256 of
//! `key || extension`, base64url-encoded to exactly 12 characters; a slug
//! (`base64url(key) || extension`) therefore resolves to its id without the
//! server ever storing the key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use std::io::Read;
use thiserror::Error;

use crate::keys::FileKey;
use crate::{ID_SIZE, KEY_SIZE, SLUG_KEY_LEN};

/// Characters dropped from user-supplied extensions before they reach a URL
/// or the id hash.
const EXT_STRIP: &[char] = &[
    ' ', '"', '<', '>', '\\', '/', ':', ';', '?', '@', '[', ']', '^', '`', '{', '}', '|', '~',
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug too short")]
    TooShort,
    #[error("malformed key")]
    BadKey,
}

/// Derive the convergent key by hashing the full stream.
pub fn derive_key<R: Read + ?Sized>(src: &mut R) -> std::io::Result<FileKey> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(key_from_digest(&hasher.finalize()))
}

/// Truncate a SHA-256 digest to a file key. Callers that hash incrementally
/// while streaming use this on their own finalized digest.
pub fn key_from_digest(digest: &[u8]) -> FileKey {
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&digest[..KEY_SIZE]);
    FileKey::from_bytes(bytes)
}

/// Content-addressed identifier: 12 base64url characters of
/// `SHA-256(key || extension)[..9]`.
pub fn artifact_id(key: &FileKey, ext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(ext.as_bytes());
    URL_SAFE_NO_PAD.encode(&hasher.finalize()[..ID_SIZE])
}

/// Lowercased, sanitized extension of a filename, leading dot included;
/// empty when the name has none. The same value feeds both the id hash and
/// the slug so a link always resolves back to its artifact.
pub fn extension_of(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rfind('.') {
        Some(pos) => sanitize_extension(&name[pos..].to_ascii_lowercase()),
        None => String::new(),
    }
}

fn sanitize_extension(ext: &str) -> String {
    ext.chars().filter(|c| !EXT_STRIP.contains(c)).collect()
}

/// URL path component carrying the key out-of-band: 22 base64url characters
/// followed by the sanitized extension.
pub fn slug_of(key: &FileKey, ext: &str) -> String {
    format!("{}{}", URL_SAFE_NO_PAD.encode(key.as_bytes()), ext)
}

/// Split a slug back into its key and extension.
pub fn parse_slug(slug: &str) -> Result<(FileKey, String), SlugError> {
    if slug.len() < SLUG_KEY_LEN {
        return Err(SlugError::TooShort);
    }
    if !slug.is_char_boundary(SLUG_KEY_LEN) {
        return Err(SlugError::BadKey);
    }
    let (encoded, ext) = slug.split_at(SLUG_KEY_LEN);
    let raw = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| SlugError::BadKey)?;
    if raw.len() != KEY_SIZE {
        return Err(SlugError::BadKey);
    }
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&raw);
    Ok((FileKey::from_bytes(bytes), ext.to_string()))
}

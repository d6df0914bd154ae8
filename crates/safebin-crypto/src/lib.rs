//! safebin-crypto: convergent encryption engine for Safebin
//!
//! Architecture: chunked AES-128-GCM with counter nonces
//!
//! Pipeline: plaintext → SHA-256 → convergent key → 64 KiB chunks → seal per chunk → ciphertext
//!
//! Ciphertext format (binary):
//! ```text
//! Seal(key, nonce(0), P[0..64Ki]) || Seal(key, nonce(1), P[64Ki..128Ki]) || ...
//! nonce(i) = [0u8; 4] || u64_be(i)
//! ```
//!
//! No header, trailer, or length framing: the stream is parsed by fixed-size
//! chunking of the ciphertext. The final sealed chunk may be short but always
//! carries a full 16-byte tag. Counter nonces are safe because every key is
//! either convergent (unique per plaintext) or freshly random per temp chunk,
//! so (key, nonce) pairs never repeat.

pub mod address;
pub mod decryptor;
pub mod keys;
pub mod stream;

pub use address::{
    artifact_id, derive_key, extension_of, key_from_digest, parse_slug, slug_of, SlugError,
};
pub use decryptor::Decryptor;
pub use keys::FileKey;
pub use stream::{encrypt_stream, EncryptWriter, Streamer};

/// Plaintext bytes sealed per chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Size of a file key in bytes (AES-128).
pub const KEY_SIZE: usize = 16;

/// Size of a GCM nonce.
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag.
pub const TAG_SIZE: usize = 16;

/// Truncated hash length of a content-addressed identifier.
pub const ID_SIZE: usize = 9;

/// Length of the base64url-encoded key at the front of a slug.
pub const SLUG_KEY_LEN: usize = 22;

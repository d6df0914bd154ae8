//! Fetch path: slug → key → id → decrypting byte-range responses.

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use safebin_core::{SafebinError, SafebinResult};
use safebin_crypto::{artifact_id, parse_slug, Decryptor, SlugError, CHUNK_SIZE};

use crate::respond;
use crate::server::SharedState;

const CSP: &str = "default-src 'none'; img-src 'self' data:; media-src 'self' data:; \
                   style-src 'unsafe-inline'; sandbox allow-forms allow-scripts \
                   allow-downloads allow-same-origin";

pub async fn fetch(
    State(state): State<SharedState>,
    UrlPath(slug): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    match fetch_inner(&state, &slug, &headers).await {
        Ok(response) => response,
        Err(err) => respond::send_error(&headers, &err),
    }
}

async fn fetch_inner(
    state: &SharedState,
    slug: &str,
    headers: &HeaderMap,
) -> SafebinResult<Response> {
    let (key, ext) = parse_slug(slug).map_err(|e| match e {
        SlugError::TooShort => SafebinError::InvalidInput("slug too short".into()),
        SlugError::BadKey => SafebinError::InvalidKey,
    })?;

    let id = artifact_id(&key, &ext);
    let meta = state
        .store
        .db()
        .lookup(&id)?
        .ok_or(SafebinError::NotFound)?;

    let path = state.store.artifact_path(&id);
    let disk = match std::fs::metadata(&path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(SafebinError::NotFound),
        Err(e) => return Err(e.into()),
    };
    if disk.len() != meta.size {
        error!(
            id = %id,
            disk_bytes = disk.len(),
            expected_bytes = meta.size,
            "integrity check failed: disk size mismatch"
        );
        return Err(SafebinError::Integrity("ciphertext size mismatch".into()));
    }

    let file = File::open(&path)?;
    let dec = Decryptor::new(file, &key, disk.len())
        .map_err(|e| SafebinError::Integrity(e.to_string()))?;
    let plain_size = dec.plain_size();

    let (status, start, len) = match parse_range(headers.get(header::RANGE), plain_size) {
        RangeOutcome::None => (StatusCode::OK, 0, plain_size),
        RangeOutcome::Satisfiable(start, len) => (StatusCode::PARTIAL_CONTENT, start, len),
        RangeOutcome::Unsatisfiable => {
            return Ok((
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{plain_size}"))],
            )
                .into_response());
        }
    };

    // Decrypt the first requested byte up front so a bad tag becomes a 500
    // instead of a connection abort after headers are out.
    let dec = probe(dec, start, plain_size)
        .await
        .map_err(|e| SafebinError::Integrity(e.to_string()))?;

    let content_type = content_type_for(&ext);
    let mut response = axum::http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{slug}\""),
        )
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::CONTENT_SECURITY_POLICY, CSP);

    if status == StatusCode::PARTIAL_CONTENT {
        response = response.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, start + len - 1, plain_size),
        );
    }

    response
        .body(stream_body(dec, start, len))
        .map_err(|e| SafebinError::Other(anyhow::anyhow!("building response: {e}")))
}

fn content_type_for(ext: &str) -> HeaderValue {
    let mime = mime_guess::from_ext(ext.trim_start_matches('.')).first_or_octet_stream();
    HeaderValue::from_str(mime.essence_str())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

/// Decrypt one byte at `start` on a blocking thread, then hand the
/// decryptor back for streaming.
async fn probe(
    mut dec: Decryptor<File>,
    start: u64,
    plain_size: u64,
) -> io::Result<Decryptor<File>> {
    if plain_size == 0 {
        return Ok(dec);
    }
    tokio::task::spawn_blocking(move || {
        dec.seek(SeekFrom::Start(start))?;
        let mut first = [0u8; 1];
        dec.read(&mut first)?;
        Ok(dec)
    })
    .await
    .map_err(|e| io::Error::other(format!("probe task failed: {e}")))?
}

/// Stream `len` plaintext bytes from `start` through a bounded channel; the
/// blocking producer stops as soon as the client goes away.
fn stream_body(mut dec: Decryptor<File>, start: u64, len: u64) -> Body {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, io::Error>>(2);

    tokio::task::spawn_blocking(move || {
        if let Err(e) = dec.seek(SeekFrom::Start(start)) {
            let _ = tx.blocking_send(Err(e));
            return;
        }
        let mut remaining = len;
        let mut buf = vec![0u8; CHUNK_SIZE];
        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            match dec.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                        break;
                    }
                    remaining -= n as u64;
                }
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}

enum RangeOutcome {
    /// No usable range header; serve the full body.
    None,
    /// `(start, length)` within the plaintext.
    Satisfiable(u64, u64),
    Unsatisfiable,
}

/// Single-range `bytes=` parser. Multi-range requests fall back to the full
/// body; malformed or out-of-bounds ranges are unsatisfiable.
fn parse_range(raw: Option<&HeaderValue>, size: u64) -> RangeOutcome {
    let Some(value) = raw.and_then(|v| v.to_str().ok()) else {
        return RangeOutcome::None;
    };
    let Some(byte_range) = value.strip_prefix("bytes=") else {
        return RangeOutcome::None;
    };
    if byte_range.contains(',') {
        return RangeOutcome::None;
    }
    let Some((from, to)) = byte_range.trim().split_once('-') else {
        return RangeOutcome::Unsatisfiable;
    };

    if from.is_empty() {
        // Suffix form: the last N bytes.
        let Ok(n) = to.parse::<u64>() else {
            return RangeOutcome::Unsatisfiable;
        };
        if n == 0 || size == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let start = size.saturating_sub(n);
        return RangeOutcome::Satisfiable(start, size - start);
    }

    let Ok(start) = from.parse::<u64>() else {
        return RangeOutcome::Unsatisfiable;
    };
    if start >= size {
        return RangeOutcome::Unsatisfiable;
    }
    let end = if to.is_empty() {
        size - 1
    } else {
        match to.parse::<u64>() {
            Ok(end) => end.min(size - 1),
            Err(_) => return RangeOutcome::Unsatisfiable,
        }
    };
    if end < start {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Satisfiable(start, end - start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(raw: &str, size: u64) -> RangeOutcome {
        let value = HeaderValue::from_str(raw).unwrap();
        parse_range(Some(&value), size)
    }

    fn satisfiable(raw: &str, size: u64) -> (u64, u64) {
        match range(raw, size) {
            RangeOutcome::Satisfiable(start, len) => (start, len),
            _ => panic!("expected satisfiable range for {raw}"),
        }
    }

    #[test]
    fn plain_ranges() {
        assert_eq!(satisfiable("bytes=0-99", 1000), (0, 100));
        assert_eq!(satisfiable("bytes=500-", 1000), (500, 500));
        assert_eq!(satisfiable("bytes=80000-80099", 262144), (80000, 100));
        // End clamped to the last byte.
        assert_eq!(satisfiable("bytes=900-5000", 1000), (900, 100));
    }

    #[test]
    fn suffix_range() {
        assert_eq!(satisfiable("bytes=-100", 1000), (900, 100));
        // Suffix longer than the body covers all of it.
        assert_eq!(satisfiable("bytes=-5000", 1000), (0, 1000));
    }

    #[test]
    fn unsatisfiable_ranges() {
        assert!(matches!(range("bytes=1000-", 1000), RangeOutcome::Unsatisfiable));
        assert!(matches!(range("bytes=5-2", 1000), RangeOutcome::Unsatisfiable));
        assert!(matches!(range("bytes=abc-", 1000), RangeOutcome::Unsatisfiable));
        assert!(matches!(range("bytes=-0", 1000), RangeOutcome::Unsatisfiable));
        assert!(matches!(range("bytes=0-", 0), RangeOutcome::Unsatisfiable));
    }

    #[test]
    fn ignored_headers_serve_full_body() {
        assert!(matches!(parse_range(None, 1000), RangeOutcome::None));
        assert!(matches!(range("items=0-5", 1000), RangeOutcome::None));
        assert!(matches!(range("bytes=0-1,5-9", 1000), RangeOutcome::None));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(".txt"), "text/plain");
        assert_eq!(content_type_for(".png"), "image/png");
        assert_eq!(content_type_for(""), "application/octet-stream");
        assert_eq!(content_type_for(".zzzz"), "application/octet-stream");
    }
}

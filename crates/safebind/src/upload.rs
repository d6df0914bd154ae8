//! Upload handlers: the single-shot tee and the resumable chunk protocol.

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use sha2::{Digest, Sha256};
use std::io::Write;

use safebin_core::{SafebinError, SafebinResult};
use safebin_crypto::{key_from_digest, Decryptor, EncryptWriter, FileKey};

use crate::respond;
use crate::server::SharedState;
use crate::static_assets;

pub async fn home(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    Html(static_assets::render_index(state.config.max_mb, host)).into_response()
}

/// POST / — one multipart request carrying the whole file.
///
/// The body is streamed once through a SHA-256 hasher and an encryptor
/// writing to a scratch file under an ephemeral key (at most one chunk
/// buffered). The scratch ciphertext then serves as the re-readable
/// plaintext source for finalize, so the client is never read twice.
pub async fn single_shot(
    State(state): State<SharedState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    match single_shot_inner(&state, multipart).await {
        Ok((key, filename)) => respond::share_link(&headers, &key, &filename),
        Err(err) => respond::send_error(&headers, &err),
    }
}

async fn single_shot_inner(
    state: &SharedState,
    mut multipart: Multipart,
) -> SafebinResult<(FileKey, String)> {
    let mut field = loop {
        match multipart.next_field().await.map_err(multipart_error)? {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => continue,
            None => return Err(SafebinError::InvalidInput("missing file field".into())),
        }
    };
    let filename = field.file_name().unwrap_or("").to_string();

    let scratch = state.store.scratch()?;
    let ephemeral = FileKey::generate();
    let mut hasher = Sha256::new();
    let mut writer = EncryptWriter::new(scratch.as_file().try_clone()?, &ephemeral);

    while let Some(buf) = field.chunk().await.map_err(multipart_error)? {
        hasher.update(&buf);
        writer.write_all(&buf)?;
    }
    writer.finish()?;

    let convergent = key_from_digest(&hasher.finalize());
    let ciphertext_len = scratch.as_file().metadata()?.len();
    let mut src = Decryptor::new(scratch.reopen()?, &ephemeral, ciphertext_len)?;

    let store = state.store.clone();
    let key = convergent.clone();
    let name = filename.clone();
    tokio::task::spawn_blocking(move || {
        // `scratch` moves in so the temp file outlives the re-read and is
        // still unlinked on every path.
        let _scratch = scratch;
        store.finalize(&mut src, &key, &name)
    })
    .await
    .map_err(join_error)??;

    Ok((convergent, filename))
}

/// POST /upload/chunk — persist one encrypted chunk of a resumable upload.
pub async fn chunk(
    State(state): State<SharedState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    match chunk_inner(&state, multipart).await {
        Ok(()) => ().into_response(),
        Err(err) => respond::send_error(&headers, &err),
    }
}

async fn chunk_inner(state: &SharedState, mut multipart: Multipart) -> SafebinResult<()> {
    let mut upload_id: Option<String> = None;
    let mut index: Option<u64> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "upload_id" => upload_id = Some(field.text().await.map_err(multipart_error)?),
            "index" => {
                let raw = field.text().await.map_err(multipart_error)?;
                index = Some(raw.trim().parse().map_err(|_| {
                    SafebinError::InvalidInput("index is not a non-negative integer".into())
                })?);
            }
            "chunk" => {
                let uid = upload_id
                    .take()
                    .ok_or_else(|| SafebinError::InvalidInput("missing upload_id".into()))?;
                let idx = index
                    .take()
                    .ok_or_else(|| SafebinError::InvalidInput("missing index".into()))?;
                let data = field.bytes().await.map_err(multipart_error)?;

                let store = state.store.clone();
                return tokio::task::spawn_blocking(move || {
                    let mut src: &[u8] = data.as_ref();
                    store.save_chunk(&uid, idx, &mut src)
                })
                .await
                .map_err(join_error)?;
            }
            _ => {}
        }
    }

    Err(SafebinError::InvalidInput("missing chunk field".into()))
}

/// POST /upload/finish — assemble a session into the final artifact.
pub async fn finish(
    State(state): State<SharedState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    match finish_inner(&state, multipart).await {
        Ok((key, filename)) => respond::share_link(&headers, &key, &filename),
        Err(err) => respond::send_error(&headers, &err),
    }
}

async fn finish_inner(
    state: &SharedState,
    mut multipart: Multipart,
) -> SafebinResult<(FileKey, String)> {
    let mut upload_id: Option<String> = None;
    let mut total: Option<u64> = None;
    let mut filename = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "upload_id" => upload_id = Some(value),
            "total" => {
                total = Some(value.trim().parse().map_err(|_| {
                    SafebinError::InvalidInput("total is not a positive integer".into())
                })?);
            }
            "filename" => filename = value,
            _ => {}
        }
    }

    let uid =
        upload_id.ok_or_else(|| SafebinError::InvalidInput("missing upload_id".into()))?;
    let total = total.ok_or_else(|| SafebinError::InvalidInput("missing total".into()))?;

    let store = state.store.clone();
    let name = filename.clone();
    let key = tokio::task::spawn_blocking(move || {
        let result = (|| -> SafebinResult<FileKey> {
            // First pass hashes the decrypted chunks; second pass feeds them
            // to finalize for re-encryption under the convergent key.
            let (key, plain_size) = store.digest_session(&uid, total)?;
            if plain_size > store.max_bytes() {
                return Err(SafebinError::TooLarge);
            }
            let mut src = store.session_reader(&uid, total)?;
            store.finalize(&mut src, &key, &name)?;
            Ok(key)
        })();
        store.remove_session(&uid);
        result
    })
    .await
    .map_err(join_error)??;

    Ok((key, filename))
}

/// Body-limit overflows surface as 413; everything else a client sends
/// malformed is a 400.
fn multipart_error(err: axum::extract::multipart::MultipartError) -> SafebinError {
    if err.into_response().status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        SafebinError::TooLarge
    } else {
        SafebinError::InvalidInput("malformed multipart body".into())
    }
}

fn join_error(err: tokio::task::JoinError) -> SafebinError {
    SafebinError::Other(anyhow::anyhow!("blocking task failed: {err}"))
}

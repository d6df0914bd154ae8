//! Share-link and error responses.
//!
//! The upload form talks to us via fetch with `X-Requested-With:
//! XMLHttpRequest` and swaps the returned HTML fragment into the page;
//! everything else (curl and friends) gets a plain-text URL or status line.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use safebin_core::SafebinError;
use safebin_crypto::{extension_of, slug_of, FileKey};

pub fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "XMLHttpRequest")
}

fn host_of(headers: &HeaderMap) -> &str {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
}

/// Scheme for absolute links: a reverse proxy tells us via
/// X-Forwarded-Proto; plain deployments are http.
fn scheme_of(headers: &HeaderMap) -> &str {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http")
}

/// Respond with the share link for a finalized upload.
pub fn share_link(headers: &HeaderMap, key: &FileKey, filename: &str) -> Response {
    let slug = slug_of(key, &extension_of(filename));
    let host = host_of(headers);

    if is_xhr(headers) {
        let fragment = format!(
            r#"<div class="result-container">
  <div class="dim result-label">Upload Complete:</div>
  <div class="copy-box">
    <input type="text" value="{host}/{slug}" id="share-url" readonly onclick="this.select()">
    <button onclick="copyToClipboard(this)">Copy</button>
  </div>
  <div class="reset-wrapper">
    <button class="reset-btn" onclick="resetUI()">Upload another</button>
  </div>
</div>"#
        );
        return Html(fragment).into_response();
    }

    let scheme = scheme_of(headers);
    format!("{scheme}://{host}/{slug}\n").into_response()
}

pub fn status_for(err: &SafebinError) -> StatusCode {
    match err {
        SafebinError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SafebinError::InvalidKey => StatusCode::UNAUTHORIZED,
        SafebinError::NotFound => StatusCode::NOT_FOUND,
        SafebinError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        SafebinError::Integrity(_)
        | SafebinError::Database(_)
        | SafebinError::Encoding(_)
        | SafebinError::Io(_)
        | SafebinError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map an error to its status response. Server-side failures are logged
/// here; the body never carries more than canonical status text.
pub fn send_error(headers: &HeaderMap, err: &SafebinError) -> Response {
    let code = status_for(err);
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "request failed");
    }
    error_response(headers, code)
}

pub fn error_response(headers: &HeaderMap, code: StatusCode) -> Response {
    if is_xhr(headers) {
        let fragment = format!(
            r#"<div class="result-container">
  <div class="error-text">Error {}</div>
  <div class="reset-wrapper">
    <button class="reset-btn" onclick="resetUI()">Try again</button>
  </div>
</div>"#,
            code.as_u16()
        );
        return (code, Html(fragment)).into_response();
    }

    let text = code.canonical_reason().unwrap_or("Error");
    (code, format!("{text}\n")).into_response()
}

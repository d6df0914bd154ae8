//! Embedded web assets: the upload form and its client script.
//!
//! Directory listings and raw `.html` paths under /static/ are refused so
//! the only page the server renders is the templated form.

use axum::extract::Path as UrlPath;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

const INDEX_HTML: &str = include_str!("../assets/index.html");
const APP_JS: &str = include_str!("../assets/js/app.js");
const STYLE_CSS: &str = include_str!("../assets/css/style.css");

/// Render the upload form with the configured size limit baked in.
pub fn render_index(max_mb: u64, host: &str) -> String {
    INDEX_HTML
        .replace("{{max_mb}}", &max_mb.to_string())
        .replace("{{host}}", host)
}

pub async fn serve(UrlPath(path): UrlPath<String>) -> Response {
    if path.is_empty() || path.ends_with('/') || path.ends_with(".html") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let (body, content_type) = match path.as_str() {
        "js/app.js" => (APP_JS, "text/javascript; charset=utf-8"),
        "css/style.css" => (STYLE_CSS, "text/css; charset=utf-8"),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_substitutes_limit() {
        let page = render_index(512, "bin.example.com");
        assert!(page.contains("512"));
        assert!(!page.contains("{{max_mb}}"));
        assert!(!page.contains("{{host}}"));
    }
}

//! Route table and shared request state.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use safebin_core::{ServiceConfig, MAX_REQUEST_OVERHEAD};
use safebin_store::Store;

use crate::{delivery, static_assets, upload};

pub struct AppState {
    pub store: Arc<Store>,
    pub config: ServiceConfig,
}

pub type SharedState = Arc<AppState>;

pub fn router(store: Arc<Store>, config: &ServiceConfig) -> Router {
    let state = Arc::new(AppState {
        store,
        config: config.clone(),
    });

    // The single-shot route allows the full configured size plus multipart
    // overhead; chunk traffic is capped far lower per request.
    let upload_limit = config.upload_body_limit() as usize;
    let chunk_limit = MAX_REQUEST_OVERHEAD as usize;

    Router::new()
        .route(
            "/",
            get(upload::home)
                .post(upload::single_shot)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/upload/chunk",
            post(upload::chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route(
            "/upload/finish",
            post(upload::finish).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/static/{*path}", get(static_assets::serve))
        .route("/{slug}", get(delivery::fetch))
        .with_state(state)
}

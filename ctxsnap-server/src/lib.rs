//! Local delivery endpoint for context reports.
//!
//! Reports and screenshots posted by the engine are written to an output
//! directory where coding assistants can pick them up.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod storage;
pub mod types;

pub use storage::{ReportStore, StoreError};

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<ReportStore>,
}

pub fn build_router(store: ReportStore, max_body_bytes: usize) -> Router {
    let state = AppState {
        store: Arc::new(store),
    };

    Router::new()
        .route("/health", get(api::health))
        .route("/report", post(api::save_report))
        .route("/reports", get(api::list_reports))
        .route("/screenshot", post(api::save_screenshot))
        .fallback(api::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

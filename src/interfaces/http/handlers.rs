//! Prometheus scrape handler
//!
//! Exposes `GET /metrics` returning the cached exposition document.
//! Handlers only read the cache; they never touch the metrics database.

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};

use crate::application::MetricsCache;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Shared state for the metrics endpoint
#[derive(Clone)]
pub struct MetricsState {
    pub cache: MetricsCache,
}

/// `GET /metrics`: Prometheus scrape endpoint (no auth)
///
/// Any other method on the path is answered like an unknown route.
pub async fn prometheus_metrics(method: Method, State(state): State<MetricsState>) -> Response {
    if method != Method::GET {
        return not_found().await.into_response();
    }

    let body = String::from(state.cache.current_document());
    (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// Fallback for every other route
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        "Not Found",
    )
}

//! HTTP surface of the exporter

pub mod handlers;

pub use handlers::{not_found, prometheus_metrics, MetricsState, TEXT_PLAIN};

use axum::{routing::any, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::application::MetricsCache;

/// Path served by the exporter
pub const METRICS_PATH: &str = "/metrics";

/// Build the exporter router: `/metrics` plus a 404 fallback.
pub fn create_exporter_router(cache: MetricsCache) -> Router {
    Router::new()
        .route(METRICS_PATH, any(prometheus_metrics))
        .fallback(not_found)
        .with_state(MetricsState { cache })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

//! # ACC Prometheus Adapter
//!
//! Exposes the metrics recorded by Apple's Content Caching service (a SQLite
//! database) in the Prometheus text exposition format.
//!
//! ## Architecture
//!
//! - **domain**: snapshot values, exposition rendering, summary view, errors
//! - **application**: the refreshable metrics cache
//! - **infrastructure**: SQLite reader, remote source, HTTP exporter, shutdown
//! - **interfaces**: axum router and handlers for `/metrics`
//! - **server**: [`server::ServerHandle`] wiring it all together

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;

#[cfg(test)]
mod test_support;

pub use application::{CachedMetrics, MetricsCache};
pub use config::{default_config_path, AppConfig, ConfigError, OperatingMode};
pub use domain::{ExpositionDocument, FilteredView, ReadError, ServerError};
pub use infrastructure::{ExporterServer, ServerState, SourceLocator, SqliteSnapshotReader};
pub use server::{init_tracing, ServerHandle, ServerOptions};

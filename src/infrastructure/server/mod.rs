//! Exporter HTTP server and shutdown plumbing

mod exporter;
mod shutdown;

pub use exporter::{ExporterServer, ServerState, DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};

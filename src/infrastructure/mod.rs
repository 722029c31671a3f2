//! Infrastructure layer - external concerns

pub mod database;
pub mod remote;
pub mod server;

pub use database::{SourceConfig, SourceLocator, SqliteSnapshotReader};
pub use remote::{probe_exporter, RemoteExporterSource};
pub use server::{
    ExporterServer, ServerState, ShutdownCoordinator, ShutdownSignal, DEFAULT_PORT,
    DEFAULT_SHUTDOWN_TIMEOUT,
};

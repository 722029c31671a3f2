use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single snapshot read. Never clears the cached document.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("No metrics source selected")]
    SourceUnset,

    #[error("Metrics source {} is not readable: {reason}", .path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("No columns found in table {table}")]
    NoColumns { table: String },

    #[error("Ordering column {column} not found in table {table}")]
    MissingOrderColumn { table: String, column: String },

    #[error("No rows found in table {table}")]
    NoData { table: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Remote exporter at {url} unavailable: {reason}")]
    Remote { url: String, reason: String },
}

impl ReadError {
    /// Whether the failure is about locating/opening the source rather than its contents.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            ReadError::SourceUnset | ReadError::SourceUnreadable { .. } | ReadError::Remote { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind exporter on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

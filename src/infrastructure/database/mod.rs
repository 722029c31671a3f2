pub mod snapshot_reader;

#[cfg(test)]
pub(crate) mod fixtures;

pub use snapshot_reader::SqliteSnapshotReader;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{debug, info};

use crate::domain::ReadError;

/// Location of the metrics table inside the source database
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Table holding one row per metrics sample
    pub table: String,
    /// Column used to pick the most recent row
    pub order_column: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            table: "ZMETRIC".to_string(),
            order_column: "ZCREATIONDATE".to_string(),
        }
    }
}

/// Currently selected source file, shared with whoever lets the user pick it.
#[derive(Debug, Clone, Default)]
pub struct SourceLocator {
    path: Arc<RwLock<Option<PathBuf>>>,
}

impl SourceLocator {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: Arc::new(RwLock::new(path)),
        }
    }

    pub fn get(&self) -> Option<PathBuf> {
        self.path
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Select a new source file; takes effect on the next read.
    pub fn set(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        info!("Metrics source selected: {}", path.display());
        *self
            .path
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path);
    }

    pub fn clear(&self) {
        *self
            .path
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// Connection URL for a read-only SQLite handle
pub fn read_only_url(path: &Path) -> String {
    format!("sqlite://{}?mode=ro", path.display())
}

/// Open the source database read-only.
///
/// A single connection is used and must be closed by the caller once the
/// read is done, so the cache server's own writer never sees a lingering lock.
pub async fn open_read_only(path: &Path) -> Result<DatabaseConnection, ReadError> {
    let unreadable = |reason: String| ReadError::SourceUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    if !metadata.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }

    let mut opts = ConnectOptions::new(read_only_url(path));
    opts.max_connections(1)
        .min_connections(0)
        .sqlx_logging(false);

    debug!("Opening metrics source: {}", path.display());
    Database::connect(opts)
        .await
        .map_err(|e| unreadable(e.to_string()))
}

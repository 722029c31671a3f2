//! Latest-row reader for the cache server's metrics database
//!
//! The table layout belongs to the cache server and changes between OS
//! releases, so columns are discovered with `pragma_table_info` on every read
//! and each value is fetched next to its `typeof()` so it can be decoded in
//! its native storage class.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, Statement};
use tracing::{debug, info, warn};

use super::{open_read_only, SourceConfig, SourceLocator};
use crate::domain::{
    render, ExpositionDocument, MetricsSource, ReadError, Snapshot, SnapshotValue, StorageClass,
};

/// Reads the most recent metrics row from a SQLite file.
///
/// The database is opened, read and closed within a single call.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotReader {
    locator: SourceLocator,
    config: SourceConfig,
}

impl SqliteSnapshotReader {
    pub fn new(locator: SourceLocator, config: SourceConfig) -> Self {
        Self { locator, config }
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    /// Read the latest row as a typed snapshot.
    pub async fn read_snapshot(&self) -> Result<Snapshot, ReadError> {
        let path = self.locator.get().ok_or(ReadError::SourceUnset)?;
        let db = open_read_only(&path).await?;

        let result = self.read_latest_row(&db).await;

        if let Err(e) = db.close().await {
            warn!("Error closing metrics source {}: {}", path.display(), e);
        }
        result
    }

    async fn discover_columns(&self, db: &DatabaseConnection) -> Result<Vec<String>, ReadError> {
        let rows = db
            .query_all(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                "SELECT name FROM pragma_table_info(?)",
                [self.config.table.clone().into()],
            ))
            .await?;

        let columns = rows
            .iter()
            .map(|row| row.try_get_by_index::<String>(0))
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(ReadError::NoColumns {
                table: self.config.table.clone(),
            });
        }
        if !columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&self.config.order_column))
        {
            return Err(ReadError::MissingOrderColumn {
                table: self.config.table.clone(),
                column: self.config.order_column.clone(),
            });
        }

        debug!(table = %self.config.table, columns = columns.len(), "Discovered metrics columns");
        Ok(columns)
    }

    async fn read_latest_row(&self, db: &DatabaseConnection) -> Result<Snapshot, ReadError> {
        let columns = self.discover_columns(db).await?;

        let projection = columns
            .iter()
            .map(|column| {
                let quoted = quote_ident(column);
                format!("typeof({quoted}), {quoted}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} DESC LIMIT 1",
            projection,
            quote_ident(&self.config.table),
            quote_ident(&self.config.order_column),
        );

        let row = db
            .query_one(Statement::from_string(DbBackend::Sqlite, sql))
            .await?
            .ok_or_else(|| ReadError::NoData {
                table: self.config.table.clone(),
            })?;

        let mut snapshot = Snapshot::new();
        for (index, column) in columns.into_iter().enumerate() {
            let type_name: String = row.try_get_by_index(index * 2)?;
            let value = decode_value(&row, index * 2 + 1, StorageClass::from_typeof(&type_name))?;
            snapshot.push(column, value);
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl MetricsSource for SqliteSnapshotReader {
    async fn fetch(&self) -> Result<ExpositionDocument, ReadError> {
        let snapshot = self.read_snapshot().await?;
        let document = render(&snapshot);
        info!(columns = snapshot.len(), "📊 Metrics snapshot read");
        Ok(document)
    }

    fn describe(&self) -> String {
        match self.locator.get() {
            Some(path) => format!("sqlite {} ({})", path.display(), self.config.table),
            None => format!("sqlite <unset> ({})", self.config.table),
        }
    }
}

/// Decode one raw column in its storage class, so reals keep full precision.
fn decode_value(
    row: &QueryResult,
    index: usize,
    class: StorageClass,
) -> Result<SnapshotValue, ReadError> {
    let value = match class {
        StorageClass::Integer => SnapshotValue::Integer(row.try_get_by_index::<i64>(index)?),
        StorageClass::Real => SnapshotValue::Real(row.try_get_by_index::<f64>(index)?),
        StorageClass::Text => SnapshotValue::Text(row.try_get_by_index::<String>(index)?),
        StorageClass::Null => SnapshotValue::Null,
    };
    Ok(value)
}

/// Quote an SQL identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

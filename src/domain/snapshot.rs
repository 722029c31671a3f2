//! Snapshot of the latest metrics row
//!
//! The source schema is owned by the cache server and changes between
//! releases, so a snapshot is an ordered list of discovered columns rather
//! than a fixed struct.

use std::fmt;

/// Typed value of a single column as reported by the source.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotValue {
    Integer(i64),
    Real(f64),
    Text(String),
    /// SQL `NULL`, or a storage class that cannot be represented (BLOB).
    Null,
}

/// SQLite storage class reported by `typeof()` for one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Integer,
    Real,
    Text,
    /// `null`, plus `blob` which has no metric representation
    Null,
}

impl StorageClass {
    pub fn from_typeof(type_name: &str) -> Self {
        match type_name.to_ascii_lowercase().as_str() {
            "integer" => StorageClass::Integer,
            "real" => StorageClass::Real,
            "text" => StorageClass::Text,
            _ => StorageClass::Null,
        }
    }
}

impl SnapshotValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SnapshotValue::Null)
    }
}

impl fmt::Display for SnapshotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotValue::Integer(v) => write!(f, "{}", v),
            SnapshotValue::Real(v) => write!(f, "{}", v),
            SnapshotValue::Text(v) => f.write_str(v),
            SnapshotValue::Null => f.write_str("NULL"),
        }
    }
}

/// One row of the metrics table, columns in table order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    columns: Vec<(String, SnapshotValue)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: SnapshotValue) {
        self.columns.push((column.into(), value));
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&SnapshotValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SnapshotValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, SnapshotValue)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, SnapshotValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

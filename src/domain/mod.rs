pub mod errors;
pub mod exposition;
pub mod filtered_view;
pub mod ports;
pub mod snapshot;

// Re-export commonly used types
pub use errors::{ReadError, ServerError};
pub use exposition::{metric_name, render, ExpositionDocument, SampleLine, METRIC_PREFIX};
pub use filtered_view::{FilteredView, DEFAULT_SUMMARY_KEYS};
pub use ports::MetricsSource;
pub use snapshot::{Snapshot, SnapshotValue, StorageClass};

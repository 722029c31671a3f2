//! Domain ports
//!
//! The cache only knows that something can produce an exposition document.
//! The local SQLite reader and the remote exporter poller both implement
//! [`MetricsSource`].

use async_trait::async_trait;

use super::errors::ReadError;
use super::exposition::ExpositionDocument;

// ── MetricsSource ──────────────────────────────────────────────

/// Producer of complete exposition documents.
///
/// Implementations must not keep the underlying resource open between calls.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Produce a fresh document or fail without side effects.
    async fn fetch(&self) -> Result<ExpositionDocument, ReadError>;

    /// Human-readable description used in logs.
    fn describe(&self) -> String;
}

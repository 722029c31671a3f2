pub mod metrics_cache;

// Re-export key types for convenience
pub use metrics_cache::{
    CacheOptions, CachedMetrics, MetricsCache, DEFAULT_REFRESH_INTERVAL, DEFAULT_TICK,
};

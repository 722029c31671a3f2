//! Metrics Cache
//!
//! Holds the last good exposition document together with its summary view,
//! refreshes it on a fixed interval and on demand, and reports how far the
//! current refresh cycle has progressed.
//!
//! The published state is a single `Arc<CachedMetrics>` replaced as a whole,
//! so HTTP handlers always see a document and view from the same read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::{
    ExpositionDocument, FilteredView, MetricsSource, ReadError, DEFAULT_SUMMARY_KEYS,
};
use crate::infrastructure::server::ShutdownSignal;

/// Default granularity of progress updates
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Default refresh interval
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Cache construction options
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Metric keys kept in the summary view
    pub summary_keys: Vec<String>,
    /// How often the timer wakes up to update progress
    pub tick: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            summary_keys: DEFAULT_SUMMARY_KEYS.iter().map(|k| k.to_string()).collect(),
            tick: DEFAULT_TICK,
        }
    }
}

/// One published cache state
#[derive(Debug, Clone, Default)]
pub struct CachedMetrics {
    pub document: ExpositionDocument,
    pub filtered: FilteredView,
    /// `None` until the first successful refresh
    pub refreshed_at: Option<DateTime<Utc>>,
}

struct Timer {
    shutdown: ShutdownSignal,
    task: JoinHandle<()>,
}

struct Inner {
    source: Arc<dyn MetricsSource>,
    options: CacheOptions,
    published: watch::Sender<Arc<CachedMetrics>>,
    /// `f64` bits of the refresh progress
    progress: AtomicU64,
    /// Serialises source reads and publication
    refresh_gate: tokio::sync::Mutex<()>,
    timer: Mutex<Option<Timer>>,
}

impl Inner {
    fn set_progress(&self, value: f64) {
        self.progress
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    async fn refresh(&self) -> Result<ExpositionDocument, ReadError> {
        let _gate = self.refresh_gate.lock().await;

        let document = self.source.fetch().await?;
        let filtered = FilteredView::from_document(&document, &self.options.summary_keys);
        debug!(
            bytes = document.as_str().len(),
            summary_keys = filtered.len(),
            "Publishing refreshed metrics"
        );

        self.published.send_replace(Arc::new(CachedMetrics {
            document: document.clone(),
            filtered,
            refreshed_at: Some(Utc::now()),
        }));
        Ok(document)
    }
}

/// Refreshable cache of the exposition document.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct MetricsCache {
    inner: Arc<Inner>,
}

impl MetricsCache {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self::with_options(source, CacheOptions::default())
    }

    pub fn with_options(source: Arc<dyn MetricsSource>, options: CacheOptions) -> Self {
        let (published, _) = watch::channel(Arc::new(CachedMetrics::default()));
        Self {
            inner: Arc::new(Inner {
                source,
                options,
                published,
                progress: AtomicU64::new(0f64.to_bits()),
                refresh_gate: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Read the source now and publish the result.
    ///
    /// Overlapping calls (including the timer's) run one after another. On
    /// failure the previously published state is left untouched.
    pub async fn force_refresh(&self) -> Result<ExpositionDocument, ReadError> {
        let result = self.inner.refresh().await;
        if let Err(e) = &result {
            debug!("Forced refresh failed: {}", e);
        }
        result
    }

    /// Start the recurring refresh timer.
    ///
    /// Progress is updated every tick; once `interval` has elapsed the source
    /// is read and the cycle restarts, whether or not the read succeeded.
    /// A second call while the timer runs is a no-op.
    pub fn start_periodic_refresh(&self, interval: Duration) {
        let mut timer = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if timer.is_some() {
            debug!("Periodic refresh already running");
            return;
        }

        let interval = interval.max(Duration::from_millis(1));
        let tick = self.inner.options.tick.min(interval).max(Duration::from_millis(1));
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            interval,
            tick,
            shutdown.clone(),
        ));

        info!(
            "🔄 Periodic refresh started (interval: {:?}, source: {})",
            interval,
            self.inner.source.describe()
        );
        *timer = Some(Timer { shutdown, task });
    }

    /// Cancel the timer and wait for an in-flight scheduled refresh to finish.
    pub async fn stop(&self) {
        let timer = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(timer) = timer {
            timer.shutdown.trigger();
            if let Err(e) = timer.task.await {
                warn!("Refresh timer task ended abnormally: {}", e);
            }
            self.inner.set_progress(0.0);
            info!("🔄 Periodic refresh stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Latest published state (document, view and timestamp together)
    pub fn snapshot(&self) -> Arc<CachedMetrics> {
        self.inner.published.borrow().clone()
    }

    pub fn current_document(&self) -> ExpositionDocument {
        self.inner.published.borrow().document.clone()
    }

    pub fn filtered_view(&self) -> FilteredView {
        self.inner.published.borrow().filtered.clone()
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.inner.published.borrow().refreshed_at
    }

    /// Fraction of the refresh interval elapsed, in `[0.0, 1.0]`
    pub fn refresh_progress(&self) -> f64 {
        f64::from_bits(self.inner.progress.load(Ordering::Acquire))
    }

    /// Receive every newly published state
    pub fn subscribe(&self) -> watch::Receiver<Arc<CachedMetrics>> {
        self.inner.published.subscribe()
    }

    pub fn source_description(&self) -> String {
        self.inner.source.describe()
    }
}

async fn run_timer(inner: Weak<Inner>, interval: Duration, tick: Duration, shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycle_start = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };

                let elapsed = cycle_start.elapsed();
                inner.set_progress(elapsed.as_secs_f64() / interval.as_secs_f64());

                if elapsed >= interval {
                    if let Err(e) = inner.refresh().await {
                        warn!("Scheduled metrics refresh failed: {}", e);
                    }
                    cycle_start = Instant::now();
                    inner.set_progress(0.0);
                }
            }
            _ = shutdown.notified().wait() => {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSource;

    const DOC_A: &str = "# TYPE acc_zbytesdropped gauge\nacc_zbytesdropped 1\n";
    const DOC_B: &str = "# TYPE acc_zbytesdropped gauge\nacc_zbytesdropped 2\n";

    fn cache_with(source: FakeSource) -> (MetricsCache, Arc<FakeSource>) {
        let source = Arc::new(source);
        let options = CacheOptions {
            tick: Duration::from_millis(10),
            ..CacheOptions::default()
        };
        (MetricsCache::with_options(source.clone(), options), source)
    }

    #[tokio::test]
    async fn starts_with_placeholder() {
        let (cache, _) = cache_with(FakeSource::ok(DOC_A));

        assert!(cache.current_document().is_placeholder());
        assert!(cache.filtered_view().is_empty());
        assert_eq!(cache.refresh_progress(), 0.0);
        assert!(cache.last_refreshed().is_none());
    }

    #[tokio::test]
    async fn force_refresh_publishes_document_and_view() {
        let (cache, _) = cache_with(FakeSource::ok(DOC_A));

        let doc = cache.force_refresh().await.unwrap();

        assert_eq!(doc.as_str(), DOC_A);
        assert_eq!(cache.current_document().as_str(), DOC_A);
        assert_eq!(cache.filtered_view().get("acc_zbytesdropped"), Some("1"));
        assert!(cache.last_refreshed().is_some());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_document() {
        let (cache, _) = cache_with(FakeSource::scripted(vec![Some(DOC_A), None]));
        cache.force_refresh().await.unwrap();
        let before = cache.snapshot();

        let result = cache.force_refresh().await;

        assert!(matches!(result, Err(ReadError::NoData { .. })));
        assert_eq!(cache.current_document(), before.document);
        assert_eq!(cache.filtered_view(), before.filtered);
        assert_eq!(cache.last_refreshed(), before.refreshed_at);
    }

    #[tokio::test]
    async fn failure_before_first_success_keeps_placeholder() {
        let (cache, _) = cache_with(FakeSource::failing());
        assert!(cache.force_refresh().await.is_err());
        assert!(cache.current_document().is_placeholder());
    }

    #[tokio::test]
    async fn double_refresh_is_idempotent() {
        let (cache, _) = cache_with(FakeSource::ok(DOC_B));
        let first = cache.force_refresh().await.unwrap();
        let second = cache.force_refresh().await.unwrap();
        assert_eq!(first.as_str(), second.as_str());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_do_not_overlap() {
        let (cache, source) =
            cache_with(FakeSource::counting().with_delay(Duration::from_millis(50)));

        let (a, b) = tokio::join!(cache.force_refresh(), cache.force_refresh());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(source.calls(), 2);
        assert_eq!(source.max_in_flight(), 1);
        assert_ne!(a, b);
        let current = cache.current_document();
        assert!(current == a || current == b);
        assert_eq!(current.samples().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn timer_and_forced_refresh_serialise() {
        let (cache, source) =
            cache_with(FakeSource::counting().with_delay(Duration::from_millis(40)));
        cache.start_periodic_refresh(Duration::from_millis(30));

        for _ in 0..3 {
            cache.force_refresh().await.unwrap();
        }
        cache.stop().await;

        assert!(source.calls() >= 3);
        assert_eq!(source.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn periodic_refresh_runs_and_stops() {
        let (cache, source) = cache_with(FakeSource::counting());
        cache.start_periodic_refresh(Duration::from_millis(50));
        assert!(cache.is_running());

        tokio::time::sleep(Duration::from_millis(300)).await;
        cache.stop().await;

        let calls = source.calls();
        assert!(calls >= 2, "expected at least two scheduled refreshes, got {}", calls);
        assert!(!cache.is_running());
        assert!(!cache.current_document().is_placeholder());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(source.calls(), calls);
    }

    #[tokio::test]
    async fn failing_refresh_does_not_stall_the_clock() {
        let (cache, source) = cache_with(FakeSource::failing());
        cache.start_periodic_refresh(Duration::from_millis(40));

        tokio::time::sleep(Duration::from_millis(250)).await;
        cache.stop().await;

        assert!(source.calls() >= 2);
        assert!(cache.current_document().is_placeholder());
    }

    #[tokio::test]
    async fn progress_rises_within_cycle_and_resets() {
        let (cache, source) = cache_with(FakeSource::ok(DOC_A));
        cache.start_periodic_refresh(Duration::from_millis(400));

        let mut samples = Vec::new();
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            samples.push(cache.refresh_progress());
        }

        assert_eq!(source.calls(), 0);
        assert!(samples.windows(2).all(|w| w[0] <= w[1]), "{:?}", samples);
        assert!(samples.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(*samples.last().unwrap() > 0.2);

        // Wait past the end of the first cycle
        tokio::time::sleep(Duration::from_millis(260)).await;
        assert!(source.calls() >= 1);
        assert!(cache.refresh_progress() < 0.5);

        cache.stop().await;
        assert_eq!(cache.refresh_progress(), 0.0);
    }

    #[tokio::test]
    async fn progress_saturates_while_refresh_is_slow() {
        let (cache, source) =
            cache_with(FakeSource::counting().with_delay(Duration::from_millis(400)));
        let mut rx = cache.subscribe();
        cache.start_periodic_refresh(Duration::from_millis(200));

        // The scheduled read starts at ~200ms and is still running at ~350ms
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.refresh_progress(), 1.0);
        assert!(cache.current_document().is_placeholder());

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("scheduled refresh should publish")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.refresh_progress() < 0.5, "{}", cache.refresh_progress());

        cache.stop().await;
    }

    #[tokio::test]
    async fn second_start_is_ignored() {
        let (cache, _) = cache_with(FakeSource::ok(DOC_A));
        cache.start_periodic_refresh(Duration::from_millis(100));
        cache.start_periodic_refresh(Duration::from_millis(10));
        assert!(cache.is_running());
        cache.stop().await;
        cache.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_safe() {
        let (cache, _) = cache_with(FakeSource::ok(DOC_A));
        cache.stop().await;
        assert!(!cache.is_running());
    }

    #[tokio::test]
    async fn subscribers_see_new_state() {
        let (cache, _) = cache_with(FakeSource::ok(DOC_B));
        let mut rx = cache.subscribe();

        cache.force_refresh().await.unwrap();

        tokio::time::timeout(Duration::from_millis(200), rx.changed())
            .await
            .expect("change notification")
            .unwrap();
        assert_eq!(rx.borrow().filtered.get("acc_zbytesdropped"), Some("2"));
    }
}

//! Reusable exporter runtime.
//!
//! Provides [`ServerHandle`] that encapsulates the full lifecycle: operating
//! mode selection, metrics source, refresh cache, HTTP exporter, summary
//! logging and graceful shutdown. The CLI binary is a thin wrapper around it.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{CacheOptions, MetricsCache};
use crate::config::{AppConfig, OperatingMode};
use crate::domain::{ExpositionDocument, MetricsSource};
use crate::infrastructure::{
    probe_exporter, ExporterServer, RemoteExporterSource, ShutdownCoordinator, ShutdownSignal,
    SourceLocator, SqliteSnapshotReader,
};

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the exporter.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
}

// ── Mode selection ─────────────────────────────────────────────────

/// Decide between local and remote operation.
///
/// `auto` probes the configured remote URL; an HTTP 200 means another
/// exporter already serves the metrics and this process only polls it.
pub async fn resolve_mode(config: &AppConfig) -> OperatingMode {
    match config.mode {
        OperatingMode::Auto => {
            if probe_exporter(&config.remote.url, config.remote.probe_timeout()).await {
                info!("Mode: remote (exporter found at {})", config.remote.url);
                OperatingMode::Remote
            } else {
                info!("Mode: local (no exporter at {})", config.remote.url);
                OperatingMode::Local
            }
        }
        forced => {
            info!("Mode: {} (configured)", forced);
            forced
        }
    }
}

/// Build the metrics source for an already resolved mode.
pub fn build_source(
    config: &AppConfig,
    mode: OperatingMode,
    locator: &SourceLocator,
) -> Result<Arc<dyn MetricsSource>, Box<dyn Error>> {
    match mode {
        OperatingMode::Remote => Ok(Arc::new(RemoteExporterSource::new(
            config.remote.url.clone(),
            config.remote.probe_timeout(),
        )?)),
        _ => Ok(Arc::new(SqliteSnapshotReader::new(
            locator.clone(),
            config.source.source_config(),
        ))),
    }
}

/// Resolve the mode, read the source once and return the document.
pub async fn collect_once(config: &AppConfig) -> Result<ExpositionDocument, Box<dyn Error>> {
    let mode = resolve_mode(config).await;
    let locator = SourceLocator::new(config.source.path.clone());
    let source = build_source(config, mode, &locator)?;
    Ok(source.fetch().await?)
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running exporter.
///
/// # Examples
///
/// ```rust,no_run
/// use acc_prom_adapter::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     // ... wait for shutdown signal ...
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// The configuration the exporter was started with.
    pub config: AppConfig,
    /// Resolved operating mode (`Local` or `Remote`).
    pub mode: OperatingMode,
    /// Shared metrics cache.
    pub cache: MetricsCache,
    /// Selected source file (local mode reads it on every refresh).
    pub locator: SourceLocator,

    exporter: Option<ExporterServer>,
    local_addr: Option<SocketAddr>,
    shutdown: ShutdownCoordinator,
    summary_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Start the exporter with the given options.
    ///
    /// This will:
    /// 1. Resolve the operating mode (probing the remote URL in `auto`)
    /// 2. Force one refresh (failure is logged, the placeholder is served)
    /// 3. Start the periodic refresh timer
    /// 4. Bind the HTTP exporter (local mode only; bind failure is fatal)
    /// 5. Start logging the summary view on every published refresh
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn Error>> {
        let config = opts.config;

        info!("Starting ACC Prometheus exporter...");

        let mode = resolve_mode(&config).await;
        let locator = SourceLocator::new(config.source.path.clone());
        if mode == OperatingMode::Local {
            match locator.get() {
                Some(path) => info!("Metrics source: {}", path.display()),
                None => warn!("No metrics source selected; serving the placeholder"),
            }
        }

        // ── Cache ──────────────────────────────────────────────
        let source = build_source(&config, mode, &locator)?;
        let cache = MetricsCache::with_options(
            source,
            CacheOptions {
                summary_keys: config.refresh.summary_keys.clone(),
                tick: config.refresh.tick(),
            },
        );

        match cache.force_refresh().await {
            Ok(_) => info!("Initial refresh from {}", cache.source_description()),
            Err(e) if e.is_source_error() => {
                warn!("⚠️ Metrics source unavailable, serving the placeholder: {}", e)
            }
            Err(e) => warn!("⚠️ Initial refresh failed: {}", e),
        }

        let shutdown = ShutdownCoordinator::new();
        let summary_task = spawn_summary_logger(cache.clone(), shutdown.signal());

        cache.start_periodic_refresh(config.refresh.interval());

        // ── HTTP exporter ──────────────────────────────────────
        let (exporter, local_addr) = if mode == OperatingMode::Local {
            let exporter =
                ExporterServer::with_shutdown_timeout(cache.clone(), config.shutdown_timeout());
            if let Err(e) = exporter.start(config.server.port).await {
                error!("Failed to start exporter: {}", e);
                shutdown.signal().trigger();
                cache.stop().await;
                let _ = summary_task.await;
                return Err(e.into());
            }
            let local_addr = exporter.local_addr().await;
            (Some(exporter), local_addr)
        } else {
            info!("Remote mode: not binding port {}", config.server.port);
            (None, None)
        };

        info!("🚀 Exporter started.");

        Ok(Self {
            config,
            mode,
            cache,
            locator,
            exporter,
            local_addr,
            shutdown,
            summary_task,
        })
    }

    /// Address the exporter listens on (local mode only).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn exporter(&self) -> Option<&ExporterServer> {
        self.exporter.as_ref()
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Stop everything after shutdown has been triggered: the refresh timer
    /// first, then the HTTP exporter.
    pub async fn wait(self) {
        info!("⏳ Waiting for exporter tasks to complete...");

        self.cache.stop().await;

        if let Some(exporter) = &self.exporter {
            exporter.stop().await;
        }

        if let Err(e) = self.summary_task.await {
            error!("Summary task panicked: {}", e);
        }

        info!("👋 ACC exporter shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down ACC exporter...");
        self.trigger_shutdown();
        self.wait().await;
    }

    /// Check if the exporter is still serving (or polling, in remote mode).
    pub fn is_running(&self) -> bool {
        match &self.exporter {
            Some(exporter) => exporter.is_running(),
            None => self.cache.is_running(),
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Log the filtered view each time the cache publishes a new state.
fn spawn_summary_logger(cache: MetricsCache, shutdown: ShutdownSignal) -> JoinHandle<()> {
    let mut updates = cache.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = updates.borrow_and_update().clone();
                    match serde_json::to_string(&state.filtered) {
                        Ok(summary) => info!(
                            refreshed_at = ?state.refreshed_at,
                            %summary,
                            "📈 Metrics summary"
                        ),
                        Err(e) => warn!("Could not serialize summary: {}", e),
                    }
                }
            }
        }
    })
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

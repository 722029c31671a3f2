//! Prometheus exporter HTTP server
//!
//! Serves the cached document on `GET /metrics` over HTTP/1.1 (keep-alive
//! and pipelining are handled by hyper) on the tokio worker pool. The server
//! state is published on a watch channel so callers can react to it becoming
//! ready instead of polling.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::shutdown::ShutdownSignal;
use crate::application::MetricsCache;
use crate::domain::ServerError;
use crate::interfaces::http::create_exporter_router;

/// Default exporter port
pub const DEFAULT_PORT: u16 = 9200;

/// Default time allowed for open connections to drain on stop
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
        };
        f.write_str(s)
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown: ShutdownSignal,
    task: JoinHandle<()>,
}

struct Inner {
    cache: MetricsCache,
    shutdown_timeout: Duration,
    state: watch::Sender<ServerState>,
    running: Mutex<Option<Running>>,
}

/// HTTP exporter bound to one port at a time.
///
/// Cheap to clone; clones control the same listener.
#[derive(Clone)]
pub struct ExporterServer {
    inner: Arc<Inner>,
}

impl ExporterServer {
    pub fn new(cache: MetricsCache) -> Self {
        Self::with_shutdown_timeout(cache, DEFAULT_SHUTDOWN_TIMEOUT)
    }

    pub fn with_shutdown_timeout(cache: MetricsCache, shutdown_timeout: Duration) -> Self {
        let (state, _) = watch::channel(ServerState::Stopped);
        Self {
            inner: Arc::new(Inner {
                cache,
                shutdown_timeout,
                state,
                running: Mutex::new(None),
            }),
        }
    }

    /// Bind `0.0.0.0:port` and start serving.
    ///
    /// Calling `start` while the server is starting or running logs and
    /// returns without rebinding. A bind failure is returned immediately and
    /// leaves the server stopped.
    pub async fn start(&self, port: u16) -> Result<(), ServerError> {
        let mut running = self.inner.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.task.is_finished() {
                info!("Exporter already running on {}", current.local_addr);
                return Ok(());
            }
            warn!("Exporter on {} had exited, starting a new listener", current.local_addr);
            running.take();
        }

        self.inner.state.send_replace(ServerState::Starting);
        info!("Starting Prometheus exporter on port {}", port);

        let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => listener,
            Err(source) => {
                self.inner.state.send_replace(ServerState::Stopped);
                error!("Failed to bind exporter on port {}: {}", port, source);
                return Err(ServerError::Bind { port, source });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.inner.state.send_replace(ServerState::Stopped);
                return Err(ServerError::LocalAddr(e));
            }
        };

        let shutdown = ShutdownSignal::new();
        let router = create_exporter_router(self.inner.cache.clone());
        let graceful = shutdown.clone();
        let owner = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                graceful.wait().await;
                info!("🛑 Exporter received shutdown signal");
            });
            if let Err(e) = server.await {
                error!("Exporter server error: {}", e);
            }
            // The listener is gone whether or not stop() asked for it
            if let Some(inner) = owner.upgrade() {
                inner.state.send_replace(ServerState::Stopped);
            }
        });

        *running = Some(Running {
            local_addr,
            shutdown,
            task,
        });
        self.inner.state.send_replace(ServerState::Running);
        info!("🚀 Prometheus exporter listening on http://{}/metrics", local_addr);
        Ok(())
    }

    /// Stop serving and release the port.
    ///
    /// Open connections get the shutdown timeout to finish; after that the
    /// server task is aborted. Safe to call repeatedly.
    pub async fn stop(&self) {
        let mut running = self.inner.running.lock().await;
        let Some(mut current) = running.take() else {
            return;
        };

        info!("Stopping Prometheus exporter on {}", current.local_addr);
        current.shutdown.trigger();

        match tokio::time::timeout(self.inner.shutdown_timeout, &mut current.task).await {
            Ok(Ok(())) => info!("✅ Exporter stopped"),
            Ok(Err(e)) => error!("Exporter task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "⚠️ Exporter did not drain within {:?}, aborting open connections",
                    self.inner.shutdown_timeout
                );
                current.task.abort();
                let _ = current.task.await;
            }
        }

        self.inner.state.send_replace(ServerState::Stopped);
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions (e.g. wait for `Running` to show "ready")
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.inner.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Address actually bound, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .running
            .lock()
            .await
            .as_ref()
            .filter(|r| !r.task.is_finished())
            .map(|r| r.local_addr)
    }

    pub fn cache(&self) -> &MetricsCache {
        &self.inner.cache
    }
}

//! ACC Prometheus Adapter: CLI exporter
//!
//! Headless exporter for Apple Content Caching metrics suitable for
//! deployment as a launchd service or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/acc-prom-adapter/config.toml)
//! acc-exporter
//!
//! # Custom config path and source database
//! acc-exporter --config /etc/acc-exporter.toml --source ./Metrics.db
//!
//! # Print one exposition document and exit
//! acc-exporter --once
//!
//! # Validate config without starting
//! acc-exporter --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use acc_prom_adapter::config::{AppConfig, OperatingMode};
use acc_prom_adapter::server::{collect_once, init_tracing, ServerHandle, ServerOptions};

/// ACC Prometheus Adapter: serves Content Caching metrics on `/metrics`.
#[derive(Parser, Debug)]
#[command(
    name = "acc-exporter",
    version,
    about = "Prometheus exporter for Apple Content Caching metrics",
    long_about = "Reads the Content Caching metrics database and serves the latest \
                  sample in the Prometheus text format on GET /metrics.\n\n\
                  Default config: ~/.config/acc-prom-adapter/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "ACC_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the exporter listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the metrics database path.
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Override the operating mode (auto, local, remote).
    #[arg(short, long)]
    mode: Option<OperatingMode>,

    /// Override the URL of the exporter polled in remote mode.
    #[arg(long)]
    remote_url: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the exporter.
    #[arg(long)]
    check: bool,

    /// Read the source once, print the exposition document and exit.
    #[arg(long)]
    once: bool,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(acc_prom_adapter::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            // Init tracing first so subsequent logs are formatted properly
            let cfg = with_log_level(cfg, cli.log_level.as_deref());
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            let cfg = with_log_level(AppConfig::default(), cli.log_level.as_deref());
            init_tracing(&cfg);
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
            cfg
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.port {
        info!("CLI override: port = {}", port);
        config.server.port = port;
    }
    if let Some(ref source) = cli.source {
        info!("CLI override: source = {}", source.display());
        config.source.path = Some(source.clone());
    }
    if let Some(mode) = cli.mode {
        info!("CLI override: mode = {}", mode);
        config.mode = mode;
    }
    if let Some(ref url) = cli.remote_url {
        info!("CLI override: remote_url = {}", url);
        config.remote.url = url.clone();
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        let source = config
            .source
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   Mode        : {}", config.mode);
        println!("   Port        : {}", config.server.port);
        println!("   Source      : {}", source);
        println!("   Table       : {}.{}", config.source.table, config.source.order_column);
        println!("   Interval    : {}s", config.refresh.interval_secs);
        println!("   Remote URL  : {}", config.remote.url);
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    if cli.write_config {
        config.save(&config_path)?;
        println!("Configuration written to {}", config_path.display());
        return Ok(());
    }

    // ── One-shot mode ──────────────────────────────────────────
    if cli.once {
        let document = collect_once(&config).await?;
        print!("{}", document);
        return Ok(());
    }

    // ── Start exporter ─────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions { config }).await?;

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    if let Some(addr) = handle.local_addr() {
        info!("🚀 Serving http://{}/metrics. Press Ctrl+C to shutdown gracefully.", addr);
    } else {
        info!("🚀 Polling remote exporter. Press Ctrl+C to shutdown gracefully.");
    }

    // Wait for shutdown signal, then clean up
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}

/// Apply the `--log-level` override before tracing is initialised.
fn with_log_level(mut config: AppConfig, level: Option<&str>) -> AppConfig {
    if let Some(level) = level {
        config.logging.level = level.to_string();
    }
    config
}

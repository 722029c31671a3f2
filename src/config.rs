//! Configuration module
//!
//! The exporter reads a TOML file (`~/.config/acc-prom-adapter/config.toml`
//! by default). Every key is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DEFAULT_SUMMARY_KEYS;
use crate::infrastructure::database::SourceConfig;

/// Well-known location of the Content Caching metrics database on macOS
pub const DEFAULT_SOURCE_PATH: &str =
    "/Library/Application Support/Apple/AssetCache/Metrics/Metrics.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How the process obtains its metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Probe the remote URL; use it when it answers, otherwise read locally
    #[default]
    Auto,
    /// Read the local database and serve `/metrics`
    Local,
    /// Poll another exporter; never bind the port
    Remote,
}

impl std::str::FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(OperatingMode::Auto),
            "local" => Ok(OperatingMode::Local),
            "remote" => Ok(OperatingMode::Remote),
            other => Err(format!(
                "unknown mode '{}', expected auto, local or remote",
                other
            )),
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperatingMode::Auto => "auto",
            OperatingMode::Local => "local",
            OperatingMode::Remote => "remote",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    /// Seconds open connections get to drain on stop
    pub shutdown_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 9200,
            shutdown_timeout: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// Metrics database; `None` until a file is selected (`path = ""` in TOML)
    #[serde(with = "optional_path")]
    pub path: Option<PathBuf>,
    pub table: String,
    pub order_column: String,
}

impl Default for SourceSection {
    fn default() -> Self {
        let defaults = SourceConfig::default();
        Self {
            path: Some(PathBuf::from(DEFAULT_SOURCE_PATH)),
            table: defaults.table,
            order_column: defaults.order_column,
        }
    }
}

impl SourceSection {
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            table: self.table.clone(),
            order_column: self.order_column.clone(),
        }
    }
}

/// An empty string stands for "no source selected"; TOML has no null.
mod optional_path {
    use std::path::PathBuf;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        path: &Option<PathBuf>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match path {
            Some(path) => serializer.serialize_str(&path.to_string_lossy()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<PathBuf>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(raw)))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    pub interval_secs: u64,
    /// Progress update granularity
    pub tick_millis: u64,
    pub summary_keys: Vec<String>,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            tick_millis: 100,
            summary_keys: DEFAULT_SUMMARY_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl RefreshSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub url: String,
    pub probe_timeout_secs: u64,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200/metrics".to_string(),
            probe_timeout_secs: 2,
        }
    }
}

impl RemoteSection {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: OperatingMode,
    pub server: ServerSection,
    pub source: SourceSection,
    pub refresh: RefreshSection,
    pub remote: RemoteSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, contents).map_err(write_err)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}

/// `~/.config/acc-prom-adapter/config.toml` (platform config dir)
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("acc-prom-adapter")
        .join("config.toml")
}

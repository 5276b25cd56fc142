//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `hubhist.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use hubhist_app::blacklist::Blacklist;
use hubhist_app::services::history_service::HistoryOptions;
use hubhist_app::value_formatter::ValueFormatter;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Token log storage settings.
    pub storage: StorageConfig,
    /// History recording and extraction settings.
    pub history: HistoryConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the `History` tree.
    pub root: PathBuf,
    /// How long an operation waits for its series lock.
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Switch history recording on or off.
    pub enabled: bool,
    /// Gap after which an unchanged value opens a new interval.
    pub outdated_after_secs: u32,
    /// Upper bound for a single API request.
    pub request_timeout_secs: u64,
    /// Value of number samples taken before any value is known.
    pub fill_value: Option<String>,
    pub component_blacklist: HashSet<String>,
    pub status_blacklist: HashSet<String>,
    /// Series written `component.status`.
    pub series_blacklist: HashSet<String>,
    /// Decimals kept for numeric values, keyed by status or `component.status`.
    pub status_decimals: BTreeMap<String, u32>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `hubhist.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("hubhist.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HUBHIST_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("HUBHIST_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("HUBHIST_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("HUBHIST_DATA_DIR") {
            self.storage.root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("HUBHIST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage root must not be empty".to_string(),
            ));
        }
        if self.history.outdated_after_secs == 0 {
            return Err(ConfigError::Validation(
                "outdated_after_secs must be non-zero".to_string(),
            ));
        }
        if self.history.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    #[must_use]
    pub fn storage_config(&self) -> hubhist_adapter_storage_tokenlog::Config {
        hubhist_adapter_storage_tokenlog::Config {
            root: self.storage.root.clone(),
            lock_timeout: Duration::from_millis(self.storage.lock_timeout_ms),
        }
    }

    #[must_use]
    pub fn history_options(&self) -> HistoryOptions {
        HistoryOptions {
            enabled: self.history.enabled,
            outdated_after: TimeDelta::seconds(i64::from(self.history.outdated_after_secs)),
            fill_value: self.history.fill_value.clone(),
            formatter: ValueFormatter::new(self.history.status_decimals.clone()),
            blacklist: Blacklist {
                components: self.history.component_blacklist.clone(),
                statuses: self.history.status_blacklist.clone(),
                series: self.history.series_blacklist.clone(),
            },
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.history.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            lock_timeout_ms: 5_000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            outdated_after_secs: 360,
            request_timeout_secs: 30,
            fill_value: None,
            component_blacklist: HashSet::new(),
            status_blacklist: HashSet::new(),
            series_blacklist: HashSet::new(),
            status_decimals: BTreeMap::from([
                ("temperature.value".to_string(), 1),
                ("humidity.value".to_string(), 0),
            ]),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hubhistd=info,hubhist=info,tower_http=debug".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

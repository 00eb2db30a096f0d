//! Configuration module for the status page.
//!
//! Loads configuration from an optional JSON file and environment variables
//! with sensible defaults.

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::Status;

/// One second in nanoseconds.
pub const SECOND: i64 = 1_000_000_000;
/// One day in nanoseconds.
pub const DAY: i64 = 24 * 60 * 60 * SECOND;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Banner text shown for each overall status.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusText {
    pub healthy: String,
    pub degraded: String,
    pub down: String,
    pub unknown: String,
}

impl Default for StatusText {
    fn default() -> Self {
        Self {
            healthy: "Situation Normal".to_string(),
            degraded: "Degraded Service".to_string(),
            down: "Service Disruption".to_string(),
            unknown: "Status Unknown".to_string(),
        }
    }
}

impl StatusText {
    pub fn for_status(&self, status: Status) -> &str {
        match status {
            Status::Healthy => &self.healthy,
            Status::Degraded => &self.degraded,
            Status::Down => &self.down,
            Status::Unknown => &self.unknown,
        }
    }
}

/// How the dashboard is written out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::Invalid("output", s.to_string())),
        }
    }
}

/// Where check files are read from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: "fs", "http" or "sqlite".
    #[serde(rename = "type")]
    pub kind: String,
    pub dir: Option<String>,
    pub url: Option<String>,
    pub sqlite_db_file: Option<String>,
    /// Per-request timeout for http storage, in seconds.
    pub timeout: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: "fs".to_string(),
            dir: Some(".".to_string()),
            url: None,
            sqlite_db_file: None,
            timeout: 10.0,
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        if self.timeout <= 0.0 {
            Duration::from_secs(10)
        } else {
            Duration::from_secs_f64(self.timeout)
        }
    }
}

/// Status page configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How much history to load on startup, in nanoseconds (default: 1 day)
    pub timeframe: i64,
    /// Seconds between polls for new check files (default: 60)
    pub refresh_interval: u64,
    /// Seconds between refreshes of relative time labels (default: 10)
    pub label_refresh_interval: u64,
    /// Seconds a poll round may take before it is finalized with whatever
    /// arrived (default: 30)
    pub round_timeout: u64,
    /// A gap between results larger than this multiple of the previous gap
    /// is flagged (default: 10)
    pub gap_factor: f64,
    /// Maximum number of timeline entries rendered (default: 20)
    pub timeline_limit: usize,
    pub output: OutputFormat,
    pub status_text: StatusText,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeframe: DAY,
            refresh_interval: 60,
            label_refresh_interval: 10,
            round_timeout: 30,
            gap_factor: 10.0,
            timeline_limit: 20,
            output: OutputFormat::Text,
            status_text: StatusText::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Starts from defaults, then the JSON file named by `STATUSPAGE_CONFIG`
    /// if set, then environment variables:
    /// - `STATUSPAGE_TIMEFRAME`: lookback in nanoseconds
    /// - `STATUSPAGE_REFRESH_INTERVAL`: poll interval in seconds
    /// - `STATUSPAGE_LABEL_REFRESH`: label refresh interval in seconds
    /// - `STATUSPAGE_ROUND_TIMEOUT`: round deadline in seconds
    /// - `STATUSPAGE_GAP_FACTOR`: big gap multiple
    /// - `STATUSPAGE_OUTPUT`: "text" or "json"
    /// - `STATUSPAGE_STORAGE`: storage type
    /// - `STATUSPAGE_STORAGE_DIR`, `STATUSPAGE_STORAGE_URL`, `STATUSPAGE_STORAGE_DB`
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match env::var("STATUSPAGE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(v) = var("STATUSPAGE_TIMEFRAME").and_then(|s| s.parse().ok()) {
            self.timeframe = v;
        }
        if let Some(v) = var("STATUSPAGE_REFRESH_INTERVAL").and_then(|s| s.parse().ok()) {
            self.refresh_interval = v;
        }
        if let Some(v) = var("STATUSPAGE_LABEL_REFRESH").and_then(|s| s.parse().ok()) {
            self.label_refresh_interval = v;
        }
        if let Some(v) = var("STATUSPAGE_ROUND_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.round_timeout = v;
        }
        if let Some(v) = var("STATUSPAGE_GAP_FACTOR").and_then(|s| s.parse().ok()) {
            self.gap_factor = v;
        }
        if let Some(v) = var("STATUSPAGE_OUTPUT").and_then(|s| s.parse().ok()) {
            self.output = v;
        }
        if let Some(kind) = var("STATUSPAGE_STORAGE") {
            self.storage.kind = kind;
        }
        if let Some(dir) = var("STATUSPAGE_STORAGE_DIR") {
            self.storage.dir = Some(dir);
        }
        if let Some(url) = var("STATUSPAGE_STORAGE_URL") {
            self.storage.url = Some(url);
        }
        if let Some(db) = var("STATUSPAGE_STORAGE_DB") {
            self.storage.sqlite_db_file = Some(db);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeframe <= 0 {
            return Err(ConfigError::Invalid("timeframe", self.timeframe.to_string()));
        }
        if self.refresh_interval == 0 {
            return Err(ConfigError::Invalid("refresh_interval", "0".to_string()));
        }
        if self.round_timeout == 0 {
            return Err(ConfigError::Invalid("round_timeout", "0".to_string()));
        }
        if self.label_refresh_interval == 0 {
            return Err(ConfigError::Invalid("label_refresh_interval", "0".to_string()));
        }
        if self.gap_factor.is_nan() || self.gap_factor <= 0.0 {
            return Err(ConfigError::Invalid("gap_factor", self.gap_factor.to_string()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn label_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.label_refresh_interval)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout)
    }
}

//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/agriai/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/agriai/` (~/.config/agriai/)
//! - Data: `$XDG_DATA_HOME/agriai/` (~/.local/share/agriai/)
//! - State/Logs: `$XDG_STATE_HOME/agriai/` (~/.local/state/agriai/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Classification service configuration
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Local retention of history and reports
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Report export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vision model endpoint used to classify images
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the generative language API
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,

    /// Model to use
    #[serde(default = "default_classifier_model")]
    pub model: String,

    /// API key (can also use GEMINI_API_KEY or API_KEY env vars)
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classifier_endpoint(),
            model: default_classifier_model(),
            api_key: None,
            timeout_secs: default_classifier_timeout(),
        }
    }
}

impl ClassifierConfig {
    /// API key from config, falling back to the environment
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config(
                "classifier.endpoint must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("classifier.model must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "classifier.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_classifier_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_classifier_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_classifier_timeout() -> u64 {
    60
}

/// Retention policy for the history and report feeds
#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    /// Maximum age of an entry in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Seconds between background sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum number of image-bearing history entries kept
    #[serde(default = "default_history_max_items")]
    pub history_max_items: usize,

    /// Byte quota of the local key-value store
    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            history_max_items: default_history_max_items(),
            storage_quota_bytes: default_storage_quota_bytes(),
        }
    }
}

impl RetentionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 {
            return Err(Error::Config(
                "retention.ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "retention.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.history_max_items == 0 {
            return Err(Error::Config(
                "retention.history_max_items must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_ttl_secs() -> u64 {
    120
}

fn default_sweep_interval_secs() -> u64 {
    120
}

fn default_history_max_items() -> usize {
    2
}

fn default_storage_quota_bytes() -> usize {
    5 * 1024 * 1024
}

/// Report export configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ExportConfig {
    /// Directory exported reports are written to (defaults to the working directory)
    pub dir: Option<PathBuf>,
}

impl ExportConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.retention.validate()?;
        config.classifier.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/agriai/config.toml` (~/.config/agriai/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("agriai").join("config.toml")
    }

    /// Returns the data directory path (for the local store)
    ///
    /// `$XDG_DATA_HOME/agriai/` (~/.local/share/agriai/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("agriai")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/agriai/` (~/.local/state/agriai/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("agriai")
    }

    /// Returns the key-value store file path
    ///
    /// `$XDG_DATA_HOME/agriai/store.db` (~/.local/share/agriai/store.db)
    pub fn store_path() -> PathBuf {
        Self::data_dir().join("store.db")
    }
}

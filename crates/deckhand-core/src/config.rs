//! Configuration management for deckhand.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (DECKHAND_*)
//! 2. Config file (`$DECKHAND_CONFIG` or ~/.deckhand/config.toml)
//! 3. Default values

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::BackoffStrategy;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults applied to hook registrations
    pub hooks: HookDefaults,

    /// Retry policy for install and deployment operations
    pub retry: RetrySettings,

    /// Log tailer settings
    pub tailer: TailerSettings,

    /// Log chunk aggregation thresholds
    pub aggregator: AggregatorSettings,

    /// Log dispatch rate limiting
    pub rate_limit: RateLimitSettings,

    /// Paths
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookDefaults {
    /// Lower runs first
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Per-attempt timeout, 0 disables the timeout
    #[serde(default = "default_hook_timeout")]
    pub timeout_ms: u64,

    /// Retry attempts after the first failure
    #[serde(default)]
    pub retries: u32,

    #[serde(default = "default_retry_initial_delay")]
    pub retry_initial_delay_ms: u64,

    /// Exponential (true) or constant (false) delay between attempts
    #[serde(default = "default_true")]
    pub retry_backoff: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub strategy: BackoffStrategy,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailerSettings {
    /// Start at the end of the file instead of the beginning
    #[serde(default = "default_true")]
    pub from_end: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Cap for the error backoff
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Bounded line queue between tailer and consumer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorSettings {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    /// Lines longer than this are truncated
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Tokens per second
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for addon manifests
    #[serde(default = "default_addons_dir")]
    pub addons_dir: PathBuf,

    /// Metrics database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Workspace used by recovery actions
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
}

// Default value functions
fn default_priority() -> i32 {
    100
}

fn default_hook_timeout() -> u64 {
    5000
}

fn default_retry_initial_delay() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    60_000
}

fn default_poll_interval() -> u64 {
    250
}

fn default_max_backoff() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_max_lines() -> usize {
    50
}

fn default_max_bytes() -> usize {
    16 * 1024
}

fn default_flush_interval() -> u64 {
    500
}

fn default_max_line_bytes() -> usize {
    4096
}

fn default_rate() -> f64 {
    20.0
}

fn default_burst() -> u32 {
    40
}

/// Base directory for deckhand data
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deckhand")
}

fn default_addons_dir() -> PathBuf {
    default_data_dir().join("addons")
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("metrics.db")
}

fn default_workspace_dir() -> PathBuf {
    default_data_dir().join("workspace")
}

impl Default for HookDefaults {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            timeout_ms: default_hook_timeout(),
            retries: 0,
            retry_initial_delay_ms: default_retry_initial_delay(),
            retry_backoff: default_true(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: BackoffStrategy::default(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Default for TailerSettings {
    fn default() -> Self {
        Self {
            from_end: default_true(),
            poll_interval_ms: default_poll_interval(),
            max_backoff_ms: default_max_backoff(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_bytes: default_max_bytes(),
            flush_interval_ms: default_flush_interval(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            burst: default_burst(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            addons_dir: default_addons_dir(),
            database_path: default_database_path(),
            workspace_dir: default_workspace_dir(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment, then validate it.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("DECKHAND_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Apply `DECKHAND_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DECKHAND_ADDONS_DIR") {
            self.paths.addons_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("DECKHAND_DATABASE_PATH") {
            self.paths.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("DECKHAND_WORKSPACE_DIR") {
            self.paths.workspace_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("DECKHAND_HOOK_TIMEOUT_MS") {
            self.hooks.timeout_ms = parse_env("DECKHAND_HOOK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("DECKHAND_HOOK_RETRIES") {
            self.hooks.retries = parse_env("DECKHAND_HOOK_RETRIES", &v)?;
        }
        if let Some(v) = lookup("DECKHAND_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("DECKHAND_RETRY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("DECKHAND_RETRY_STRATEGY") {
            self.retry.strategy = parse_env("DECKHAND_RETRY_STRATEGY", &v)?;
        }
        if let Some(v) = lookup("DECKHAND_RATE_LIMIT") {
            self.rate_limit.rate = parse_env("DECKHAND_RATE_LIMIT", &v)?;
        }
        if let Some(v) = lookup("DECKHAND_RATE_BURST") {
            self.rate_limit.burst = parse_env("DECKHAND_RATE_BURST", &v)?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigValidationError::invalid(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigValidationError::invalid(
                "retry.max_delay_ms",
                "must not be smaller than retry.base_delay_ms",
            ));
        }

        if self.tailer.queue_capacity == 0 {
            return Err(ConfigValidationError::invalid(
                "tailer.queue_capacity",
                "must be greater than 0",
            ));
        }

        if self.tailer.poll_interval_ms == 0 {
            return Err(ConfigValidationError::invalid(
                "tailer.poll_interval_ms",
                "must be greater than 0",
            ));
        }

        if self.aggregator.max_lines == 0 || self.aggregator.max_bytes == 0 {
            return Err(ConfigValidationError::invalid(
                "aggregator",
                "max_lines and max_bytes must be greater than 0",
            ));
        }

        if self.aggregator.max_line_bytes == 0 {
            return Err(ConfigValidationError::invalid(
                "aggregator.max_line_bytes",
                "must be greater than 0",
            ));
        }

        if !(self.rate_limit.rate > 0.0) || self.rate_limit.burst == 0 {
            return Err(ConfigValidationError::invalid(
                "rate_limit",
                "rate and burst must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    var: &str,
    value: &str,
) -> std::result::Result<T, ConfigValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigValidationError::invalid(var, format!("cannot parse '{value}'")))
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigValidationError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.hooks.priority, 100);
        assert_eq!(config.hooks.timeout_ms, 5000);
        assert_eq!(config.hooks.retries, 0);
        assert!(config.hooks.retry_backoff);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.strategy, BackoffStrategy::Exponential);
        assert_eq!(config.aggregator.max_lines, 50);
        assert_eq!(config.rate_limit.burst, 40);
        assert!(config.paths.addons_dir.ends_with(".deckhand/addons"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[retry]
strategy = "fibonacci"
max_attempts = 5

[tailer]
from_end = false
"#,
        )
        .unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.retry.strategy, BackoffStrategy::Fibonacci);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(!config.tailer.from_end);
        assert_eq!(config.tailer.queue_capacity, 1000);
        assert_eq!(config.hooks, HookDefaults::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry\nmax_attempts = ").unwrap();
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("DECKHAND_RETRY_STRATEGY", "linear"),
            ("DECKHAND_RATE_LIMIT", "5.5"),
            ("DECKHAND_ADDONS_DIR", "/srv/addons"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.retry.strategy, BackoffStrategy::Linear);
        assert_eq!(config.rate_limit.rate, 5.5);
        assert_eq!(config.paths.addons_dir, PathBuf::from("/srv/addons"));
    }

    #[test]
    fn test_env_bad_value_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "DECKHAND_RATE_BURST").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("DECKHAND_RATE_BURST"));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tailer.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate_limit.rate = 0.0;
        assert!(config.validate().is_err());
    }
}

//! Runtime configuration for polling and uploads.
//!
//! Defaults match what the backend expects from a dashboard client; every
//! value can be overridden through `MLOPS_*` environment variables or a
//! `.env` file.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default gap between two checks of a bounded poll.
pub const DEFAULT_POLL_GAP: Duration = Duration::from_millis(300);

/// Default retry budget of a bounded poll.
pub const DEFAULT_POLL_MAX_RETRIES: u32 = 100;

/// Interval used when following backend tasks (registry and deploy).
pub const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Size of one upload chunk in bytes.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000_000;

pub const ENV_POLL_GAP_MS: &str = "MLOPS_POLL_GAP_MS";
pub const ENV_POLL_MAX_RETRIES: &str = "MLOPS_POLL_MAX_RETRIES";
pub const ENV_TASK_POLL_INTERVAL_MS: &str = "MLOPS_TASK_POLL_INTERVAL_MS";
pub const ENV_DEPLOY_POLL_INTERVAL_MS: &str = "MLOPS_DEPLOY_POLL_INTERVAL_MS";
pub const ENV_DELETE_POLL_GAP_MS: &str = "MLOPS_DELETE_POLL_GAP_MS";
pub const ENV_DELETE_POLL_MAX_RETRIES: &str = "MLOPS_DELETE_POLL_MAX_RETRIES";
pub const ENV_UPLOAD_CHUNK_SIZE: &str = "MLOPS_UPLOAD_CHUNK_SIZE";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("Upload chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("Failed to read env file: {0}")]
    EnvFile(String),
}

/// Gap and retry budget of one polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Wait before each check.
    pub gap: Duration,
    /// Maximum number of checks; `None` polls until the checker stops it.
    pub max_retries: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::bounded(DEFAULT_POLL_GAP, DEFAULT_POLL_MAX_RETRIES)
    }
}

impl PollingConfig {
    #[must_use]
    pub const fn bounded(gap: Duration, max_retries: u32) -> Self {
        Self {
            gap,
            max_retries: Some(max_retries),
        }
    }

    /// Poll until the checker says stop; termination relies on the
    /// backend eventually reaching a terminal state.
    #[must_use]
    pub const fn unbounded(gap: Duration) -> Self {
        Self {
            gap,
            max_retries: None,
        }
    }

    #[must_use]
    pub const fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether `attempts` checks have used up the budget.
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        match self.max_retries {
            Some(max) => attempts >= max,
            None => false,
        }
    }
}

/// Configuration shared by the registry and the lifecycle coordinators.
///
/// # Example
///
/// ```
/// use mlops_core::OperationsConfig;
/// use std::time::Duration;
///
/// let config = OperationsConfig::new()
///     .with_task_poll_interval(Duration::from_secs(1))
///     .with_chunk_size(5_000_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationsConfig {
    /// Defaults for ad-hoc bounded polls.
    pub polling: PollingConfig,
    /// Interval of the task observation registry.
    pub task_poll_interval: Duration,
    /// Interval used while following a deploy task.
    pub deploy_poll_interval: Duration,
    /// Bounded poll confirming that a deleted version disappeared.
    pub delete_confirmation: PollingConfig,
    /// Upload chunk size in bytes.
    pub chunk_size: u64,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            polling: PollingConfig::default(),
            task_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            deploy_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            delete_confirmation: PollingConfig::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl OperationsConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    #[must_use]
    pub const fn with_task_poll_interval(mut self, interval: Duration) -> Self {
        self.task_poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_deploy_poll_interval(mut self, interval: Duration) -> Self {
        self.deploy_poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_delete_confirmation(mut self, polling: PollingConfig) -> Self {
        self.delete_confirmation = polling;
        self
    }

    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.gap.is_zero() {
            return Err(ConfigError::ZeroInterval("Poll gap"));
        }
        if self.task_poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("Task poll interval"));
        }
        if self.deploy_poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("Deploy poll interval"));
        }
        if self.delete_confirmation.gap.is_zero() {
            return Err(ConfigError::ZeroInterval("Delete confirmation gap"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }

    /// Defaults overlaid with `MLOPS_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from a `.env` file, then with the
    /// process environment. The file is read without touching the process
    /// environment.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        let file_values = dotenvy::from_path_iter(path)
            .map_err(|e| ConfigError::EnvFile(e.to_string()))?
            .collect::<Result<HashMap<String, String>, _>>()
            .map_err(|e| ConfigError::EnvFile(e.to_string()))?;

        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_values.get(key).cloned())
        })
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, ENV_POLL_GAP_MS)? {
            config.polling.gap = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<u32>(&lookup, ENV_POLL_MAX_RETRIES)? {
            config.polling.max_retries = Some(max);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_TASK_POLL_INTERVAL_MS)? {
            config.task_poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_DEPLOY_POLL_INTERVAL_MS)? {
            config.deploy_poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_DELETE_POLL_GAP_MS)? {
            config.delete_confirmation.gap = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<u32>(&lookup, ENV_DELETE_POLL_MAX_RETRIES)? {
            config.delete_confirmation.max_retries = Some(max);
        }
        if let Some(size) = parse_var::<u64>(&lookup, ENV_UPLOAD_CHUNK_SIZE)? {
            config.chunk_size = size;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value = trimmed.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    tracing::debug!(target: "mlops.config", key, value = trimmed, "Config override applied");
    Ok(Some(value))
}

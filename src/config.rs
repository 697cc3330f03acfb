//! Engine configuration.
//!
//! Values are layered, highest priority first:
//! 1. Environment variables (`TASKHOST_*`)
//! 2. TOML configuration file or string
//! 3. Defaults
//!
//! ```toml
//! notification_capacity = 256
//! service_url = "https://tasks.example.com"
//!
//! [retry]
//! max_retries = 5
//! initial_backoff_ms = 500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_NOTIFICATION_CAPACITY;
use crate::error::TaskError;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the bounded notification channel.
    pub notification_capacity: usize,

    /// Base URL of this service, advertised to external reviewers as
    /// `{service_url}/api/tasks`.
    pub service_url: Option<String>,

    /// Outbound HTTP retry policy.
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            service_url: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded exponential backoff for outbound calls.
///
/// The delay before retry `n` (zero-based) is
/// `initial_backoff_ms * backoff_multiplier^n`, capped at `max_backoff_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Growth factor between retries.
    pub backoff_multiplier: u32,
    /// Upper bound for a single delay.
    pub max_backoff_ms: u64,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2,
            max_backoff_ms: 30_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before the zero-based retry `attempt`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use taskhost::RetryConfig;
    ///
    /// let retry = RetryConfig::default();
    /// assert_eq!(retry.backoff_for(0), Duration::from_secs(1));
    /// assert_eq!(retry.backoff_for(2), Duration::from_secs(4));
    /// assert_eq!(retry.backoff_for(10), Duration::from_secs(30));
    /// ```
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(attempt);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl EngineConfig {
    /// Loads defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, TaskError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file and applies environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TaskError> {
        Self::load(Some(path.as_ref()))
    }

    /// Parses TOML content. Environment variables are not consulted.
    pub fn from_toml(content: &str) -> Result<Self, TaskError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TaskError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, TaskError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TaskError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Applies `TASKHOST_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup. Unparsable values are
    /// ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse_into<T: std::str::FromStr>(key: &str, raw: Option<String>, slot: &mut T) {
            if let Some(raw) = raw {
                match raw.parse() {
                    Ok(v) => *slot = v,
                    Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable override"),
                }
            }
        }

        parse_into(
            "TASKHOST_NOTIFICATION_CAPACITY",
            lookup("TASKHOST_NOTIFICATION_CAPACITY"),
            &mut self.notification_capacity,
        );
        if let Some(url) = lookup("TASKHOST_SERVICE_URL") {
            self.service_url = Some(url);
        }
        parse_into(
            "TASKHOST_RETRY_MAX_RETRIES",
            lookup("TASKHOST_RETRY_MAX_RETRIES"),
            &mut self.retry.max_retries,
        );
        parse_into(
            "TASKHOST_RETRY_INITIAL_BACKOFF_MS",
            lookup("TASKHOST_RETRY_INITIAL_BACKOFF_MS"),
            &mut self.retry.initial_backoff_ms,
        );
        parse_into(
            "TASKHOST_RETRY_BACKOFF_MULTIPLIER",
            lookup("TASKHOST_RETRY_BACKOFF_MULTIPLIER"),
            &mut self.retry.backoff_multiplier,
        );
        parse_into(
            "TASKHOST_RETRY_MAX_BACKOFF_MS",
            lookup("TASKHOST_RETRY_MAX_BACKOFF_MS"),
            &mut self.retry.max_backoff_ms,
        );
        parse_into(
            "TASKHOST_RETRY_REQUEST_TIMEOUT_MS",
            lookup("TASKHOST_RETRY_REQUEST_TIMEOUT_MS"),
            &mut self.retry.request_timeout_ms,
        );
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.notification_capacity == 0 {
            return Err(TaskError::Config(
                "notification_capacity must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_multiplier == 0 {
            return Err(TaskError::Config(
                "retry.backoff_multiplier must be at least 1".to_string(),
            ));
        }
        if self.retry.request_timeout_ms == 0 {
            return Err(TaskError::Config(
                "retry.request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

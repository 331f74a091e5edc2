//! Configuration for the runtime, commit retries, and the announcement refresher.
//!
//! Every section and field is optional in TOML:
//!
//! ```toml
//! [runtime]
//! persist_queue_bound = 128
//!
//! [retry]
//! max_attempts = 8
//!
//! [refresh]
//! interval_ms = 60000
//! ```

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::runtime::handle::RuntimeConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConferenceConfig {
    /// Persistence batching and snapshots.
    pub runtime: RuntimeConfig,
    /// Optimistic commit retries.
    pub retry: RetryPolicy,
    /// Periodic announcement refresh.
    pub refresh: RefreshConfig,
}

impl ConferenceConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.runtime.persist_queue_bound == 0 {
            return Err(ConfigError::Invalid(
                "runtime.persist_queue_bound must be at least 1".into(),
            ));
        }
        if self.refresh.interval_ms == 0 {
            return Err(ConfigError::Invalid("refresh.interval_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Bounded retry of optimistic commits that lost a race.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles each retry.
    pub base_backoff_ms: u64,
    /// Backoff ceiling.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 2,
            max_backoff_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Pause after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.base_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// Schedule of the built-in announcement refresh loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Time between refreshes.
    pub interval_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_ms: 60_000 }
    }
}

impl RefreshConfig {
    /// Interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

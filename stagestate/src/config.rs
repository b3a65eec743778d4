//! Environment configuration for stage processes.
//!
//! Every tunable is read from an environment variable once, at start-up,
//! into a typed [`StateConfig`]. Nothing downstream reads the environment.

use crate::observability::{LogFormat, LoggingConfig};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Bucket holding state objects.
pub const ENV_STATE_BUCKET: &str = "STATE_BUCKET";
/// Deadline for one object load, in milliseconds.
pub const ENV_LOAD_TIMEOUT_MS: &str = "STATE_LOAD_TIMEOUT_MS";
/// Deadline for one object save, in milliseconds.
pub const ENV_SAVE_TIMEOUT_MS: &str = "STATE_SAVE_TIMEOUT_MS";
/// Maximum attempts per operation.
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "RETRY_MAX_ATTEMPTS";
/// Delay before the first retry, in milliseconds.
pub const ENV_RETRY_BASE_DELAY_MS: &str = "RETRY_BASE_DELAY_MS";
/// Ceiling for retry delays, in milliseconds.
pub const ENV_RETRY_MAX_DELAY_MS: &str = "RETRY_MAX_DELAY_MS";
/// Consecutive failures that open a circuit breaker.
pub const ENV_BREAKER_MAX_FAILURES: &str = "CIRCUIT_BREAKER_MAX_FAILURES";
/// Time an open breaker waits before a trial call, in milliseconds.
pub const ENV_BREAKER_RESET_TIMEOUT_MS: &str = "CIRCUIT_BREAKER_RESET_TIMEOUT_MS";
/// Document table for run metadata.
pub const ENV_VERIFICATION_TABLE: &str = "DYNAMODB_VERIFICATION_TABLE";
/// Extended reasoning switch forwarded to inference stages.
pub const ENV_THINKING_TYPE: &str = "THINKING_TYPE";
/// Log filter directive.
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
/// Log output format.
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Configuration could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required environment variable {name}")]
    Missing {
        /// Variable name.
        name: String,
    },
    /// A variable is set to something unusable.
    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &str, value: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Whether inference stages request extended reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    /// Extended reasoning on.
    #[default]
    Enabled,
    /// Extended reasoning off.
    Disabled,
}

impl ThinkingMode {
    /// Returns the canonical spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }

    /// Returns true for [`ThinkingMode::Enabled`].
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl fmt::Display for ThinkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThinkingMode {
    type Err = ConfigError;

    /// Accepts `enabled` and `disabled` in any case. The legacy spelling
    /// `enable` is normalized to `enabled` with a warning.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            "enable" => {
                warn!(
                    variable = ENV_THINKING_TYPE,
                    value = s,
                    "Normalizing legacy thinking type spelling to 'enabled'"
                );
                Ok(Self::Enabled)
            }
            _ => Err(ConfigError::invalid(
                ENV_THINKING_TYPE,
                s,
                "expected 'enabled' or 'disabled'",
            )),
        }
    }
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

fn default_save_timeout_ms() -> u64 {
    15_000
}

/// Typed configuration of one stage process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Bucket holding state objects.
    pub bucket: String,
    /// Deadline for one object load.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    /// Deadline for one object save.
    #[serde(default = "default_save_timeout_ms")]
    pub save_timeout_ms: u64,
    /// Retry bounds.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Circuit breaker thresholds.
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    /// Document table for run metadata, if the stage records any.
    #[serde(default)]
    pub verification_table: Option<String>,
    /// Extended reasoning switch.
    #[serde(default)]
    pub thinking: ThinkingMode,
    /// Log filter and format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StateConfig {
    /// Creates a config for `bucket` with every other value at its default.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            load_timeout_ms: default_load_timeout_ms(),
            save_timeout_ms: default_save_timeout_ms(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            verification_table: None,
            thinking: ThinkingMode::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, then validates it.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bucket = get(ENV_STATE_BUCKET).ok_or_else(|| ConfigError::Missing {
            name: ENV_STATE_BUCKET.to_string(),
        })?;
        let mut config = Self::new(bucket);

        if let Some(raw) = get(ENV_LOAD_TIMEOUT_MS) {
            config.load_timeout_ms = parse_number(ENV_LOAD_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = get(ENV_SAVE_TIMEOUT_MS) {
            config.save_timeout_ms = parse_number(ENV_SAVE_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = get(ENV_RETRY_MAX_ATTEMPTS) {
            config.retry.max_attempts = parse_number(ENV_RETRY_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = get(ENV_RETRY_BASE_DELAY_MS) {
            config.retry.base_delay_ms = parse_number(ENV_RETRY_BASE_DELAY_MS, &raw)?;
        }
        if let Some(raw) = get(ENV_RETRY_MAX_DELAY_MS) {
            config.retry.max_delay_ms = parse_number(ENV_RETRY_MAX_DELAY_MS, &raw)?;
        }
        if let Some(raw) = get(ENV_BREAKER_MAX_FAILURES) {
            config.breaker.max_failures = parse_number(ENV_BREAKER_MAX_FAILURES, &raw)?;
        }
        if let Some(raw) = get(ENV_BREAKER_RESET_TIMEOUT_MS) {
            config.breaker.reset_timeout_ms = parse_number(ENV_BREAKER_RESET_TIMEOUT_MS, &raw)?;
        }
        config.verification_table = get(ENV_VERIFICATION_TABLE);
        if let Some(raw) = get(ENV_THINKING_TYPE) {
            config.thinking = raw.parse()?;
        }
        if let Some(raw) = get(ENV_LOG_LEVEL) {
            config.logging.level = raw;
        }
        if let Some(raw) = get(ENV_LOG_FORMAT) {
            config.logging.format = raw
                .parse::<LogFormat>()
                .map_err(|reason| ConfigError::invalid(ENV_LOG_FORMAT, &raw, reason))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects values no stage can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::Missing {
                name: ENV_STATE_BUCKET.to_string(),
            });
        }
        let positive = [
            (ENV_LOAD_TIMEOUT_MS, self.load_timeout_ms),
            (ENV_SAVE_TIMEOUT_MS, self.save_timeout_ms),
            (ENV_RETRY_MAX_ATTEMPTS, u64::from(self.retry.max_attempts)),
            (ENV_BREAKER_MAX_FAILURES, u64::from(self.breaker.max_failures)),
            (ENV_BREAKER_RESET_TIMEOUT_MS, self.breaker.reset_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::invalid(name, value, "must be greater than zero"));
            }
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::invalid(
                ENV_RETRY_BASE_DELAY_MS,
                self.retry.base_delay_ms,
                format!("exceeds {ENV_RETRY_MAX_DELAY_MS} ({})", self.retry.max_delay_ms),
            ));
        }
        Ok(())
    }

    /// The load deadline.
    #[must_use]
    pub const fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// The save deadline.
    #[must_use]
    pub const fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::invalid(name, raw, "expected a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| env.get(name).cloned()
    }

    #[test]
    fn test_defaults_with_only_bucket() {
        let config = StateConfig::from_lookup(lookup(&[(ENV_STATE_BUCKET, "state")])).unwrap();
        assert_eq!(config, StateConfig::new("state"));
        assert_eq!(config.load_timeout(), Duration::from_secs(10));
        assert_eq!(config.save_timeout(), Duration::from_secs(15));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.breaker.max_failures, 5);
        assert_eq!(config.thinking, ThinkingMode::Enabled);
        assert!(config.verification_table.is_none());
    }

    #[test]
    fn test_missing_bucket() {
        let err = StateConfig::from_lookup(lookup(&[(ENV_STATE_BUCKET, "  ")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing {
                name: ENV_STATE_BUCKET.to_string()
            }
        );
    }

    #[test]
    fn test_overrides() {
        let config = StateConfig::from_lookup(lookup(&[
            (ENV_STATE_BUCKET, "state"),
            (ENV_LOAD_TIMEOUT_MS, "2500"),
            (ENV_RETRY_MAX_ATTEMPTS, "5"),
            (ENV_RETRY_BASE_DELAY_MS, "250"),
            (ENV_BREAKER_MAX_FAILURES, "2"),
            (ENV_BREAKER_RESET_TIMEOUT_MS, "1000"),
            (ENV_VERIFICATION_TABLE, "verifications"),
            (ENV_THINKING_TYPE, "Disabled"),
            (ENV_LOG_LEVEL, "stagestate=debug"),
            (ENV_LOG_FORMAT, "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.load_timeout_ms, 2_500);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.breaker, CircuitBreakerConfig::new(2, 1_000));
        assert_eq!(config.verification_table.as_deref(), Some("verifications"));
        assert_eq!(config.thinking, ThinkingMode::Disabled);
        assert_eq!(config.logging.level, "stagestate=debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = StateConfig::from_lookup(lookup(&[
            (ENV_STATE_BUCKET, "state"),
            (ENV_RETRY_MAX_ATTEMPTS, "three"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == ENV_RETRY_MAX_ATTEMPTS));
    }

    #[test]
    fn test_zero_values_are_rejected() {
        for name in [ENV_RETRY_MAX_ATTEMPTS, ENV_SAVE_TIMEOUT_MS, ENV_BREAKER_MAX_FAILURES] {
            let err = StateConfig::from_lookup(lookup(&[(ENV_STATE_BUCKET, "state"), (name, "0")]))
                .unwrap_err();
            assert!(err.to_string().contains(name));
        }
    }

    #[test]
    fn test_base_delay_above_ceiling_is_rejected() {
        let err = StateConfig::from_lookup(lookup(&[
            (ENV_STATE_BUCKET, "state"),
            (ENV_RETRY_BASE_DELAY_MS, "5000"),
            (ENV_RETRY_MAX_DELAY_MS, "1000"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(ENV_RETRY_BASE_DELAY_MS));
    }

    #[test]
    fn test_thinking_mode_normalization() {
        assert_eq!("enabled".parse::<ThinkingMode>().unwrap(), ThinkingMode::Enabled);
        assert_eq!("ENABLED".parse::<ThinkingMode>().unwrap(), ThinkingMode::Enabled);
        assert_eq!("enable".parse::<ThinkingMode>().unwrap(), ThinkingMode::Enabled);
        assert_eq!("disabled".parse::<ThinkingMode>().unwrap(), ThinkingMode::Disabled);
        assert!("on".parse::<ThinkingMode>().is_err());
        assert!("disable".parse::<ThinkingMode>().is_err());
        assert!(ThinkingMode::Enabled.is_enabled());
    }

    #[test]
    fn test_invalid_log_format() {
        let err = StateConfig::from_lookup(lookup(&[
            (ENV_STATE_BUCKET, "state"),
            (ENV_LOG_FORMAT, "xml"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_config_error_converts_to_state_error() {
        let err: crate::errors::StateError = ConfigError::Missing {
            name: ENV_STATE_BUCKET.to_string(),
        }
        .into();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Config);
        assert!(!err.is_retryable());
    }
}

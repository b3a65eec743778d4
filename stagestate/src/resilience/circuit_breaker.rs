//! Three-state circuit breaker guarding one flaky dependency.

use super::ResilienceMetrics;
use crate::errors::StateError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    #[default]
    Closed,
    /// Calls fail fast.
    Open,
    /// One trial call is admitted after the reset timeout.
    HalfOpen,
}

impl CircuitState {
    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub max_failures: u32,
    /// Time the breaker stays open before admitting a trial call.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout_ms: 30_000,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a config with explicit thresholds.
    #[must_use]
    pub const fn new(max_failures: u32, reset_timeout_ms: u64) -> Self {
        Self {
            max_failures,
            reset_timeout_ms,
        }
    }

    /// The reset timeout as a duration.
    #[must_use]
    pub const fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

#[derive(Debug, Default)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Guards calls to one dependency.
///
/// `closed` → `open` after `max_failures` consecutive failures, `open` →
/// `half_open` once the reset timeout has elapsed since the last failure,
/// `half_open` → `closed` on success or back to `open` on failure.
///
/// Only retryable failures count toward opening. A non-retryable error such
/// as a missing object is an answer from a healthy dependency and is treated
/// like a success.
///
/// The lock is never held across an await.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    metrics: Option<Arc<ResilienceMetrics>>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::default()),
            metrics: None,
        }
    }

    /// Attaches a metrics handle that counts rejected calls.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ResilienceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The name of the guarded dependency.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured thresholds.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Consecutive failures since the last success.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Forces the breaker back to closed.
    pub fn reset(&self) {
        *self.inner.lock() = BreakerInner::default();
    }

    /// Runs `operation` unless the breaker is open.
    ///
    /// An open breaker fails with [`StateError::CircuitOpen`] without calling
    /// `operation`.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, StateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StateError>>,
    {
        self.admit()?;
        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) if err.is_retryable() => {
                self.on_failure(&err);
                Err(err)
            }
            Err(err) => {
                self.on_success();
                Err(err)
            }
        }
    }

    fn admit(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let timeout = self.config.reset_timeout();
        let elapsed = inner.last_failure.map_or(timeout, |at| at.elapsed());
        if elapsed < timeout {
            drop(inner);
            if let Some(metrics) = &self.metrics {
                metrics.record_rejection();
            }
            let remaining = u64::try_from((timeout - elapsed).as_millis()).unwrap_or(u64::MAX);
            return Err(StateError::circuit_open(&self.name, remaining));
        }

        inner.state = CircuitState::HalfOpen;
        info!(breaker = %self.name, "Circuit breaker half-open, admitting trial call");
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(breaker = %self.name, "Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    fn on_failure(&self, err: &StateError) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        let should_open = inner.state == CircuitState::HalfOpen
            || inner.failure_count >= self.config.max_failures;
        if should_open && inner.state != CircuitState::Open {
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                error_kind = %err.kind(),
                "Circuit breaker opened"
            );
        }
        if should_open {
            inner.state = CircuitState::Open;
        }
    }
}

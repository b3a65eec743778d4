//! Retry execution with per-error-kind policies, backoff and jitter.
//!
//! One [`RetryManager`] wraps every object store and document store call of
//! a stage. Failures are classified through [`StateError::kind`], the policy
//! for that kind bounds the attempts and the backoff, and a cancellation
//! token can abort the loop between attempts.

use super::{CircuitBreaker, ResilienceMetrics};
use crate::cancellation::CancellationToken;
use crate::errors::{ErrorKind, StateError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// delay = base * factor^(attempt - 1)
    #[default]
    Exponential,
    /// delay = base * attempt
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Global retry bounds, usually loaded from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,
    /// Ceiling applied to every computed delay in milliseconds.
    pub max_delay_ms: u64,
    /// Symmetric jitter as a fraction of the computed delay.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter fraction, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }
}

/// Retry behavior for one error kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Whether the kind is retried at all.
    pub retryable: bool,
    /// Attempt budget for this kind.
    pub max_attempts: u32,
    /// Growth factor for exponential backoff.
    pub backoff_factor: f64,
    /// Ceiling for this kind in milliseconds.
    pub max_delay_ms: u64,
    /// How the delay grows with the attempt number.
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    /// A retried policy with exponential backoff.
    #[must_use]
    pub const fn retry(max_attempts: u32, backoff_factor: f64, max_delay_ms: u64) -> Self {
        Self {
            retryable: true,
            max_attempts,
            backoff_factor,
            max_delay_ms,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            retryable: false,
            max_attempts: 1,
            backoff_factor: 1.0,
            max_delay_ms: 0,
            strategy: BackoffStrategy::Constant,
        }
    }

    /// The budget for kinds without a configured policy.
    #[must_use]
    pub const fn conservative() -> Self {
        Self::retry(2, 2.0, 5_000)
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Policy table keyed by [`ErrorKind`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    policies: HashMap<ErrorKind, RetryPolicy>,
    fallback: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(ErrorKind::ObjectStore, RetryPolicy::retry(3, 2.0, 20_000));
        policies.insert(ErrorKind::Timeout, RetryPolicy::retry(2, 2.0, 10_000));
        policies.insert(ErrorKind::DocumentStore, RetryPolicy::retry(3, 1.5, 15_000));
        for kind in [
            ErrorKind::Validation,
            ErrorKind::Deserialization,
            ErrorKind::Reference,
            ErrorKind::Category,
            ErrorKind::CircuitOpen,
            ErrorKind::Cancelled,
            ErrorKind::Config,
            ErrorKind::Internal,
        ] {
            policies.insert(kind, RetryPolicy::never());
        }
        Self {
            policies,
            fallback: RetryPolicy::conservative(),
        }
    }
}

impl RetryPolicies {
    /// A table with no entries; every kind uses the fallback policy.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
            fallback: RetryPolicy::conservative(),
        }
    }

    /// Sets the policy for one kind.
    #[must_use]
    pub fn with_policy(mut self, kind: ErrorKind, policy: RetryPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    /// Sets the policy used for kinds without an entry.
    #[must_use]
    pub fn with_fallback(mut self, policy: RetryPolicy) -> Self {
        self.fallback = policy;
        self
    }

    /// Returns the policy that applies to `kind`.
    #[must_use]
    pub fn policy_for(&self, kind: ErrorKind) -> &RetryPolicy {
        self.policies.get(&kind).unwrap_or(&self.fallback)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Executes operations under bounded attempts with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
    policies: RetryPolicies,
    metrics: Arc<ResilienceMetrics>,
}

impl RetryManager {
    /// Creates a manager with the default policy table.
    #[must_use]
    pub fn new(config: RetryConfig, metrics: Arc<ResilienceMetrics>) -> Self {
        Self {
            config,
            policies: RetryPolicies::default(),
            metrics,
        }
    }

    /// Replaces the policy table.
    #[must_use]
    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// The global bounds.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The policy table.
    #[must_use]
    pub const fn policies(&self) -> &RetryPolicies {
        &self.policies
    }

    /// The shared metrics handle.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<ResilienceMetrics> {
        &self.metrics
    }

    /// Attempt budget for `policy`, bounded by the global maximum.
    #[must_use]
    pub fn max_attempts_for(&self, policy: &RetryPolicy) -> u32 {
        self.config.max_attempts.min(policy.max_attempts).max(1)
    }

    /// The delay ceiling for `policy` in milliseconds.
    #[must_use]
    pub fn ceiling_ms(&self, policy: &RetryPolicy) -> u64 {
        self.config.max_delay_ms.min(policy.max_delay_ms)
    }

    /// Delay before retrying after failed attempt `attempt` (1-based),
    /// without jitter. Non-decreasing in `attempt` and never above the ceiling.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn base_delay(&self, attempt: u32, policy: &RetryPolicy) -> Duration {
        let base = self.config.base_delay_ms as f64;
        let ceiling = self.ceiling_ms(policy);
        let step = attempt.max(1);

        let raw = match policy.strategy {
            BackoffStrategy::Exponential => {
                let exponent = i32::try_from(step - 1).unwrap_or(i32::MAX);
                base * policy.backoff_factor.max(1.0).powi(exponent)
            }
            BackoffStrategy::Linear => base * f64::from(step),
            BackoffStrategy::Constant => base,
        };

        let delay_ms = if raw.is_finite() {
            raw.min(ceiling as f64) as u64
        } else {
            ceiling
        };
        Duration::from_millis(delay_ms.min(ceiling))
    }

    /// [`Self::base_delay`] with symmetric jitter applied, clamped to the ceiling.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn jittered_delay(&self, attempt: u32, policy: &RetryPolicy) -> Duration {
        let delay = self.base_delay(attempt, policy).as_millis() as f64;
        let spread = delay * self.config.jitter_factor;
        if spread < 1.0 {
            return Duration::from_millis(delay as u64);
        }

        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let jittered = (delay + offset).max(0.0) as u64;
        Duration::from_millis(jittered.min(self.ceiling_ms(policy)))
    }

    /// Decides what to do after attempt `attempt` failed with `err`.
    #[must_use]
    pub fn decide(&self, err: &StateError, attempt: u32) -> RetryDecision {
        let policy = self.policies.policy_for(err.kind());
        if !policy.retryable || !err.is_retryable() {
            return RetryDecision::NotRetryable;
        }
        if attempt >= self.max_attempts_for(policy) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.jittered_delay(attempt, policy))
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of attempts.
    pub async fn execute<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, StateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StateError>>,
    {
        self.execute_with(operation, None, None, op).await
    }

    /// Like [`Self::execute`], aborting as soon as `cancel` fires.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, StateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StateError>>,
    {
        self.execute_with(operation, None, Some(cancel), op).await
    }

    /// Runs every attempt through `breaker`; an open breaker ends the loop
    /// with [`StateError::CircuitOpen`].
    pub async fn execute_guarded<T, F, Fut>(
        &self,
        operation: &str,
        breaker: &CircuitBreaker,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> Result<T, StateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StateError>>,
    {
        self.execute_with(operation, Some(breaker), cancel, op).await
    }

    /// Runs `op` with an optional breaker around every attempt and an
    /// optional cancellation token checked between attempts.
    pub async fn execute_with<T, F, Fut>(
        &self,
        operation: &str,
        breaker: Option<&CircuitBreaker>,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, StateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StateError>>,
    {
        let mut attempt: u32 = 1;

        loop {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(self.cancelled(operation, token, attempt));
                }
            }

            self.metrics.record_attempt();
            let result = match breaker {
                Some(breaker) => breaker.execute(&mut op).await,
                None => op().await,
            };

            let err = match result {
                Ok(value) => {
                    self.metrics.record_success();
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            self.metrics.record_failure(err.kind());
            match self.decide(&err, attempt) {
                RetryDecision::NotRetryable => {
                    debug!(
                        operation,
                        attempt,
                        error_kind = %err.kind(),
                        error = %err,
                        "Error not retryable"
                    );
                    return Err(err);
                }
                RetryDecision::GiveUp => {
                    self.metrics.record_exhausted();
                    error!(
                        operation,
                        attempts = attempt,
                        error_kind = %err.kind(),
                        error = %err,
                        "Retry attempts exhausted"
                    );
                    return Err(err);
                }
                RetryDecision::Retry(delay) => {
                    self.metrics.record_retry(delay);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error_kind = %err.kind(),
                        error = %err,
                        "Retrying after error"
                    );

                    match cancel {
                        Some(token) => {
                            tokio::select! {
                                () = tokio::time::sleep(delay) => {}
                                () = token.cancelled() => {
                                    return Err(self.cancelled(operation, token, attempt));
                                }
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                }
            }

            attempt += 1;
        }
    }

    fn cancelled(&self, operation: &str, token: &CancellationToken, attempt: u32) -> StateError {
        self.metrics.record_cancelled();
        let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
        debug!(operation, attempt, reason = %reason, "Retry loop cancelled");
        StateError::cancelled(operation, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager(config: RetryConfig) -> RetryManager {
        RetryManager::new(config, Arc::new(ResilienceMetrics::new()))
    }

    fn transient() -> StateError {
        StateError::object_store("put_object", "state", "k", "slow down")
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_base_delay_ms(500)
            .with_max_delay_ms(10_000)
            .with_jitter_factor(3.0);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 10_000);
        assert!((config.jitter_factor - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_policies() {
        let policies = RetryPolicies::default();
        assert!(policies.policy_for(ErrorKind::ObjectStore).retryable);
        assert!(policies.policy_for(ErrorKind::Timeout).retryable);
        assert!(policies.policy_for(ErrorKind::DocumentStore).retryable);
        for kind in [
            ErrorKind::Validation,
            ErrorKind::Deserialization,
            ErrorKind::Reference,
            ErrorKind::Category,
            ErrorKind::CircuitOpen,
            ErrorKind::Internal,
        ] {
            assert!(!policies.policy_for(kind).retryable, "{kind} should not retry");
        }
    }

    #[test]
    fn test_unconfigured_kind_uses_conservative_budget() {
        let policies = RetryPolicies::empty();
        assert_eq!(policies.policy_for(ErrorKind::ObjectStore).max_attempts, 2);
    }

    #[test]
    fn test_exponential_delay_no_jitter() {
        let manager = manager(RetryConfig::new().with_base_delay_ms(100).with_jitter_factor(0.0));
        let policy = RetryPolicy::retry(10, 2.0, 30_000);

        assert_eq!(manager.base_delay(1, &policy), Duration::from_millis(100));
        assert_eq!(manager.base_delay(2, &policy), Duration::from_millis(200));
        assert_eq!(manager.base_delay(3, &policy), Duration::from_millis(400));
        assert_eq!(manager.jittered_delay(3, &policy), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_and_constant_delay() {
        let manager = manager(RetryConfig::new().with_base_delay_ms(100));
        let linear = RetryPolicy::retry(10, 2.0, 30_000).with_strategy(BackoffStrategy::Linear);
        let constant = RetryPolicy::retry(10, 2.0, 30_000).with_strategy(BackoffStrategy::Constant);

        assert_eq!(manager.base_delay(3, &linear), Duration::from_millis(300));
        assert_eq!(manager.base_delay(5, &constant), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_monotonic_and_capped() {
        let manager = manager(
            RetryConfig::new()
                .with_base_delay_ms(1_000)
                .with_max_delay_ms(5_000),
        );
        let policy = RetryPolicy::retry(100, 2.0, 20_000);

        let mut previous = Duration::ZERO;
        for attempt in 1..=80 {
            let delay = manager.base_delay(attempt, &policy);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(5_000));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(5_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let manager = manager(
            RetryConfig::new()
                .with_base_delay_ms(1_000)
                .with_max_delay_ms(1_500),
        );
        let policy = RetryPolicy::retry(10, 2.0, 30_000);

        for _ in 0..200 {
            let first = manager.jittered_delay(1, &policy).as_millis();
            assert!((800..=1_200).contains(&first));
            let capped = manager.jittered_delay(4, &policy).as_millis();
            assert!((1_200..=1_500).contains(&capped));
        }
    }

    #[test]
    fn test_decide() {
        let manager = manager(RetryConfig::new().with_max_attempts(3));

        assert!(matches!(manager.decide(&transient(), 1), RetryDecision::Retry(_)));
        assert!(matches!(manager.decide(&transient(), 2), RetryDecision::Retry(_)));
        assert_eq!(manager.decide(&transient(), 3), RetryDecision::GiveUp);
        assert_eq!(
            manager.decide(&StateError::validation("op", "bad"), 1),
            RetryDecision::NotRetryable
        );

        let denied = StateError::ObjectStore {
            operation: "get_object".to_string(),
            bucket: "state".to_string(),
            key: "k".to_string(),
            message: "AccessDenied".to_string(),
            access_denied: true,
            not_found: false,
        };
        assert_eq!(manager.decide(&denied, 1), RetryDecision::NotRetryable);
    }

    #[test]
    fn test_global_bound_caps_policy_budget() {
        let manager = manager(RetryConfig::new().with_max_attempts(5));
        let timeout = StateError::timeout("get_object", 10);
        assert!(matches!(manager.decide(&timeout, 1), RetryDecision::Retry(_)));
        assert_eq!(manager.decide(&timeout, 2), RetryDecision::GiveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let manager = manager(RetryConfig::new().with_max_attempts(3));
        let calls = &AtomicU32::new(0);

        let result = manager
            .execute("put_object", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let snapshot = manager.metrics().snapshot();
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_invoked_once() {
        let manager = manager(RetryConfig::new().with_max_attempts(3));
        let calls = &AtomicU32::new(0);

        let err = manager
            .execute("get_object", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StateError::deserialization("get_object", "expected object"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Deserialization);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let manager = manager(RetryConfig::new().with_max_attempts(3));
        let calls = &AtomicU32::new(0);

        let err = manager
            .execute("put_object", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<(), _>(StateError::object_store("put_object", "state", "k", format!("failure {n}")))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.kind(), ErrorKind::ObjectStore);
        assert!(err.to_string().contains("failure 3"));
        assert_eq!(manager.metrics().snapshot().exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let manager = manager(
            RetryConfig::new()
                .with_max_attempts(3)
                .with_base_delay_ms(10_000),
        );
        let token = Arc::new(CancellationToken::new());
        let calls = &AtomicU32::new(0);

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                token.cancel("deadline reached");
            })
        };

        let err = manager
            .execute_cancellable("put_object", &token, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(transient())
            })
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(err.to_string().contains("deadline reached"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let manager = manager(RetryConfig::new());
        let token = CancellationToken::new();
        token.cancel("shutdown");
        let calls = &AtomicU32::new(0);

        let err = manager
            .execute_cancellable("get_object", &token, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_stops_at_open_breaker() {
        let metrics = Arc::new(ResilienceMetrics::new());
        let manager = RetryManager::new(RetryConfig::new().with_max_attempts(3), metrics.clone());
        let breaker = CircuitBreaker::new("object-store", CircuitBreakerConfig::new(2, 60_000))
            .with_metrics(metrics.clone());
        let calls = &AtomicU32::new(0);

        let err = manager
            .execute_guarded("get_object", &breaker, None, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(transient())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CircuitOpen);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(metrics.breaker_rejections(), 1);
    }
}

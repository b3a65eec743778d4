//! Counters for retry and circuit breaker activity.

use crate::errors::ErrorKind;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Resilience counters shared by the retry manager and circuit breakers of
/// one stage invocation.
///
/// Created by the stage entry point and handed out as an `Arc`.
#[derive(Debug, Default)]
pub struct ResilienceMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
    cancelled: AtomicU64,
    total_delay_ms: AtomicU64,
    breaker_rejections: AtomicU64,
    failures_by_kind: DashMap<ErrorKind, u64>,
}

impl ResilienceMetrics {
    /// Creates an empty set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one invocation of a guarded operation.
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful operation.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed attempt of the given kind.
    pub fn record_failure(&self, kind: ErrorKind) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
    }

    /// Records a scheduled retry and its backoff delay.
    pub fn record_retry(&self, delay: Duration) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.total_delay_ms.fetch_add(delay_ms, Ordering::Relaxed);
    }

    /// Records an operation that ran out of attempts.
    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an operation aborted by cancellation.
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a call rejected by an open circuit breaker.
    pub fn record_rejection(&self) {
        self.breaker_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of attempts.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Returns the number of retries scheduled.
    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Returns the number of breaker rejections.
    #[must_use]
    pub fn breaker_rejections(&self) -> u64 {
        self.breaker_rejections.load(Ordering::Relaxed)
    }

    /// Returns the failure count for one kind.
    #[must_use]
    pub fn failures_of(&self, kind: ErrorKind) -> u64 {
        self.failures_by_kind.get(&kind).map_or(0, |count| *count)
    }

    /// Takes a consistent-enough copy of every counter.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let retries = self.retries.load(Ordering::Relaxed);
        let total_delay_ms = self.total_delay_ms.load(Ordering::Relaxed);

        let ratio = |part: u64, whole: u64| {
            if whole == 0 {
                0.0
            } else {
                part as f64 / whole as f64
            }
        };

        MetricsSnapshot {
            attempts,
            successes,
            failures: self.failures.load(Ordering::Relaxed),
            retries,
            exhausted: self.exhausted.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            total_delay_ms,
            breaker_rejections: self.breaker_rejections.load(Ordering::Relaxed),
            failures_by_kind: self
                .failures_by_kind
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
            retry_rate: ratio(retries, attempts),
            success_rate: ratio(successes, attempts),
            average_delay_ms: ratio(total_delay_ms, retries),
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.attempts,
            &self.successes,
            &self.failures,
            &self.retries,
            &self.exhausted,
            &self.cancelled,
            &self.total_delay_ms,
            &self.breaker_rejections,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.failures_by_kind.clear();
    }
}

/// Point-in-time view of [`ResilienceMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Operation invocations.
    pub attempts: u64,
    /// Successful invocations.
    pub successes: u64,
    /// Failed invocations.
    pub failures: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Operations that ran out of attempts.
    pub exhausted: u64,
    /// Operations aborted by cancellation.
    pub cancelled: u64,
    /// Sum of all backoff delays.
    pub total_delay_ms: u64,
    /// Calls rejected by an open breaker.
    pub breaker_rejections: u64,
    /// Failures grouped by kind.
    pub failures_by_kind: BTreeMap<ErrorKind, u64>,
    /// Retries per attempt.
    pub retry_rate: f64,
    /// Successes per attempt.
    pub success_rate: f64,
    /// Mean backoff delay per retry.
    pub average_delay_ms: f64,
}

impl MetricsSnapshot {
    /// Converts the snapshot to a JSON value.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_has_zero_rates() {
        let snapshot = ResilienceMetrics::new().snapshot();
        assert_eq!(snapshot.attempts, 0);
        assert!(snapshot.retry_rate.abs() < f64::EPSILON);
        assert!(snapshot.success_rate.abs() < f64::EPSILON);
        assert!(snapshot.average_delay_ms.abs() < f64::EPSILON);
    }

    #[test]
    fn test_rates() {
        let metrics = ResilienceMetrics::new();
        for _ in 0..4 {
            metrics.record_attempt();
        }
        metrics.record_failure(ErrorKind::ObjectStore);
        metrics.record_failure(ErrorKind::ObjectStore);
        metrics.record_failure(ErrorKind::Timeout);
        metrics.record_retry(Duration::from_millis(100));
        metrics.record_retry(Duration::from_millis(300));
        metrics.record_success();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failures, 3);
        assert_eq!(snapshot.failures_by_kind[&ErrorKind::ObjectStore], 2);
        assert_eq!(metrics.failures_of(ErrorKind::Timeout), 1);
        assert_eq!(metrics.failures_of(ErrorKind::Validation), 0);
        assert!((snapshot.retry_rate - 0.5).abs() < f64::EPSILON);
        assert!((snapshot.success_rate - 0.25).abs() < f64::EPSILON);
        assert!((snapshot.average_delay_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = ResilienceMetrics::new();
        metrics.record_attempt();
        metrics.record_rejection();
        metrics.record_failure(ErrorKind::Internal);
        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(snapshot.breaker_rejections, 0);
        assert!(snapshot.failures_by_kind.is_empty());
    }

    #[test]
    fn test_to_dict_uses_kind_names() {
        let metrics = ResilienceMetrics::new();
        metrics.record_failure(ErrorKind::DocumentStore);
        let dict = metrics.snapshot().to_dict();
        assert_eq!(dict["failures_by_kind"]["DocumentStoreError"], 1);
    }
}

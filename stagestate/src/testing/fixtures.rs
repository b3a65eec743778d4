//! Test fixtures for state manager tests.

use chrono::NaiveDate;
use std::sync::Arc;

use super::mocks::ScriptedObjectStore;
use crate::core::Reference;
use crate::envelope::{status, Envelope};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceMetrics, RetryConfig, RetryManager};
use crate::state::{FixedClock, StateManager};

/// Bucket used by fixtures.
pub const TEST_BUCKET: &str = "test-state";

/// The date every fixture clock reports: 2025-06-01.
#[must_use]
pub fn fixed_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default()
}

/// Retry settings with short delays and no jitter.
#[must_use]
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .with_max_attempts(3)
        .with_base_delay_ms(10)
        .with_max_delay_ms(100)
        .with_jitter_factor(0.0)
}

/// An envelope for `verif-test` holding one image reference.
#[must_use]
pub fn sample_envelope() -> Envelope {
    let Ok(mut envelope) = Envelope::new("verif-test") else {
        unreachable!("run id is not empty")
    };
    envelope.add_reference(
        "images_metadata",
        Reference::with_size(TEST_BUCKET, "2025/06/01/verif-test/images/metadata.json", 64),
    );
    envelope.set_status(status::IMAGES_FETCHED);
    envelope
}

/// A scripted store, shared metrics and a state manager over them.
#[derive(Debug)]
pub struct TestFixture {
    /// The backing store.
    pub store: Arc<ScriptedObjectStore>,
    /// Metrics shared by retry manager and breaker.
    pub metrics: Arc<ResilienceMetrics>,
    /// Manager writing to [`TEST_BUCKET`] on [`fixed_date`].
    pub state: StateManager,
}

impl TestFixture {
    /// Creates a fixture without a circuit breaker.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(ScriptedObjectStore::new());
        let metrics = Arc::new(ResilienceMetrics::new());
        let state = Self::manager(store.clone(), metrics.clone());
        Self { store, metrics, state }
    }

    /// Creates a fixture whose manager is guarded by a breaker.
    #[must_use]
    pub fn with_breaker(max_failures: u32, reset_timeout_ms: u64) -> (Self, Arc<CircuitBreaker>) {
        let fixture = Self::new();
        let breaker = Arc::new(
            CircuitBreaker::new("object-store", CircuitBreakerConfig::new(max_failures, reset_timeout_ms))
                .with_metrics(fixture.metrics.clone()),
        );
        let state = Self::manager(fixture.store.clone(), fixture.metrics.clone()).with_breaker(breaker.clone());
        (Self { state, ..fixture }, breaker)
    }

    fn manager(store: Arc<ScriptedObjectStore>, metrics: Arc<ResilienceMetrics>) -> StateManager {
        match StateManager::new(store, TEST_BUCKET, RetryManager::new(fast_retry(), metrics)) {
            Ok(state) => state.with_clock(Arc::new(FixedClock::new(fixed_date()))),
            Err(_) => unreachable!("fixture bucket is not empty"),
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

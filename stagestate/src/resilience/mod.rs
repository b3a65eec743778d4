//! Retry and circuit breaker primitives.
//!
//! - [`RetryManager`]: bounded attempts with per-kind policies and backoff
//! - [`CircuitBreaker`]: closed/open/half-open guard for one dependency
//! - [`ResilienceMetrics`]: counters shared by both, owned by the stage entry point

mod circuit_breaker;
mod metrics;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use metrics::{MetricsSnapshot, ResilienceMetrics};
pub use retry::{
    BackoffStrategy, RetryConfig, RetryDecision, RetryManager, RetryPolicies, RetryPolicy,
};

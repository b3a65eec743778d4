//! # Stagestate
//!
//! Object-store backed state passing for multi-stage processing pipelines.
//!
//! Each stage of a run receives a small [`Envelope`](envelope::Envelope) of
//! named references, loads the data it needs from the object store, writes
//! its own artifacts and hands an enriched envelope to the next stage:
//!
//! - **References and keys**: every artifact lives at
//!   `{YYYY}/{MM}/{DD}/{runId}/{category}/{filename}`
//! - **State manager**: typed store/retrieve of JSON, bytes and Base64 images
//! - **Accumulation**: references from earlier stages are never dropped
//! - **Resilience**: per-error-kind retry policies with jittered backoff and
//!   a circuit breaker in front of the store
//! - **Cancellation**: pending backoff sleeps abort when the run is cancelled
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagestate::prelude::*;
//!
//! let config = StateConfig::from_env()?;
//! init_logging(&config.logging);
//!
//! let runtime = StageRuntime::new(Arc::new(InMemoryObjectStore::new()), config)?;
//! let output = runtime.invoke(&my_stage, &input_bytes).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod accumulator;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod envelope;
pub mod errors;
pub mod observability;
pub mod resilience;
pub mod stage;
pub mod state;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::accumulator::{AccumulationReport, ReferenceAccumulator};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{StateConfig, ThinkingMode};
    pub use crate::core::{generate_key, parse_key, reference_name, Category, ParsedKey, Reference};
    pub use crate::envelope::{status, Envelope};
    pub use crate::errors::{ErrorKind, ErrorReport, StateError};
    pub use crate::observability::{init_logging, LogFormat, LoggingConfig};
    pub use crate::resilience::{
        CircuitBreaker, CircuitBreakerConfig, CircuitState, ResilienceMetrics, RetryConfig,
        RetryManager, RetryPolicies, RetryPolicy,
    };
    pub use crate::stage::{Stage, StageFailure, StageRuntime};
    pub use crate::state::{Clock, StateManager, SystemClock};
    pub use crate::store::{
        DocumentStore, InMemoryDocumentStore, InMemoryObjectStore, ObjectStore, StoreError,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::testing::{fixed_date, SavingStage};
    use crate::state::FixedClock;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_two_stages_accumulate() {
        let runtime = StageRuntime::new(Arc::new(InMemoryObjectStore::new()), StateConfig::new("state"))
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(fixed_date())));

        let initialize = SavingStage::new(
            "initialize",
            Category::Processing,
            "initialization.json",
            serde_json::json!({"verificationType": "LAYOUT_VS_CHECKING"}),
        )
        .with_status(status::VERIFICATION_INITIALIZED);
        let prompt = SavingStage::new(
            "prepare_system_prompt",
            Category::Prompts,
            "system-prompt.json",
            serde_json::json!({"text": "..."}),
        )
        .with_status(status::PROMPT_PREPARED);

        let first = Envelope::new(Envelope::generate_run_id()).unwrap();
        let (second, _) = runtime.run(&initialize, &first).await.unwrap();
        let (third, report) = runtime.run(&prompt, &second).await.unwrap();

        assert!(third.has_reference("processing_initialization"));
        assert!(third.has_reference("prompts_system_prompt"));
        assert_eq!(third.status(), status::PROMPT_PREPARED);
        assert_eq!(report.total, 2);

        let config: serde_json::Value = runtime
            .state()
            .retrieve_structured(third.get_reference("processing_initialization").unwrap())
            .await
            .unwrap();
        assert_eq!(config["verificationType"], "LAYOUT_VS_CHECKING");
    }
}

//! Entry point owning the resilience objects of one stage process.

use super::Stage;
use crate::accumulator::{AccumulationReport, ReferenceAccumulator};
use crate::cancellation::CancellationToken;
use crate::config::StateConfig;
use crate::envelope::Envelope;
use crate::errors::{ErrorKind, ErrorReport, StateError};
use crate::observability::{RunSpanAttributes, SpanTimer};
use crate::resilience::{CircuitBreaker, MetricsSnapshot, ResilienceMetrics, RetryManager};
use crate::state::{Clock, StateManager};
use crate::store::{DocumentStore, ObjectStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};

/// A failed stage invocation as reported to the orchestrator.
///
/// Carries the error kind and message only.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("stage '{stage}' failed: {}", .report.error_message)]
pub struct StageFailure {
    /// The failing stage.
    pub stage: String,
    /// The run, when the input envelope could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// The rendered error.
    #[serde(flatten)]
    pub report: ErrorReport,
}

impl StageFailure {
    /// Renders `err` for `stage`.
    #[must_use]
    pub fn new(stage: impl Into<String>, run_id: Option<String>, err: &StateError) -> Self {
        Self {
            stage: stage.into(),
            run_id,
            report: err.report(),
        }
    }

    /// The error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.report.error_type
    }
}

/// Owns metrics, breaker, retry manager and state manager for one stage
/// process, and runs stages against envelopes.
#[derive(Debug)]
pub struct StageRuntime {
    config: StateConfig,
    metrics: Arc<ResilienceMetrics>,
    breaker: Arc<CircuitBreaker>,
    cancel: Arc<CancellationToken>,
    state: StateManager,
    accumulator: ReferenceAccumulator,
}

impl StageRuntime {
    /// Builds the runtime from a validated configuration.
    pub fn new(store: Arc<dyn ObjectStore>, config: StateConfig) -> Result<Self, StateError> {
        config.validate()?;

        let metrics = Arc::new(ResilienceMetrics::new());
        let breaker = Arc::new(
            CircuitBreaker::new("object-store", config.breaker.clone()).with_metrics(metrics.clone()),
        );
        let cancel = Arc::new(CancellationToken::new());
        let retry = RetryManager::new(config.retry.clone(), metrics.clone());
        let state = StateManager::new(store, config.bucket.clone(), retry)?
            .with_breaker(breaker.clone())
            .with_cancellation(cancel.clone())
            .with_timeouts(config.load_timeout(), config.save_timeout());

        Ok(Self {
            config,
            metrics,
            breaker,
            cancel,
            state,
            accumulator: ReferenceAccumulator::new(),
        })
    }

    /// Attaches the document store for run metadata.
    ///
    /// Ignored with a warning when no verification table is configured.
    #[must_use]
    pub fn with_document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        match self.config.verification_table.clone() {
            Some(table) => self.state = self.state.with_document_store(store, table),
            None => warn!("Document store supplied without a verification table; run metadata disabled"),
        }
        self
    }

    /// Replaces the date source of the state manager.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state = self.state.with_clock(clock);
        self
    }

    /// The loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &StateConfig {
        &self.config
    }

    /// The state manager handed to stages.
    #[must_use]
    pub const fn state(&self) -> &StateManager {
        &self.state
    }

    /// The object store breaker.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The shared metrics handle.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<ResilienceMetrics> {
        &self.metrics
    }

    /// The token that aborts in-flight retries.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Cancels in-flight and future store operations.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    /// Current resilience counters.
    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs `stage` against a copy of `received` and merges the result.
    pub async fn run(
        &self,
        stage: &dyn Stage,
        received: &Envelope,
    ) -> Result<(Envelope, AccumulationReport), StateError> {
        let span = RunSpanAttributes::new()
            .with_run_id(received.run_id())
            .with_stage_name(stage.name())
            .with_bucket(self.state.bucket())
            .with_status(received.status())
            .span();

        async {
            received.validate()?;
            let timer = SpanTimer::start(stage.name());

            let mut produced = received.clone();
            if let Err(err) = stage.execute(&self.state, &mut produced).await {
                error!(
                    stage = stage.name(),
                    run_id = received.run_id(),
                    error_kind = %err.kind(),
                    error = %err,
                    "Stage failed"
                );
                return Err(err);
            }

            let (merged, report) = self.accumulator.accumulate(received, &produced);
            merged.validate()?;

            info!(
                stage = stage.name(),
                run_id = merged.run_id(),
                status = merged.status(),
                total_references = report.total,
                added = report.added,
                overwritten = report.overwritten,
                duration_ms = timer.elapsed_ms(),
                "Stage completed"
            );
            Ok::<_, StateError>((merged, report))
        }
        .instrument(span)
        .await
    }

    /// Decodes `input`, runs `stage` and encodes the merged envelope.
    pub async fn invoke(&self, stage: &dyn Stage, input: &[u8]) -> Result<Vec<u8>, StageFailure> {
        let received =
            Envelope::load_bytes(input).map_err(|e| StageFailure::new(stage.name(), None, &e))?;
        let run_id = Some(received.run_id().to_string());

        let (merged, _) = self
            .run(stage, &received)
            .await
            .map_err(|e| StageFailure::new(stage.name(), run_id.clone(), &e))?;
        merged
            .to_bytes()
            .map_err(|e| StageFailure::new(stage.name(), run_id, &e))
    }

    /// Like [`Self::invoke`], for an already-parsed JSON payload.
    pub async fn invoke_value(
        &self,
        stage: &dyn Stage,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, StageFailure> {
        let received = Envelope::load(input).map_err(|e| StageFailure::new(stage.name(), None, &e))?;
        let run_id = Some(received.run_id().to_string());

        let (merged, _) = self
            .run(stage, &received)
            .await
            .map_err(|e| StageFailure::new(stage.name(), run_id.clone(), &e))?;
        serde_json::to_value(&merged).map_err(|e| {
            StageFailure::new(
                stage.name(),
                run_id,
                &StateError::internal("encode_envelope", e.to_string()),
            )
        })
    }

    /// Records a metadata document for the run.
    ///
    /// This is auxiliary work: a failure is logged and `false` returned.
    pub async fn record_run_metadata(&self, envelope: &Envelope) -> bool {
        let mut names: Vec<&String> = envelope.references().keys().collect();
        names.sort();
        let document = serde_json::json!({
            "verificationId": envelope.run_id(),
            "status": envelope.status(),
            "referenceCount": names.len(),
            "references": names,
            "updatedAt": Utc::now().to_rfc3339(),
        });

        match self.state.record_document(envelope.run_id(), document).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    run_id = envelope.run_id(),
                    error_kind = %err.kind(),
                    error = %err,
                    "Failed to record run metadata, continuing"
                );
                false
            }
        }
    }
}

//! Span attributes and timing for stage invocations.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Attributes attached to the span of one stage invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSpanAttributes {
    /// Run (verification) ID.
    pub run_id: Option<String>,
    /// Stage name.
    pub stage_name: Option<String>,
    /// State bucket.
    pub bucket: Option<String>,
    /// Envelope status on entry.
    pub status: Option<String>,
}

impl RunSpanAttributes {
    /// Creates empty attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run ID.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_stage_name(mut self, name: impl Into<String>) -> Self {
        self.stage_name = Some(name.into());
        self
    }

    /// Sets the state bucket.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Sets the envelope status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Opens an info-level span carrying these attributes.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "stage_invocation",
            run_id = self.run_id.as_deref().unwrap_or_default(),
            stage = self.stage_name.as_deref().unwrap_or_default(),
            bucket = self.bucket.as_deref().unwrap_or_default(),
            status = self.status.as_deref().unwrap_or_default(),
        )
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

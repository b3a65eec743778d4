//! Stage trait and the per-invocation runtime.
//!
//! A stage receives an [`Envelope`], reads the state it needs through the
//! [`StateManager`], writes what it produces and forwards the envelope.

mod runtime;

use crate::envelope::Envelope;
use crate::errors::StateError;
use crate::state::StateManager;
use async_trait::async_trait;
use std::fmt::Debug;

pub use runtime::{StageFailure, StageRuntime};

/// Trait for pipeline stages.
///
/// `envelope` is the stage's own copy; the runtime merges it with the
/// received envelope afterwards, so a stage only adds what it produced.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage against its copy of the envelope.
    async fn execute(&self, state: &StateManager, envelope: &mut Envelope) -> Result<(), StateError>;
}

//! Testing utilities for state-passing stages.
//!
//! This module provides:
//! - Scriptable object and document stores with failure injection
//! - Mock stages
//! - Fixtures and assertions for envelopes and errors

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_error_kind, assert_has_reference, assert_status};
pub use fixtures::{fast_retry, fixed_date, sample_envelope, TestFixture, TEST_BUCKET};
pub use mocks::{FailingStage, SavingStage, ScriptedDocumentStore, ScriptedObjectStore};

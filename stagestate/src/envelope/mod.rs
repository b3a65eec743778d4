//! State envelope passed between pipeline stages.
//!
//! An envelope aggregates the named references a run has produced so far,
//! a status label and a summary map. It is small enough to travel inline
//! through the orchestrator; the data it points at lives in the object store.

mod model;
pub mod status;

pub use model::Envelope;

//! Well-known status labels written by pipeline stages.
//!
//! The status is a free-form string on the wire; these are the values the
//! verification workflow uses.

/// Envelope created, nothing stored yet.
pub const INITIALIZED: &str = "INITIALIZED";
/// Verification request accepted.
pub const VERIFICATION_REQUESTED: &str = "VERIFICATION_REQUESTED";
/// Initialization record stored.
pub const VERIFICATION_INITIALIZED: &str = "VERIFICATION_INITIALIZED";
/// Images are being fetched.
pub const FETCHING_IMAGES: &str = "FETCHING_IMAGES";
/// Images stored.
pub const IMAGES_FETCHED: &str = "IMAGES_FETCHED";
/// System prompt stored.
pub const PROMPT_PREPARED: &str = "PROMPT_PREPARED";
/// First-turn prompt stored.
pub const TURN1_PROMPT_READY: &str = "TURN1_PROMPT_READY";
/// First-turn response stored.
pub const TURN1_COMPLETED: &str = "TURN1_COMPLETED";
/// First-turn response processed.
pub const TURN1_PROCESSED: &str = "TURN1_PROCESSED";
/// Second-turn prompt stored.
pub const TURN2_PROMPT_READY: &str = "TURN2_PROMPT_READY";
/// Second-turn response stored.
pub const TURN2_COMPLETED: &str = "TURN2_COMPLETED";
/// Second-turn response processed.
pub const TURN2_PROCESSED: &str = "TURN2_PROCESSED";
/// Final results computed.
pub const RESULTS_FINALIZED: &str = "RESULTS_FINALIZED";
/// Final results stored.
pub const RESULTS_STORED: &str = "RESULTS_STORED";
/// Run completed.
pub const COMPLETED: &str = "COMPLETED";
/// Initialization failed.
pub const INITIALIZATION_FAILED: &str = "INITIALIZATION_FAILED";
/// Image fetch failed.
pub const IMAGE_FETCH_FAILED: &str = "IMAGE_FETCH_FAILED";
/// The run failed.
pub const VERIFICATION_FAILED: &str = "VERIFICATION_FAILED";

/// Returns true for the terminal failure labels.
#[must_use]
pub fn is_failure(status: &str) -> bool {
    status.ends_with("_FAILED")
}

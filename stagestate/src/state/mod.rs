//! Object-store backed state management.
//!
//! [`StateManager`] turns typed values into stored objects and references,
//! and references back into typed values.

mod clock;
mod manager;

pub use clock::{Clock, FixedClock, SystemClock};
pub use manager::{StateManager, BASE64_CONTENT_TYPE, BINARY_CONTENT_TYPE, JSON_CONTENT_TYPE};

//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is shared between a stage entry point and the
//! retry loops it drives; cancelling it aborts any pending backoff sleep.

mod token;

pub use token::CancellationToken;

//! Logging setup and span helpers.

mod logging;
mod spans;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use spans::{RunSpanAttributes, SpanTimer};

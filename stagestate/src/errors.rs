//! Error types for stagestate.
//!
//! Every fallible operation in the crate returns [`StateError`]. Each variant
//! belongs to exactly one [`ErrorKind`], and the kind drives retry decisions
//! in [`crate::resilience::RetryManager`].

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The closed error taxonomy used for classification and retry policy lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed envelope, reference, key or category input.
    #[serde(rename = "ValidationError")]
    Validation,
    /// Read or write failure against the backing object store.
    #[serde(rename = "ObjectStoreError")]
    ObjectStore,
    /// Stored content does not match the expected shape.
    #[serde(rename = "DeserializationError")]
    Deserialization,
    /// Structural misuse of a reference.
    #[serde(rename = "ReferenceError")]
    Reference,
    /// Structural misuse of a category.
    #[serde(rename = "CategoryError")]
    Category,
    /// An operation exceeded its deadline.
    #[serde(rename = "TimeoutError")]
    Timeout,
    /// A circuit breaker rejected the call.
    #[serde(rename = "CircuitOpenError")]
    CircuitOpen,
    /// Read or write failure against the document database.
    #[serde(rename = "DocumentStoreError")]
    DocumentStore,
    /// The caller cancelled the operation.
    #[serde(rename = "CancelledError")]
    Cancelled,
    /// Invalid environment configuration.
    #[serde(rename = "ConfigError")]
    Config,
    /// Unexpected wrapped failure.
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Validation,
        Self::ObjectStore,
        Self::Deserialization,
        Self::Reference,
        Self::Category,
        Self::Timeout,
        Self::CircuitOpen,
        Self::DocumentStore,
        Self::Cancelled,
        Self::Config,
        Self::Internal,
    ];

    /// Returns the wire name of the kind (e.g. `"ObjectStoreError"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::ObjectStore => "ObjectStoreError",
            Self::Deserialization => "DeserializationError",
            Self::Reference => "ReferenceError",
            Self::Category => "CategoryError",
            Self::Timeout => "TimeoutError",
            Self::CircuitOpen => "CircuitOpenError",
            Self::DocumentStore => "DocumentStoreError",
            Self::Cancelled => "CancelledError",
            Self::Config => "ConfigError",
            Self::Internal => "InternalError",
        }
    }

    /// Whether failures of this kind are transient unless told otherwise.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::ObjectStore | Self::Timeout | Self::DocumentStore)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for state management operations.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    /// An envelope, reference or argument failed validation.
    #[error("validation failed in '{operation}': {message}")]
    Validation {
        /// The operation that failed.
        operation: String,
        /// What was wrong.
        message: String,
    },

    /// A storage key did not follow `{YYYY}/{MM}/{DD}/{runId}/{category}/{filename}`.
    #[error("malformed key '{path}': {reason}")]
    MalformedKey {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The object store failed to read or write an object.
    #[error("object store operation '{operation}' failed for s3://{bucket}/{key}: {message}")]
    ObjectStore {
        /// The operation that failed.
        operation: String,
        /// Target bucket.
        bucket: String,
        /// Target key.
        key: String,
        /// Description of the underlying failure.
        message: String,
        /// The store refused access; never retried.
        access_denied: bool,
        /// The object does not exist; never retried.
        not_found: bool,
    },

    /// Stored bytes did not deserialize into the requested shape.
    #[error("deserialization failed in '{operation}': {message}")]
    Deserialization {
        /// The operation that failed.
        operation: String,
        /// The decoder's message.
        message: String,
    },

    /// A reference was missing or structurally unusable.
    #[error("reference error in '{operation}': {message}")]
    Reference {
        /// The operation that failed.
        operation: String,
        /// What was wrong.
        message: String,
    },

    /// A category was missing or unknown.
    #[error("category error in '{operation}': {message}")]
    Category {
        /// The operation that failed.
        operation: String,
        /// What was wrong.
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// A circuit breaker is open and rejected the call without running it.
    #[error("circuit breaker '{breaker}' is open, retry after {retry_after_ms}ms")]
    CircuitOpen {
        /// Name of the guarded dependency.
        breaker: String,
        /// Remaining time until the breaker admits a trial call.
        retry_after_ms: u64,
    },

    /// The document database failed.
    #[error("document store operation '{operation}' failed for {table}/{key}: {message}")]
    DocumentStore {
        /// The operation that failed.
        operation: String,
        /// Target table.
        table: String,
        /// Target item key.
        key: String,
        /// Description of the underlying failure.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("operation '{operation}' cancelled: {reason}")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
        /// The cancellation reason.
        reason: String,
    },

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Unexpected failure.
    #[error("internal error in '{operation}': {message}")]
    Internal {
        /// The operation that failed.
        operation: String,
        /// Description of the failure.
        message: String,
    },
}

impl StateError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed key error.
    #[must_use]
    pub fn malformed_key(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a retryable object store error.
    #[must_use]
    pub fn object_store(
        operation: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ObjectStore {
            operation: operation.into(),
            bucket: bucket.into(),
            key: key.into(),
            message: message.into(),
            access_denied: false,
            not_found: false,
        }
    }

    /// Creates a deserialization error.
    #[must_use]
    pub fn deserialization(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Deserialization {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a reference error.
    #[must_use]
    pub fn reference(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reference {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a category error.
    #[must_use]
    pub fn category(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Category {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a circuit-open error.
    #[must_use]
    pub fn circuit_open(breaker: impl Into<String>, retry_after_ms: u64) -> Self {
        Self::CircuitOpen {
            breaker: breaker.into(),
            retry_after_ms,
        }
    }

    /// Creates a document store error.
    #[must_use]
    pub fn document_store(
        operation: impl Into<String>,
        table: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DocumentStore {
            operation: operation.into(),
            table: table.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Wraps an arbitrary failure as an internal error.
    #[must_use]
    pub fn wrap(operation: impl Into<String>, err: &dyn std::error::Error) -> Self {
        Self::internal(operation, err.to_string())
    }

    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::MalformedKey { .. } => ErrorKind::Validation,
            Self::ObjectStore { .. } => ErrorKind::ObjectStore,
            Self::Deserialization { .. } => ErrorKind::Deserialization,
            Self::Reference { .. } => ErrorKind::Reference,
            Self::Category { .. } => ErrorKind::Category,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::DocumentStore { .. } => ErrorKind::DocumentStore,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns the operation name attached to the error, if any.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::Validation { operation, .. }
            | Self::ObjectStore { operation, .. }
            | Self::Deserialization { operation, .. }
            | Self::Reference { operation, .. }
            | Self::Category { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::DocumentStore { operation, .. }
            | Self::Cancelled { operation, .. }
            | Self::Internal { operation, .. } => Some(operation.as_str()),
            Self::MalformedKey { .. } | Self::CircuitOpen { .. } | Self::Config(_) => None,
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Object store failures are transient unless the store denied access or
    /// the object does not exist.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ObjectStore {
                access_denied,
                not_found,
                ..
            } => !*access_denied && !*not_found,
            other => other.kind().is_transient(),
        }
    }

    /// Renders the error for callers outside the crate.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            error_type: self.kind(),
            error_message: self.to_string(),
            operation: self.operation().map(str::to_string),
            retryable: self.is_retryable(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind().as_str()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        if let Some(operation) = self.operation() {
            map.insert("operation".to_string(), serde_json::json!(operation));
        }
        map
    }
}

/// User-visible rendering of a [`StateError`].
///
/// Carries the kind and a human-readable message only; no source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// The error kind.
    pub error_type: ErrorKind,
    /// Human-readable message.
    pub error_message: String,
    /// The failing operation, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Whether the caller may try again later.
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(StateError::validation("op", "bad").kind(), ErrorKind::Validation);
        assert_eq!(
            StateError::malformed_key("a/b", "too short").kind(),
            ErrorKind::Validation
        );
        assert_eq!(StateError::timeout("op", 10).kind(), ErrorKind::Timeout);
        assert_eq!(StateError::circuit_open("s3", 5).kind(), ErrorKind::CircuitOpen);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StateError::object_store("put", "b", "k", "connection reset").is_retryable());
        assert!(StateError::timeout("get", 100).is_retryable());
        assert!(StateError::document_store("put", "t", "k", "throttled").is_retryable());

        assert!(!StateError::validation("op", "x").is_retryable());
        assert!(!StateError::deserialization("op", "x").is_retryable());
        assert!(!StateError::reference("op", "x").is_retryable());
        assert!(!StateError::category("op", "x").is_retryable());
        assert!(!StateError::circuit_open("s3", 0).is_retryable());
        assert!(!StateError::internal("op", "x").is_retryable());
        assert!(!StateError::cancelled("op", "shutdown").is_retryable());
    }

    #[test]
    fn test_access_denied_not_retryable() {
        let err = StateError::ObjectStore {
            operation: "get".to_string(),
            bucket: "b".to_string(),
            key: "k".to_string(),
            message: "AccessDenied".to_string(),
            access_denied: true,
            not_found: false,
        };
        assert_eq!(err.kind(), ErrorKind::ObjectStore);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_report_has_no_source_chain() {
        let err = StateError::object_store("put", "bucket", "2025/06/01/r/processing/a.json", "boom");
        let report = err.report();
        assert_eq!(report.error_type, ErrorKind::ObjectStore);
        assert_eq!(report.operation.as_deref(), Some("put"));
        assert!(report.retryable);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errorType"], "ObjectStoreError");
        assert!(json["errorMessage"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn test_to_dict() {
        let dict = StateError::category("parse", "unknown category: audio").to_dict();
        assert_eq!(dict.get("type").unwrap(), "CategoryError");
        assert_eq!(dict.get("operation").unwrap(), "parse");
        assert_eq!(dict.get("retryable").unwrap(), false);
    }

    #[test]
    fn test_kind_wire_names() {
        for kind in ErrorKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}

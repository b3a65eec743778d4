//! Object store port.

use crate::errors::StateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The object or item does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend refused the caller's credentials.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The backend is unreachable or throttling.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Wraps the failure as an object store error for `bucket`/`key`.
    #[must_use]
    pub fn into_object_store_error(self, operation: &str, bucket: &str, key: &str) -> StateError {
        let (access_denied, not_found) = match &self {
            Self::AccessDenied(_) => (true, false),
            Self::NotFound(_) => (false, true),
            Self::Unavailable(_) | Self::Other(_) => (false, false),
        };
        StateError::ObjectStore {
            operation: operation.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: self.to_string(),
            access_denied,
            not_found,
        }
    }

    /// Wraps the failure as a document store error for `table`/`key`.
    #[must_use]
    pub fn into_document_store_error(self, operation: &str, table: &str, key: &str) -> StateError {
        StateError::document_store(operation, table, key, self.to_string())
    }
}

/// What the store reports after a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutReceipt {
    /// Entity tag of the stored object.
    pub etag: String,
    /// Stored size in bytes.
    pub size: u64,
}

/// Get/put access to a bucketed object store.
///
/// Implementations wrap a cloud SDK client or, for tests and local runs,
/// [`super::InMemoryObjectStore`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads the whole object at `bucket`/`key`.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes `data` to `bucket`/`key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError>;
}

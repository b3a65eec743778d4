//! Pointer to one stored object.

use super::{parse_key, Category};
use crate::errors::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An immutable pointer to one object in the backing store.
///
/// Serialized as `{"bucket": ..., "key": ..., "size": ...}`. A reference is
/// valid iff both the container and the path are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "bucket")]
    container: String,
    #[serde(rename = "key")]
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

impl Reference {
    /// Creates a reference without a recorded size.
    #[must_use]
    pub fn new(container: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            path: path.into(),
            size: None,
        }
    }

    /// Creates a reference with the observed object size in bytes.
    #[must_use]
    pub fn with_size(container: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            container: container.into(),
            path: path.into(),
            size: Some(size),
        }
    }

    /// The bucket holding the object.
    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    /// The object key.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The object size in bytes, when known.
    #[must_use]
    pub const fn size(&self) -> Option<u64> {
        self.size
    }

    /// Returns true if both container and path are present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.container.is_empty() && !self.path.is_empty()
    }

    /// Like [`Self::is_valid`], but reports which field is missing.
    pub fn ensure_valid(&self, operation: &str) -> Result<(), StateError> {
        if self.container.is_empty() {
            return Err(StateError::reference(operation, "bucket name is required"));
        }
        if self.path.is_empty() {
            return Err(StateError::reference(operation, "key is required"));
        }
        Ok(())
    }

    /// The category encoded in the path, if the path is a well-formed key.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        parse_key(&self.path).ok().map(|parsed| parsed.category)
    }

    /// The filename encoded in the path, if the path is a well-formed key.
    ///
    /// Everything after the category segment, so it may contain `/`.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        parse_key(&self.path).ok().map(|parsed| parsed.filename)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.container, self.path)
    }
}

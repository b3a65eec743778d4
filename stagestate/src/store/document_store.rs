//! Document database port.

use super::StoreError;
use async_trait::async_trait;

/// Put/get access to a key-value document table.
///
/// Used by stages that persist run metadata next to the envelope.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Writes `document` under `key`, replacing any existing item.
    async fn put_document(
        &self,
        table: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Reads the item under `key`, if present.
    async fn get_document(&self, table: &str, key: &str)
        -> Result<Option<serde_json::Value>, StoreError>;
}

//! In-memory store implementations for tests and local runs.

use super::{DocumentStore, ObjectStore, PutReceipt, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use md5::{Digest, Md5};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    etag: String,
}

/// An [`ObjectStore`] backed by a concurrent map.
///
/// ETags are the hex MD5 of the object body, like a single-part upload.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<(String, String), StoredObject>,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns true if an object exists at `bucket`/`key`.
    #[must_use]
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// The content type recorded for an object.
    #[must_use]
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.content_type.clone())
    }

    /// The ETag recorded for an object.
    #[must_use]
    pub fn etag(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.etag.clone())
    }

    /// All keys in `bucket`, sorted.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Removes every object.
    pub fn clear(&self) {
        self.objects.clear();
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.data.clone())
            .ok_or_else(|| StoreError::NotFound(format!("{bucket}/{key}")))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError> {
        let etag = hex::encode(Md5::digest(&data));
        let size = data.len() as u64;
        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                etag: etag.clone(),
            },
        );
        Ok(PutReceipt { etag, size })
    }
}

/// A [`DocumentStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    items: DashMap<(String, String), serde_json::Value>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items across all tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put_document(
        &self,
        table: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.items.insert((table.to_string(), key.to_string()), document);
        Ok(())
    }

    async fn get_document(
        &self,
        table: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .items
            .get(&(table.to_string(), key.to_string()))
            .map(|item| item.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = InMemoryObjectStore::new();
        let receipt = store
            .put_object("state", "a/b.json", b"{\"x\":1}".to_vec(), "application/json")
            .await
            .unwrap();

        assert_eq!(receipt.size, 7);
        assert_eq!(receipt.etag.len(), 32);
        assert_eq!(store.etag("state", "a/b.json"), Some(receipt.etag));
        assert_eq!(store.get_object("state", "a/b.json").await.unwrap(), b"{\"x\":1}");
        assert_eq!(
            store.content_type("state", "a/b.json").as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.get_object("state", "missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let store = InMemoryObjectStore::new();
        store.put_object("one", "k", vec![1], "application/octet-stream").await.unwrap();
        store.put_object("two", "k2", vec![2], "application/octet-stream").await.unwrap();
        store.put_object("two", "k1", vec![3], "application/octet-stream").await.unwrap();

        assert!(store.contains("one", "k"));
        assert!(!store.contains("two", "k"));
        assert_eq!(store.keys("two"), vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(store.len(), 3);

        store.clear();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_document_store() {
        let store = InMemoryDocumentStore::new();
        assert!(store.get_document("runs", "verif-1").await.unwrap().is_none());

        store
            .put_document("runs", "verif-1", serde_json::json!({"status": "COMPLETED"}))
            .await
            .unwrap();
        assert_eq!(
            store.get_document("runs", "verif-1").await.unwrap(),
            Some(serde_json::json!({"status": "COMPLETED"}))
        );
        assert_eq!(store.len(), 1);
    }
}

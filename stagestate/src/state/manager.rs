//! Structured state storage behind references.

use super::{Clock, SystemClock};
use crate::cancellation::CancellationToken;
use crate::config::StateConfig;
use crate::core::{generate_key, reference_name, Category, Reference};
use crate::envelope::Envelope;
use crate::errors::StateError;
use crate::resilience::{CircuitBreaker, ResilienceMetrics, RetryManager};
use crate::store::{DocumentStore, ObjectStore, PutReceipt};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Content type of structured objects.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of raw byte objects.
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";
/// Content type of Base64-encoded images.
pub const BASE64_CONTENT_TYPE: &str = "text/plain";

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Stores and retrieves run state in the object store.
///
/// Every store call goes through the [`RetryManager`], through the circuit
/// breaker when one is attached, and is bounded by the load or save timeout.
pub struct StateManager {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    retry: RetryManager,
    breaker: Option<Arc<CircuitBreaker>>,
    documents: Option<(Arc<dyn DocumentStore>, String)>,
    cancel: Option<Arc<CancellationToken>>,
    load_timeout: Duration,
    save_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("bucket", &self.bucket)
            .field("has_breaker", &self.breaker.is_some())
            .field("has_documents", &self.documents.is_some())
            .field("load_timeout", &self.load_timeout)
            .field("save_timeout", &self.save_timeout)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl StateManager {
    /// Creates a manager writing to `bucket`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        retry: RetryManager,
    ) -> Result<Self, StateError> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(StateError::validation("new_state_manager", "bucket name is required"));
        }
        Ok(Self {
            store,
            bucket,
            retry,
            breaker: None,
            documents: None,
            cancel: None,
            load_timeout: Duration::from_secs(10),
            save_timeout: Duration::from_secs(15),
            clock: Arc::new(SystemClock),
        })
    }

    /// Creates a manager from a loaded configuration.
    ///
    /// The retry manager and breaker report into `metrics`.
    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        config: &StateConfig,
        metrics: Arc<ResilienceMetrics>,
    ) -> Result<Self, StateError> {
        let retry = RetryManager::new(config.retry.clone(), metrics.clone());
        let breaker = CircuitBreaker::new("object-store", config.breaker.clone()).with_metrics(metrics);
        Ok(Self::new(store, config.bucket.clone(), retry)?
            .with_breaker(Arc::new(breaker))
            .with_timeouts(config.load_timeout(), config.save_timeout()))
    }

    /// Guards every store call with `breaker`.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Attaches a document store and the table run metadata goes to.
    #[must_use]
    pub fn with_document_store(mut self, store: Arc<dyn DocumentStore>, table: impl Into<String>) -> Self {
        self.documents = Some((store, table.into()));
        self
    }

    /// Aborts retries once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sets the per-call load and save deadlines.
    #[must_use]
    pub const fn with_timeouts(mut self, load: Duration, save: Duration) -> Self {
        self.load_timeout = load;
        self.save_timeout = save;
        self
    }

    /// Replaces the date source used for key partitions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The bucket new objects are written to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The retry manager.
    #[must_use]
    pub const fn retry(&self) -> &RetryManager {
        &self.retry
    }

    /// The attached breaker, if any.
    #[must_use]
    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_deref()
    }

    /// Serializes `value` as JSON and writes it under the generated key.
    ///
    /// The returned reference carries the stored size.
    pub async fn store_structured<T>(
        &self,
        run_id: &str,
        category: Category,
        filename: &str,
        value: &T,
    ) -> Result<Reference, StateError>
    where
        T: Serialize + ?Sized,
    {
        const OPERATION: &str = "store_structured";
        validate_target(OPERATION, run_id, filename)?;
        let data =
            serde_json::to_vec(value).map_err(|e| StateError::internal(OPERATION, e.to_string()))?;
        self.put(OPERATION, run_id, category, filename, data, JSON_CONTENT_TYPE)
            .await
    }

    /// Reads the object behind `reference` and deserializes it into `T`.
    pub async fn retrieve_structured<T>(&self, reference: &Reference) -> Result<T, StateError>
    where
        T: DeserializeOwned,
    {
        const OPERATION: &str = "retrieve_structured";
        let data = self.get(OPERATION, reference).await?;
        serde_json::from_slice(&data).map_err(|e| {
            StateError::deserialization(OPERATION, format!("{}: {e}", reference.path()))
        })
    }

    /// Stores `value` and records the reference in `envelope` under
    /// `{category}_{stem}`.
    pub async fn save_to_envelope<T>(
        &self,
        envelope: &mut Envelope,
        category: Category,
        filename: &str,
        value: &T,
    ) -> Result<Reference, StateError>
    where
        T: Serialize + ?Sized,
    {
        let reference = self
            .store_structured(envelope.run_id(), category, filename, value)
            .await?;
        envelope.add_reference(reference_name(category, filename), reference.clone());
        Ok(reference)
    }

    /// Writes raw bytes under the generated key.
    pub async fn store_bytes(
        &self,
        run_id: &str,
        category: Category,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<Reference, StateError> {
        const OPERATION: &str = "store_bytes";
        validate_target(OPERATION, run_id, filename)?;
        self.put(OPERATION, run_id, category, filename, data, BINARY_CONTENT_TYPE)
            .await
    }

    /// Reads the raw bytes behind `reference`.
    pub async fn retrieve_bytes(&self, reference: &Reference) -> Result<Vec<u8>, StateError> {
        self.get("retrieve_bytes", reference).await
    }

    /// Stores an image as Base64 text in the `images` category.
    pub async fn store_base64_image(
        &self,
        run_id: &str,
        filename: &str,
        image: &[u8],
    ) -> Result<Reference, StateError> {
        const OPERATION: &str = "store_base64_image";
        validate_target(OPERATION, run_id, filename)?;
        let encoded = STANDARD.encode(image).into_bytes();
        self.put(OPERATION, run_id, Category::Images, filename, encoded, BASE64_CONTENT_TYPE)
            .await
    }

    /// Reads a Base64 image and decodes it.
    pub async fn retrieve_base64_image(&self, reference: &Reference) -> Result<Vec<u8>, StateError> {
        const OPERATION: &str = "retrieve_base64_image";
        let data = self.get(OPERATION, reference).await?;
        let text = std::str::from_utf8(&data)
            .map_err(|e| StateError::deserialization(OPERATION, e.to_string()))?;
        STANDARD
            .decode(text.trim())
            .map_err(|e| StateError::deserialization(OPERATION, e.to_string()))
    }

    /// Writes a run metadata document to the configured table.
    pub async fn record_document(
        &self,
        key: &str,
        document: serde_json::Value,
    ) -> Result<(), StateError> {
        const OPERATION: &str = "record_document";
        let (store, table) = self.document_store(OPERATION)?;
        let timeout = self.save_timeout;

        self.retry
            .execute_with(OPERATION, None, self.cancel.as_deref(), || {
                let document = document.clone();
                async move {
                    match tokio::time::timeout(timeout, store.put_document(table, key, document)).await {
                        Ok(result) => result.map_err(|e| e.into_document_store_error(OPERATION, table, key)),
                        Err(_) => Err(StateError::timeout(OPERATION, millis(timeout))),
                    }
                }
            })
            .await?;

        debug!(table, key, "Recorded run document");
        Ok(())
    }

    /// Reads a run metadata document from the configured table.
    pub async fn fetch_document(&self, key: &str) -> Result<Option<serde_json::Value>, StateError> {
        const OPERATION: &str = "fetch_document";
        let (store, table) = self.document_store(OPERATION)?;
        let timeout = self.load_timeout;

        self.retry
            .execute_with(OPERATION, None, self.cancel.as_deref(), || async move {
                match tokio::time::timeout(timeout, store.get_document(table, key)).await {
                    Ok(result) => result.map_err(|e| e.into_document_store_error(OPERATION, table, key)),
                    Err(_) => Err(StateError::timeout(OPERATION, millis(timeout))),
                }
            })
            .await
    }

    fn document_store(&self, operation: &str) -> Result<(&dyn DocumentStore, &str), StateError> {
        self.documents
            .as_ref()
            .map(|(store, table)| (store.as_ref(), table.as_str()))
            .ok_or_else(|| StateError::validation(operation, "no document store configured"))
    }

    async fn put(
        &self,
        operation: &'static str,
        run_id: &str,
        category: Category,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<Reference, StateError> {
        let key = generate_key(run_id, category, filename, self.clock.today());
        let receipt = self.put_object(operation, &key, data, content_type).await?;

        debug!(
            run_id,
            category = %category,
            bucket = %self.bucket,
            key = %key,
            size = receipt.size,
            "Stored state object"
        );
        Ok(Reference::with_size(self.bucket.clone(), key, receipt.size))
    }

    async fn put_object(
        &self,
        operation: &'static str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, StateError> {
        let bucket = self.bucket.as_str();
        let timeout = self.save_timeout;
        let store = self.store.as_ref();

        self.guarded(operation, || {
            let data = data.clone();
            async move {
                match tokio::time::timeout(timeout, store.put_object(bucket, key, data, content_type)).await {
                    Ok(result) => result.map_err(|e| e.into_object_store_error(operation, bucket, key)),
                    Err(_) => Err(StateError::timeout(operation, millis(timeout))),
                }
            }
        })
        .await
    }

    async fn get(&self, operation: &'static str, reference: &Reference) -> Result<Vec<u8>, StateError> {
        reference.ensure_valid(operation)?;
        let bucket = reference.container();
        let key = reference.path();
        let timeout = self.load_timeout;
        let store = self.store.as_ref();

        let data = self
            .guarded(operation, || async move {
                match tokio::time::timeout(timeout, store.get_object(bucket, key)).await {
                    Ok(result) => result.map_err(|e| e.into_object_store_error(operation, bucket, key)),
                    Err(_) => Err(StateError::timeout(operation, millis(timeout))),
                }
            })
            .await?;

        debug!(bucket, key, size = data.len(), "Loaded state object");
        Ok(data)
    }

    async fn guarded<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, StateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StateError>>,
    {
        self.retry
            .execute_with(operation, self.breaker.as_deref(), self.cancel.as_deref(), op)
            .await
    }
}

fn validate_target(operation: &str, run_id: &str, filename: &str) -> Result<(), StateError> {
    if run_id.is_empty() {
        return Err(StateError::validation(operation, "run id is required"));
    }
    if run_id.contains('/') {
        return Err(StateError::validation(
            operation,
            format!("run id '{run_id}' must not contain '/'"),
        ));
    }
    if filename.is_empty() {
        return Err(StateError::validation(operation, "filename is required"));
    }
    Ok(())
}

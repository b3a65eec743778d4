//! Scriptable stores and mock stages.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::Category;
use crate::envelope::Envelope;
use crate::errors::StateError;
use crate::stage::Stage;
use crate::state::StateManager;
use crate::store::{
    DocumentStore, InMemoryDocumentStore, InMemoryObjectStore, ObjectStore, PutReceipt, StoreError,
};

#[derive(Debug, Default)]
struct Script {
    remaining: Option<usize>,
    error: Option<StoreError>,
}

impl Script {
    fn set(&mut self, times: Option<usize>, error: StoreError) {
        self.remaining = times;
        self.error = Some(error);
    }

    fn next_failure(&mut self) -> Option<StoreError> {
        let error = self.error.clone()?;
        match &mut self.remaining {
            None => Some(error),
            Some(0) => {
                self.error = None;
                None
            }
            Some(n) => {
                *n -= 1;
                Some(error)
            }
        }
    }
}

/// An in-memory object store with injectable failures and latency.
///
/// Failed calls are counted but never reach the inner store.
#[derive(Debug, Default)]
pub struct ScriptedObjectStore {
    inner: InMemoryObjectStore,
    puts: Mutex<Script>,
    gets: Mutex<Script>,
    latency: Mutex<Option<Duration>>,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl ScriptedObjectStore {
    /// Creates a store that behaves like [`InMemoryObjectStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` writes with `error`.
    pub fn fail_puts(&self, times: usize, error: StoreError) {
        self.puts.lock().set(Some(times), error);
    }

    /// Fails the next `times` reads with `error`.
    pub fn fail_gets(&self, times: usize, error: StoreError) {
        self.gets.lock().set(Some(times), error);
    }

    /// Fails every write until [`Self::heal`].
    pub fn always_fail_puts(&self, error: StoreError) {
        self.puts.lock().set(None, error);
    }

    /// Fails every read until [`Self::heal`].
    pub fn always_fail_gets(&self, error: StoreError) {
        self.gets.lock().set(None, error);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Clears scripted failures and latency.
    pub fn heal(&self) {
        *self.puts.lock() = Script::default();
        *self.gets.lock() = Script::default();
        *self.latency.lock() = None;
    }

    /// Number of write calls received.
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Number of read calls received.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// The backing store.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryObjectStore {
        &self.inner
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ObjectStore for ScriptedObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let failure = self.gets.lock().next_failure();
        match failure {
            Some(error) => Err(error),
            None => self.inner.get_object(bucket, key).await,
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let failure = self.puts.lock().next_failure();
        match failure {
            Some(error) => Err(error),
            None => self.inner.put_object(bucket, key, data, content_type).await,
        }
    }
}

/// An in-memory document store with injectable write failures.
#[derive(Debug, Default)]
pub struct ScriptedDocumentStore {
    inner: InMemoryDocumentStore,
    puts: Mutex<Script>,
    put_calls: AtomicUsize,
}

impl ScriptedDocumentStore {
    /// Creates a store that behaves like [`InMemoryDocumentStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` writes with `error`.
    pub fn fail_puts(&self, times: usize, error: StoreError) {
        self.puts.lock().set(Some(times), error);
    }

    /// Fails every write until [`Self::heal`].
    pub fn always_fail_puts(&self, error: StoreError) {
        self.puts.lock().set(None, error);
    }

    /// Clears scripted failures.
    pub fn heal(&self) {
        *self.puts.lock() = Script::default();
    }

    /// Number of write calls received.
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// The backing store.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }
}

#[async_trait]
impl DocumentStore for ScriptedDocumentStore {
    async fn put_document(
        &self,
        table: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.puts.lock().next_failure();
        match failure {
            Some(error) => Err(error),
            None => self.inner.put_document(table, key, document).await,
        }
    }

    async fn get_document(
        &self,
        table: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.get_document(table, key).await
    }
}

/// A stage that saves one JSON value and optionally sets the status.
#[derive(Debug)]
pub struct SavingStage {
    name: String,
    category: Category,
    filename: String,
    value: serde_json::Value,
    status: Option<String>,
    call_count: AtomicUsize,
}

impl SavingStage {
    /// Creates a stage that saves `value` under `category`/`filename`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: Category,
        filename: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            filename: filename.into(),
            value,
            status: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Sets the status written after saving.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for SavingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, state: &StateManager, envelope: &mut Envelope) -> Result<(), StateError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        state
            .save_to_envelope(envelope, self.category, &self.filename, &self.value)
            .await?;
        if let Some(status) = &self.status {
            envelope.set_status(status.clone());
        }
        Ok(())
    }
}

/// A stage that always fails with a fixed error.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: StateError,
    call_count: AtomicUsize,
}

impl FailingStage {
    /// Creates a stage that returns `error`.
    #[must_use]
    pub fn new(name: impl Into<String>, error: StateError) -> Self {
        Self {
            name: name.into(),
            error,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _state: &StateManager, _envelope: &mut Envelope) -> Result<(), StateError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

//! Storage ports and in-memory backends.
//!
//! The crate never talks to a cloud SDK directly. Callers hand a
//! [`StateManager`](crate::state::StateManager) an [`ObjectStore`] and,
//! optionally, a [`DocumentStore`].

mod document_store;
mod memory;
mod object_store;

pub use document_store::DocumentStore;
pub use memory::{InMemoryDocumentStore, InMemoryObjectStore};
pub use object_store::{ObjectStore, PutReceipt, StoreError};

#[cfg(test)]
pub use object_store::MockObjectStore;

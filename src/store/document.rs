//! Document Store contract (C5): get/create/set an [`ObjectDocument`].

use async_trait::async_trait;

use crate::document::ObjectDocument;
use crate::error::Error;

/// Implementations persisting the [`ObjectDocument`] for a given
/// `(objectName, objectId)`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the document for `(object_name, object_id)`, or
    /// [`Error::not_found`] if it does not exist.
    async fn get(&self, object_name: &str, object_id: &str) -> Result<ObjectDocument, Error>;

    /// Returns the existing document, or creates and returns a fresh one.
    /// Idempotent: concurrent creators for the same fresh identity observe
    /// equal documents.
    async fn get_or_create(&self, object_name: &str, object_id: &str) -> Result<ObjectDocument, Error>;

    /// Compare-and-swap write: succeeds when the stored `hash` equals
    /// `doc.prev_hash`, or `doc.prev_hash == ANY_HASH`. On success, the
    /// implementation assigns a freshly computed `hash` and returns the
    /// updated document; otherwise fails with
    /// [`Error::concurrency_conflict`].
    async fn set(&self, doc: ObjectDocument) -> Result<ObjectDocument, Error>;
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use crate::testing::memory::InMemoryDocumentStore;

    #[tokio::test]
    async fn in_memory_double_satisfies_the_contract() {
        crate::testing::contract::document_store_tests(&InMemoryDocumentStore::new()).await;
    }
}

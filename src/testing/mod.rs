//! In-memory store doubles and a small scenario harness, gated behind the
//! `testing` feature. These are reference doubles for exercising the store
//! contracts in tests -- not a production backend.

pub mod contract;
pub mod memory;

pub use memory::{InMemoryDataStore, InMemoryDocumentStore, InMemoryDocumentTagStore, InMemorySnapshotStore, InMemoryStreamTagStore};

/// Generates a reasonably-unique object id for scenario-style tests, so
/// concurrent test runs don't collide on shared in-memory fixtures.
pub fn random_object_id(prefix: &str) -> String {
    use rand::Rng;
    let suffix: u64 = rand::thread_rng().gen();
    format!("{prefix}-{suffix:016x}")
}

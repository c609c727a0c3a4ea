//! Snapshot Store contract (C6): put/get/list/delete snapshots for a
//! stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::document::ObjectDocument;
use crate::error::Error;
use crate::event::RawPayload;

/// A serialized aggregate state up to `version`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: u32,
    pub name: Option<String>,
    pub data: RawPayload,
    pub aggregate_type: String,
    pub created_at: DateTime<Utc>,
}

/// Implementations persisting [`Snapshot`]s for the stream described by an
/// [`ObjectDocument`].
///
/// Invariant: the most-recent snapshot is never deleted by
/// [`SnapshotStore::delete_many`] -- this is enforced by the snapshot
/// policy engine's cleanup routine, not by the store itself, since the
/// store has no notion of "most recent" independent of the caller's
/// ordering.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, doc: &ObjectDocument, snapshot: Snapshot) -> Result<(), Error>;

    /// Returns the snapshot at `version` / `name`, or `Ok(None)` if absent.
    async fn get(&self, doc: &ObjectDocument, version: u32, name: Option<&str>) -> Result<Option<Snapshot>, Error>;

    /// Returns all snapshots for this stream, ordered by `version`
    /// descending.
    async fn list(&self, doc: &ObjectDocument) -> Result<Vec<Snapshot>, Error>;

    /// Deletes the snapshots at the given versions in one batch call,
    /// returning the count actually deleted.
    async fn delete_many(&self, doc: &ObjectDocument, versions: &[u32]) -> Result<usize, Error>;
}

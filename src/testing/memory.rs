//! In-memory implementations of the C4-C7 store contracts, modeled on the
//! teacher's `RwLock`-guarded map-of-maps shape. Reference doubles for
//! tests; not a production backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::document::ObjectDocument;
use crate::error::Error;
use crate::event::Event;
use crate::identity::ObjectIdentifier;
use crate::store::data::ChunkId;
use crate::store::snapshot::Snapshot;
use crate::store::{DataStore, DocumentStore, DocumentTagStore, SnapshotStore, StreamTagStore};

fn key(object_name: &str, object_id: &str) -> String {
    format!("{object_name}__{object_id}")
}

/// Rows keyed by `(objectName, objectId)`, storing the full event list for
/// the stream physically attached to that document.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    rows: RwLock<HashMap<String, Vec<Event>>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn read(&self, doc: &ObjectDocument, start_version: u32, until_version: Option<u32>, _chunk: ChunkId) -> Result<Option<Vec<Event>>, Error> {
        let rows = self.rows.read().expect("lock poisoned");
        let Some(all) = rows.get(&key(&doc.object_name, &doc.object_id)) else {
            return Ok(None);
        };

        let filtered = all
            .iter()
            .filter(|e| e.event_version >= start_version && until_version.map_or(true, |until| e.event_version <= until))
            .cloned()
            .collect();
        Ok(Some(filtered))
    }

    async fn append(&self, doc: &ObjectDocument, _preserve_timestamp: bool, events: Vec<Event>) -> Result<(), Error> {
        if events.is_empty() {
            return Err(Error::invalid_input("append requires a non-empty batch of events"));
        }
        let mut rows = self.rows.write().expect("lock poisoned");
        rows.entry(key(&doc.object_name, &doc.object_id)).or_default().extend(events);
        Ok(())
    }
}

/// Documents keyed by `(objectName, objectId)`, enforcing the hash
/// compare-and-swap described on [`crate::store::document::DocumentStore::set`].
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, ObjectDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, object_name: &str, object_id: &str) -> Result<ObjectDocument, Error> {
        self.documents
            .read()
            .expect("lock poisoned")
            .get(&key(object_name, object_id))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no document for {object_name}/{object_id}")))
    }

    async fn get_or_create(&self, object_name: &str, object_id: &str) -> Result<ObjectDocument, Error> {
        let k = key(object_name, object_id);
        let mut documents = self.documents.write().expect("lock poisoned");
        if let Some(existing) = documents.get(&k) {
            return Ok(existing.clone());
        }
        let stream_identifier = format!("{object_name}__{object_id}__s0");
        let fresh = ObjectDocument::new_empty(object_name, object_id, stream_identifier);
        documents.insert(k, fresh.clone());
        Ok(fresh)
    }

    async fn set(&self, doc: ObjectDocument) -> Result<ObjectDocument, Error> {
        let k = key(&doc.object_name, &doc.object_id);
        let mut documents = self.documents.write().expect("lock poisoned");

        if let Some(existing) = documents.get(&k) {
            if !existing.accepts(&doc.prev_hash) {
                return Err(Error::concurrency_conflict(format!(
                    "document hash mismatch for {k}: expected prevHash {}, stored hash is {}",
                    doc.prev_hash, existing.hash
                )));
            }
        }

        documents.insert(k, doc.clone());
        Ok(doc)
    }
}

/// Snapshots keyed by `(objectName, objectId)`, each a small `Vec` ordered
/// by insertion (queried back sorted by version descending).
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Vec<Snapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn put(&self, doc: &ObjectDocument, snapshot: Snapshot) -> Result<(), Error> {
        let k = key(&doc.object_name, &doc.object_id);
        let mut snapshots = self.snapshots.write().expect("lock poisoned");
        let bucket = snapshots.entry(k).or_default();
        bucket.retain(|s| !(s.version == snapshot.version && s.name == snapshot.name));
        bucket.push(snapshot);
        Ok(())
    }

    async fn get(&self, doc: &ObjectDocument, version: u32, name: Option<&str>) -> Result<Option<Snapshot>, Error> {
        let k = key(&doc.object_name, &doc.object_id);
        let snapshots = self.snapshots.read().expect("lock poisoned");
        Ok(snapshots
            .get(&k)
            .and_then(|bucket| bucket.iter().find(|s| s.version == version && s.name.as_deref() == name))
            .cloned())
    }

    async fn list(&self, doc: &ObjectDocument) -> Result<Vec<Snapshot>, Error> {
        let k = key(&doc.object_name, &doc.object_id);
        let snapshots = self.snapshots.read().expect("lock poisoned");
        let mut list = snapshots.get(&k).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(list)
    }

    async fn delete_many(&self, doc: &ObjectDocument, versions: &[u32]) -> Result<usize, Error> {
        let k = key(&doc.object_name, &doc.object_id);
        let mut snapshots = self.snapshots.write().expect("lock poisoned");
        let Some(bucket) = snapshots.get_mut(&k) else { return Ok(0) };
        let before = bucket.len();
        bucket.retain(|s| !versions.contains(&s.version));
        Ok(before - bucket.len())
    }
}

/// Document-level tag index: `tag -> set of ObjectIdentifier` (by wire form).
#[derive(Debug, Default)]
pub struct InMemoryDocumentTagStore {
    index: RwLock<HashMap<String, Vec<ObjectIdentifier>>>,
}

impl InMemoryDocumentTagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentTagStore for InMemoryDocumentTagStore {
    async fn tag(&self, object: &ObjectIdentifier, tag: &str) -> Result<(), Error> {
        let mut index = self.index.write().expect("lock poisoned");
        let bucket = index.entry(tag.to_string()).or_default();
        if !bucket.contains(object) {
            bucket.push(object.clone());
        }
        Ok(())
    }

    async fn untag(&self, object: &ObjectIdentifier, tag: &str) -> Result<(), Error> {
        let mut index = self.index.write().expect("lock poisoned");
        if let Some(bucket) = index.get_mut(tag) {
            bucket.retain(|o| o != object);
        }
        Ok(())
    }

    async fn find_by_tag(&self, tag: &str) -> Result<Vec<ObjectIdentifier>, Error> {
        Ok(self.index.read().expect("lock poisoned").get(tag).cloned().unwrap_or_default())
    }
}

/// Stream-level tag index: `tag -> set of streamIdentifier`.
#[derive(Debug, Default)]
pub struct InMemoryStreamTagStore {
    index: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryStreamTagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamTagStore for InMemoryStreamTagStore {
    async fn tag(&self, stream_identifier: &str, tag: &str) -> Result<(), Error> {
        let mut index = self.index.write().expect("lock poisoned");
        let bucket = index.entry(tag.to_string()).or_default();
        if !bucket.iter().any(|s| s == stream_identifier) {
            bucket.push(stream_identifier.to_string());
        }
        Ok(())
    }

    async fn untag(&self, stream_identifier: &str, tag: &str) -> Result<(), Error> {
        let mut index = self.index.write().expect("lock poisoned");
        if let Some(bucket) = index.get_mut(tag) {
            bucket.retain(|s| s != stream_identifier);
        }
        Ok(())
    }

    async fn find_by_tag(&self, tag: &str) -> Result<Vec<String>, Error> {
        Ok(self.index.read().expect("lock poisoned").get(tag).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn data_store_round_trips_appended_events() {
        use crate::event::RawPayload;

        let store = InMemoryDataStore::new();
        let doc = ObjectDocument::new_empty("order", "o-1", "s0");

        assert!(store.read(&doc, 0, None, None).await.unwrap().is_none());

        let events = vec![Event::new("OrderCreated", 0, RawPayload::empty())];
        store.append(&doc, false, events.clone()).await.unwrap();

        let read_back = store.read(&doc, 0, None, None).await.unwrap().unwrap();
        assert_eq!(read_back, events);
    }

    #[tokio::test]
    async fn snapshot_store_put_get_list_delete() {
        use crate::event::RawPayload;

        let store = InMemorySnapshotStore::new();
        let doc = ObjectDocument::new_empty("order", "o-1", "s0");

        let now = chrono::Utc::now();
        store
            .put(&doc, Snapshot { version: 9, name: None, data: RawPayload::empty(), aggregate_type: "Order".to_string(), created_at: now })
            .await
            .unwrap();
        store
            .put(&doc, Snapshot { version: 19, name: None, data: RawPayload::empty(), aggregate_type: "Order".to_string(), created_at: now })
            .await
            .unwrap();

        let list = store.list(&doc).await.unwrap();
        assert_eq!(list.iter().map(|s| s.version).collect::<Vec<_>>(), vec![19, 9]);

        assert!(store.get(&doc, 9, None).await.unwrap().is_some());
        assert!(store.get(&doc, 100, None).await.unwrap().is_none());

        let deleted = store.delete_many(&doc, &[9]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.list(&doc).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tag_stores_index_and_find() {
        let docs = InMemoryDocumentTagStore::new();
        let object = ObjectIdentifier::new("order", "o-1");
        docs.tag(&object, "vip").await.unwrap();
        assert_eq!(docs.find_by_tag("vip").await.unwrap(), vec![object.clone()]);
        docs.untag(&object, "vip").await.unwrap();
        assert!(docs.find_by_tag("vip").await.unwrap().is_empty());

        let streams = InMemoryStreamTagStore::new();
        streams.tag("order__o-1__s0", "archived").await.unwrap();
        assert_eq!(streams.find_by_tag("archived").await.unwrap(), vec!["order__o-1__s0".to_string()]);
    }
}

//! The [`ObjectDocument`]: the object-level descriptor that carries the
//! active stream's shape, chunk map, snapshot list, and the hash chain used
//! for compare-and-swap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel `prevHash` meaning "accept any current hash" -- used when a
/// document is freshly created and has never been written.
pub const ANY_HASH: &str = "*";

/// Chunking configuration for one stream; absent means chunking is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSettings {
    pub chunk_size: u32,
}

/// A contiguous range of events stored under a distinct partition-key
/// suffix: `first <= last`; chunk ranges are disjoint and cover
/// `[0, currentStreamVersion]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    pub chunk_id: u32,
    pub first_version: u32,
    pub last_version: u32,
}

/// One entry in a stream's snapshot list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDescriptor {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The active (or terminated) stream descriptor embedded in an
/// [`ObjectDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInformation {
    pub stream_identifier: String,
    pub stream_type: String,
    /// Last appended `eventVersion`, or `-1` if the stream has no events.
    pub current_stream_version: i64,

    pub document_type: String,
    pub document_tag_type: String,
    pub event_stream_tag_type: String,
    pub document_ref_type: String,

    pub data_store: String,
    pub document_store: String,
    pub document_tag_store: String,
    pub stream_tag_store: String,
    pub snap_shot_store: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_settings: Option<ChunkSettings>,
    #[serde(default)]
    pub stream_chunks: Vec<StreamChunk>,

    #[serde(default)]
    pub snapshots: Vec<SnapshotDescriptor>,

    #[serde(default)]
    pub terminated: bool,
}

impl StreamInformation {
    pub fn new(stream_identifier: impl Into<String>, stream_type: impl Into<String>) -> Self {
        Self {
            stream_identifier: stream_identifier.into(),
            stream_type: stream_type.into(),
            current_stream_version: -1,
            document_type: String::new(),
            document_tag_type: String::new(),
            event_stream_tag_type: String::new(),
            document_ref_type: String::new(),
            data_store: String::new(),
            document_store: String::new(),
            document_tag_store: String::new(),
            stream_tag_store: String::new(),
            snap_shot_store: String::new(),
            chunk_settings: None,
            stream_chunks: Vec::new(),
            snapshots: Vec::new(),
            terminated: false,
        }
    }

    pub fn has_events(&self) -> bool {
        self.current_stream_version >= 0
    }

    /// Snapshot list ordered by version descending.
    pub fn snapshots_desc(&self) -> Vec<&SnapshotDescriptor> {
        let mut refs: Vec<&SnapshotDescriptor> = self.snapshots.iter().collect();
        refs.sort_by(|a, b| b.version.cmp(&a.version));
        refs
    }

    pub fn record_snapshot(&mut self, descriptor: SnapshotDescriptor) {
        self.snapshots.retain(|s| !(s.version == descriptor.version && s.name == descriptor.name));
        self.snapshots.push(descriptor);
    }

    /// Appends (or extends) the chunk map given the new tail version,
    /// honouring `chunk_settings`. No-op if chunking is disabled.
    pub fn advance_chunks(&mut self, new_tail_version: u32) {
        let Some(settings) = &self.chunk_settings else {
            return;
        };
        let chunk_size = settings.chunk_size.max(1);

        loop {
            let next_first = self.stream_chunks.last().map_or(0, |c| c.last_version + 1);
            if next_first > new_tail_version {
                break;
            }
            let chunk_id = self.stream_chunks.len() as u32;
            let last_of_chunk = (next_first / chunk_size) * chunk_size + chunk_size - 1;
            let last = last_of_chunk.min(new_tail_version);
            self.stream_chunks.push(StreamChunk {
                chunk_id,
                first_version: next_first,
                last_version: last,
            });
        }
    }
}

/// The object-level descriptor: exactly one per `(objectName, objectId)`.
///
/// `hash` is a pure function of the document content (excluding `hash`
/// and `prevHash` themselves); `prevHash` is the `hash` observed at
/// load time, used for the compare-and-swap in
/// [`crate::store::document::DocumentStore::set`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDocument {
    pub object_id: String,
    pub object_name: String,
    pub active: StreamInformation,
    #[serde(default)]
    pub terminated_streams: Vec<StreamInformation>,
    pub schema_version: u32,
    pub hash: String,
    pub prev_hash: String,
}

/// The subset of an [`ObjectDocument`] that participates in the hash:
/// everything except `hash`/`prevHash`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Canonical<'a> {
    object_id: &'a str,
    object_name: &'a str,
    active: &'a StreamInformation,
    terminated_streams: &'a [StreamInformation],
    schema_version: u32,
}

impl ObjectDocument {
    /// A freshly created document: empty active stream, sentinel hash.
    pub fn new_empty(object_name: impl Into<String>, object_id: impl Into<String>, stream_identifier: impl Into<String>) -> Self {
        let object_name = object_name.into();
        let object_id = object_id.into();
        let active = StreamInformation::new(stream_identifier, object_name.clone());
        Self {
            object_id,
            object_name,
            active,
            terminated_streams: Vec::new(),
            schema_version: 1,
            hash: ANY_HASH.to_string(),
            prev_hash: ANY_HASH.to_string(),
        }
    }

    /// Recomputes `hash` over the canonical, deterministic serialization of
    /// the document's content.
    pub fn compute_hash(&self) -> String {
        let canonical = Canonical {
            object_id: &self.object_id,
            object_name: &self.object_name,
            active: &self.active,
            terminated_streams: &self.terminated_streams,
            schema_version: self.schema_version,
        };

        // Re-serializing through `serde_json::Value` sorts object keys
        // (`Value::Object` is a `BTreeMap`-backed map under `preserve_order`
        // being off), giving two semantically-equal documents equal bytes.
        let value = serde_json::to_value(&canonical).expect("document is always serializable");
        let canonical_bytes = to_canonical_bytes(&value);

        let mut hasher = Sha256::new();
        hasher.update(canonical_bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Stamps `prevHash = hash`, then recomputes `hash` over the document's
    /// new content. Called after the in-memory mutation for a commit is
    /// complete, just before `DocumentStore::set`.
    pub fn advance_hash(&mut self) {
        self.prev_hash = self.hash.clone();
        self.hash = self.compute_hash();
    }

    /// Whether `candidate_prev_hash` is acceptable against this document's
    /// currently stored `hash` (the compare-and-swap check).
    pub fn accepts(&self, candidate_prev_hash: &str) -> bool {
        candidate_prev_hash == ANY_HASH || candidate_prev_hash == self.hash
    }

    /// Moves `active` into `terminated_streams` and installs a fresh active
    /// stream with `new_stream_identifier`, preserving the terminated list
    /// (state-machine transition `Terminated -> Active` via `New`).
    pub fn terminate_and_start_new(&mut self, new_stream_identifier: impl Into<String>) {
        self.active.terminated = true;
        let previous_type = self.active.stream_type.clone();
        let mut fresh = StreamInformation::new(new_stream_identifier, previous_type);
        fresh.data_store = self.active.data_store.clone();
        fresh.document_store = self.active.document_store.clone();
        fresh.document_tag_store = self.active.document_tag_store.clone();
        fresh.stream_tag_store = self.active.stream_tag_store.clone();
        fresh.snap_shot_store = self.active.snap_shot_store.clone();
        fresh.chunk_settings = self.active.chunk_settings.clone();
        let old_active = std::mem::replace(&mut self.active, fresh);
        self.terminated_streams.push(old_active);
    }

    pub fn is_terminated(&self, stream_identifier: &str) -> bool {
        if self.active.stream_identifier == stream_identifier {
            return self.active.terminated;
        }
        self.terminated_streams
            .iter()
            .any(|s| s.stream_identifier == stream_identifier)
    }
}

/// Sorts a JSON value's object keys recursively so that two semantically
/// equal documents always produce identical bytes, regardless of
/// construction order.
fn to_canonical_bytes(value: &serde_json::Value) -> Vec<u8> {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let sorted: BTreeMap<String, serde_json::Value> =
                    map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                serde_json::to_value(sorted).expect("map of Values is serializable")
            }
            serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }

    serde_json::to_vec(&sort(value)).expect("canonical value is serializable")
}

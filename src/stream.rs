//! The Event Stream façade (C11): the per-document entry point that opens
//! sessions, reads committed events, and exposes the snapshot list.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cancel::CancellationSignal;
use crate::document::ObjectDocument;
use crate::error::Error;
use crate::event::Event;
use crate::identity::ObjectIdentifier;
use crate::registry::EventTypeRegistry;
use crate::session::{
    CommitOutcome, LeasedSession, Notification, PostAppendAction, PreAppendAction, SessionDependencies,
    SnapshotSource, StreamConstraint,
};
use crate::snapshot_policy::SnapshotPolicy;
use crate::store::snapshot::{Snapshot, SnapshotStore};
use crate::store::{DataStore, DocumentStore};
use crate::upcast;

/// Per-document façade over the stream engine. Construct one per
/// `(objectName, objectId)` and reuse it to open sessions and read.
#[derive(Clone)]
pub struct EventStream {
    object_identifier: ObjectIdentifier,
    document_store: Arc<dyn DocumentStore>,
    data_store: Arc<dyn DataStore>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    registry: Arc<EventTypeRegistry>,
    pre_append: Vec<Arc<dyn PreAppendAction>>,
    post_append: Vec<Arc<dyn PostAppendAction>>,
    notifications: Vec<Arc<dyn Notification>>,
    snapshot_policy: Option<SnapshotPolicy>,
    snapshot_timeout: Duration,
}

impl EventStream {
    pub fn new(
        object_identifier: ObjectIdentifier,
        document_store: Arc<dyn DocumentStore>,
        data_store: Arc<dyn DataStore>,
        registry: Arc<EventTypeRegistry>,
    ) -> Self {
        Self {
            object_identifier,
            document_store,
            data_store,
            snapshot_store: None,
            registry,
            pre_append: Vec::new(),
            post_append: Vec::new(),
            notifications: Vec::new(),
            snapshot_policy: None,
            snapshot_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = Some(policy);
        self
    }

    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout = timeout;
        self
    }

    pub fn with_pre_append(mut self, hook: Arc<dyn PreAppendAction>) -> Self {
        self.pre_append.push(hook);
        self
    }

    pub fn with_post_append(mut self, hook: Arc<dyn PostAppendAction>) -> Self {
        self.post_append.push(hook);
        self
    }

    pub fn with_notification(mut self, hook: Arc<dyn Notification>) -> Self {
        self.notifications.push(hook);
        self
    }

    pub fn object_identifier(&self) -> &ObjectIdentifier {
        &self.object_identifier
    }

    /// Opens a [`LeasedSession`] under `constraint`, runs `body` against
    /// it, and returns its result. The session is not committed
    /// automatically -- `body` must call [`LeasedSession::commit`]
    /// explicitly.
    pub async fn session<F, Fut, R>(
        &self,
        constraint: StreamConstraint,
        aggregate_type: impl Into<String>,
        snapshot_source: Option<Arc<dyn SnapshotSource>>,
        cancel: &CancellationSignal,
        body: F,
    ) -> Result<R, Error>
    where
        F: FnOnce(&mut LeasedSession) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        cancel.check()?;
        let doc = self.open_document(constraint).await?;

        let deps = SessionDependencies {
            registry: Arc::clone(&self.registry),
            data_store: Arc::clone(&self.data_store),
            document_store: Arc::clone(&self.document_store),
            snapshot_store: self.snapshot_store.clone(),
            pre_append: self.pre_append.clone(),
            post_append: self.post_append.clone(),
            notifications: self.notifications.clone(),
            snapshot_policy: self.snapshot_policy.clone(),
            snapshot_timeout: self.snapshot_timeout,
        };

        let mut session = LeasedSession::new(self.object_identifier.clone(), doc, deps).with_aggregate_type(aggregate_type);
        if let Some(source) = snapshot_source {
            session = session.with_snapshot_source(source);
        }

        body(&mut session).await
    }

    async fn open_document(&self, constraint: StreamConstraint) -> Result<ObjectDocument, Error> {
        match constraint {
            StreamConstraint::Loose => {
                self.document_store
                    .get_or_create(&self.object_identifier.object_name, &self.object_identifier.object_id)
                    .await
            }
            StreamConstraint::Existing => self
                .document_store
                .get(&self.object_identifier.object_name, &self.object_identifier.object_id)
                .await
                .map_err(|err| match err {
                    Error::NotFound { .. } => Error::not_found(format!(
                        "no stream exists yet for {}",
                        self.object_identifier
                    )),
                    other => other,
                }),
            StreamConstraint::New => {
                let mut doc = self
                    .document_store
                    .get_or_create(&self.object_identifier.object_name, &self.object_identifier.object_id)
                    .await?;
                let new_stream_id = format!(
                    "{}__{}__s{}",
                    self.object_identifier.object_name,
                    self.object_identifier.object_id,
                    doc.terminated_streams.len() + 1
                );
                doc.terminate_and_start_new(new_stream_id);
                Ok(doc)
            }
        }
    }

    /// Reads committed events in `[from, until]` (post-upcast), bypassing
    /// the session layer -- used by read-only callers such as
    /// [`crate::aggregate::Folder::fold_from_stream`]. `cancel` is checked
    /// before the storage read and at each upcast step.
    pub async fn read(&self, from: u32, until: Option<u32>, cancel: &CancellationSignal) -> Result<Vec<Event>, Error> {
        cancel.check()?;
        let doc = self
            .document_store
            .get(&self.object_identifier.object_name, &self.object_identifier.object_id)
            .await?;

        let stored = self.data_store.read(&doc, from, until, None).await?.unwrap_or_default();
        let mut out = Vec::with_capacity(stored.len());
        for event in stored {
            cancel.check()?;
            out.extend(upcast::apply(&self.registry, event)?);
        }
        Ok(out)
    }

    pub async fn is_terminated(&self, stream_identifier: &str) -> Result<bool, Error> {
        let doc = self
            .document_store
            .get(&self.object_identifier.object_name, &self.object_identifier.object_id)
            .await?;
        Ok(doc.is_terminated(stream_identifier))
    }

    /// Returns the latest snapshot at or before `target_version`, or `None`
    /// if no snapshot store is configured or none qualifies.
    pub async fn latest_snapshot(&self, target_version: u32) -> Result<Option<Snapshot>, Error> {
        let Some(store) = &self.snapshot_store else { return Ok(None) };
        let doc = self
            .document_store
            .get(&self.object_identifier.object_name, &self.object_identifier.object_id)
            .await?;

        let candidate = doc
            .active
            .snapshots_desc()
            .into_iter()
            .find(|s| s.version <= target_version)
            .cloned();

        let Some(descriptor) = candidate else { return Ok(None) };
        store.get(&doc, descriptor.version, descriptor.name.as_deref()).await
    }

    /// Drives snapshot cleanup: lists every stored snapshot, asks the
    /// snapshot policy which versions are safe to delete, and deletes them
    /// in one batch call. No-op if no snapshot store or policy is
    /// configured for this stream.
    pub async fn cleanup_snapshots(&self) -> Result<usize, Error> {
        let Some(store) = &self.snapshot_store else { return Ok(0) };
        let Some(policy) = &self.snapshot_policy else { return Ok(0) };
        let doc = self
            .document_store
            .get(&self.object_identifier.object_name, &self.object_identifier.object_id)
            .await?;

        let snapshots = store.list(&doc).await?;
        let to_delete = policy.cleanup_candidates(&snapshots, Utc::now());
        if to_delete.is_empty() {
            return Ok(0);
        }
        store.delete_many(&doc, &to_delete).await
    }
}

/// Convenience re-export so callers matching on commit results don't need
/// to import [`crate::session`] directly.
pub type SessionCommitOutcome = CommitOutcome;

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::event::{NewEvent, RawPayload};
    use crate::testing::memory::{InMemoryDataStore, InMemoryDocumentStore, InMemorySnapshotStore};

    fn stream() -> EventStream {
        EventStream::new(
            ObjectIdentifier::new("order", "o-1"),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryDataStore::new()),
            Arc::new(EventTypeRegistry::new()),
        )
    }

    #[tokio::test]
    async fn session_appends_and_read_sees_them_committed() {
        let stream = stream();
        let cancel = CancellationSignal::new();

        stream
            .session(StreamConstraint::Loose, "Order", None, &cancel, |session| async move {
                session.append(NewEvent::new(RawPayload::from_raw_json(r#"{"orderId":"ORD-001"}"#).unwrap()).with_event_type("OrderCreated"));
                session.commit(&cancel).await
            })
            .await
            .unwrap();

        let events = stream.read(0, None, &cancel).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "OrderCreated");
    }

    #[tokio::test]
    async fn existing_constraint_fails_against_a_stream_that_was_never_opened() {
        let stream = stream();
        let cancel = CancellationSignal::new();

        let err = stream
            .session(StreamConstraint::Existing, "Order", None, &cancel, |_session| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn new_constraint_terminates_the_active_stream_and_starts_another() {
        let stream = stream();
        let cancel = CancellationSignal::new();

        stream
            .session(StreamConstraint::Loose, "Order", None, &cancel, |session| async move {
                session.append(NewEvent::new(RawPayload::empty()).with_event_type("OrderCreated"));
                session.commit(&cancel).await
            })
            .await
            .unwrap();

        let first_stream_identifier = stream
            .session(StreamConstraint::Loose, "Order", None, &cancel, |session| {
                let id = session.document().active.stream_identifier.clone();
                async move { Ok(id) }
            })
            .await
            .unwrap();

        stream
            .session(StreamConstraint::New, "Order", None, &cancel, |session| async move { Ok(session.document().active.current_stream_version) })
            .await
            .unwrap();

        assert!(stream.is_terminated(&first_stream_identifier).await.unwrap());
    }

    #[tokio::test]
    async fn read_respects_the_until_bound() {
        let stream = stream();
        let cancel = CancellationSignal::new();

        stream
            .session(StreamConstraint::Loose, "Order", None, &cancel, |session| async move {
                session.append(NewEvent::new(RawPayload::empty()).with_event_type("A"));
                session.append(NewEvent::new(RawPayload::empty()).with_event_type("B"));
                session.append(NewEvent::new(RawPayload::empty()).with_event_type("C"));
                session.commit(&cancel).await
            })
            .await
            .unwrap();

        let events = stream.read(0, Some(1), &cancel).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, "B");
    }

    #[tokio::test]
    async fn cancelled_signal_short_circuits_read() {
        let stream = stream();
        let cancel = CancellationSignal::new();
        cancel.cancel();

        let err = stream.read(0, None, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn cleanup_snapshots_deletes_everything_but_the_newest_kept_set() {
        let snapshot_store = Arc::new(InMemorySnapshotStore::new());
        let stream = EventStream::new(
            ObjectIdentifier::new("order", "o-1"),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryDataStore::new()),
            Arc::new(EventTypeRegistry::new()),
        )
        .with_snapshot_store(snapshot_store.clone())
        .with_snapshot_policy(SnapshotPolicy { keep_snapshots: 1, ..SnapshotPolicy::default() });

        let cancel = CancellationSignal::new();
        stream
            .session(StreamConstraint::Loose, "Order", None, &cancel, |session| async move {
                session.append(NewEvent::new(RawPayload::empty()).with_event_type("OrderCreated"));
                session.commit(&cancel).await
            })
            .await
            .unwrap();

        let doc = stream
            .document_store
            .get(&stream.object_identifier.object_name, &stream.object_identifier.object_id)
            .await
            .unwrap();

        let now = Utc::now();
        for version in [10, 20, 30] {
            snapshot_store
                .put(&doc, Snapshot { version, name: None, data: RawPayload::empty(), aggregate_type: "Order".to_string(), created_at: now })
                .await
                .unwrap();
        }

        let deleted = stream.cleanup_snapshots().await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = snapshot_store.list(&doc).await.unwrap();
        assert_eq!(remaining.iter().map(|s| s.version).collect::<Vec<_>>(), vec![30]);
    }
}

//! The Leased Session (C10): the transactional unit of mutation. Buffers
//! staged events, runs pre/post hooks, commits atomically against the
//! document hash, and publishes notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cancel::CancellationSignal;
use crate::document::{ObjectDocument, SnapshotDescriptor};
use crate::error::Error;
use crate::event::{Event, Metadata, NewEvent, RawPayload, StagedEvent};
use crate::identity::ObjectIdentifier;
use crate::metrics;
use crate::registry::EventTypeRegistry;
use crate::snapshot_policy::SnapshotPolicy;
use crate::store::data::validate_contiguous_append;
use crate::store::snapshot::{Snapshot, SnapshotStore};
use crate::store::{DataStore, DocumentStore};
use crate::upcast;

/// How a [`crate::stream::EventStream::session`] call should treat the
/// object's current active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamConstraint {
    /// Operate on whatever active stream exists, or create one.
    Loose,
    /// Fail with [`Error::not_found`] if the object has no stream yet.
    Existing,
    /// Terminate any existing active stream first and start a fresh one.
    New,
}

/// Read-only context handed to hooks during a commit.
pub struct CommitContext<'a> {
    pub object_identifier: &'a ObjectIdentifier,
    pub document: &'a ObjectDocument,
}

/// Runs synchronously within a commit, before the data store write. May
/// mutate the staged batch (e.g. enrich metadata) or fail the commit
/// outright; a failure aborts the commit and propagates to the caller.
#[async_trait]
pub trait PreAppendAction: Send + Sync {
    async fn run(&self, ctx: &CommitContext<'_>, staged: &mut [StagedEvent]) -> Result<(), Error>;
}

/// Runs after a successful data-store and document-store write. A failure
/// here is logged and swallowed -- it does not fail the commit
/// (at-least-once semantics; implementations must be idempotent).
#[async_trait]
pub trait PostAppendAction: Send + Sync {
    async fn run(&self, ctx: &CommitContext<'_>, committed: &[Event]) -> Result<(), Error>;
}

/// Publishes committed events to external subscribers. Same swallow
/// semantics as [`PostAppendAction`].
#[async_trait]
pub trait Notification: Send + Sync {
    async fn notify(&self, ctx: &CommitContext<'_>, committed: &[Event]) -> Result<(), Error>;
}

/// Supplies a serialized snapshot of the current aggregate state when the
/// snapshot policy decides to fire. Implemented by whatever is folding
/// events (typically [`crate::aggregate::Root`]) and handed to the session
/// at open time.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn capture(&self) -> Result<RawPayload, Error>;
}

/// Collaborators shared by every session opened against one
/// [`crate::stream::EventStream`].
#[derive(Clone)]
pub struct SessionDependencies {
    pub registry: Arc<EventTypeRegistry>,
    pub data_store: Arc<dyn DataStore>,
    pub document_store: Arc<dyn DocumentStore>,
    pub snapshot_store: Option<Arc<dyn SnapshotStore>>,
    pub pre_append: Vec<Arc<dyn PreAppendAction>>,
    pub post_append: Vec<Arc<dyn PostAppendAction>>,
    pub notifications: Vec<Arc<dyn Notification>>,
    pub snapshot_policy: Option<SnapshotPolicy>,
    pub snapshot_timeout: Duration,
}

/// The per-call unit of mutation: buffers new events, runs hooks, and
/// commits atomically against the document hash.
pub struct LeasedSession {
    object_identifier: ObjectIdentifier,
    doc: ObjectDocument,
    deps: SessionDependencies,
    staged: Vec<StagedEvent>,
    aggregate_type: String,
    snapshot_source: Option<Arc<dyn SnapshotSource>>,
}

/// What happened when [`LeasedSession::commit`] ran.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// Committed events with their final `eventVersion`s. Empty if the
    /// commit was a no-op (nothing staged).
    pub committed: Vec<Event>,
    pub new_stream_version: i64,
    pub snapshot_created_at: Option<u32>,
}

impl LeasedSession {
    pub(crate) fn new(object_identifier: ObjectIdentifier, doc: ObjectDocument, deps: SessionDependencies) -> Self {
        Self {
            object_identifier,
            doc,
            deps,
            staged: Vec::new(),
            aggregate_type: "unknown".to_string(),
            snapshot_source: None,
        }
    }

    pub fn with_aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = aggregate_type.into();
        self
    }

    pub fn with_snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshot_source = Some(source);
        self
    }

    pub fn document(&self) -> &ObjectDocument {
        &self.doc
    }

    /// Buffers a new event; assigns
    /// `eventVersion = currentStreamVersion + (staged.len() + 1)`.
    pub fn append(&mut self, request: NewEvent) -> StagedEvent {
        let next_version = self.doc.active.current_stream_version + 1 + self.staged.len() as i64;
        let staged = StagedEvent {
            event_version: next_version as u32,
            request,
        };
        self.staged.push(staged.clone());
        staged
    }

    /// Reads committed events (post-upcast) from the stream; does not see
    /// the staging buffer. `cancel` is checked before the storage read and
    /// before each upcast pass.
    pub async fn read(&self, from: u32, until: Option<u32>, cancel: &CancellationSignal) -> Result<Vec<Event>, Error> {
        cancel.check()?;
        let stored = self
            .deps
            .data_store
            .read(&self.doc, from, until, None)
            .await?
            .unwrap_or_default();

        metrics::record(metrics::scope::STORAGE, metrics::name::EVENTS_READ, stored.len() as i64);

        let mut upcast_events = Vec::with_capacity(stored.len());
        for event in stored {
            cancel.check()?;
            upcast_events.extend(upcast::apply(&self.deps.registry, event)?);
        }
        Ok(upcast_events)
    }

    pub fn is_terminated(&self, stream_identifier: &str) -> bool {
        self.doc.is_terminated(stream_identifier)
    }

    /// Runs the commit protocol: runs pre-append hooks, appends to the
    /// data store, CAS-writes the document, then runs post-append hooks
    /// and notifications. `cancel` is checked before each I/O call;
    /// cancelling between the data-store and document-store writes leaves
    /// the state the next load reconciles, same as an uncancelled crash
    /// at that point.
    pub async fn commit(&mut self, cancel: &CancellationSignal) -> Result<CommitOutcome, Error> {
        cancel.check()?;
        if self.staged.is_empty() {
            return Ok(CommitOutcome {
                committed: Vec::new(),
                new_stream_version: self.doc.active.current_stream_version,
                snapshot_created_at: None,
            });
        }

        if self.doc.active.terminated {
            return Err(Error::stream_terminated(format!(
                "stream {} is terminated",
                self.doc.active.stream_identifier
            )));
        }

        let mut staged = std::mem::take(&mut self.staged);
        {
            let ctx = CommitContext {
                object_identifier: &self.object_identifier,
                document: &self.doc,
            };
            for action in &self.deps.pre_append {
                action.run(&ctx, &mut staged).await?;
            }
        }

        let events = self.materialize_events(&staged);
        validate_contiguous_append(self.doc.active.current_stream_version, &events)?;

        cancel.check()?;
        self.deps.data_store.append(&self.doc, false, events.clone()).await?;
        metrics::record(metrics::scope::STORAGE, metrics::name::EVENTS_APPENDED, events.len() as i64);

        let new_tail = events
            .last()
            .map(|e| i64::from(e.event_version))
            .unwrap_or(self.doc.active.current_stream_version);
        self.doc.active.current_stream_version = new_tail;
        self.doc.active.advance_chunks(new_tail as u32);
        self.doc.advance_hash();

        // NOTE: the data-store write happens before the document-store CAS.
        // `validate_contiguous_append` makes the data-store write idempotent
        // on a document-store retry, so a crash between the two leaves a
        // state the next load reconciles rather than a torn write.
        cancel.check()?;
        self.doc = self.deps.document_store.set(self.doc.clone()).await.map_err(|err| {
            if matches!(err, Error::ConcurrencyConflict { .. }) {
                Error::concurrency_conflict(format!(
                    "document hash advanced concurrently for {}; reload and reconcile against the already-appended events",
                    self.object_identifier
                ))
            } else {
                err
            }
        })?;

        metrics::record(metrics::scope::CORE, metrics::name::COMMITS_TOTAL, 1);
        metrics::record(metrics::scope::CORE, metrics::name::EVENTS_PER_COMMIT, events.len() as i64);

        let ctx = CommitContext {
            object_identifier: &self.object_identifier,
            document: &self.doc,
        };

        for action in &self.deps.post_append {
            let _ = action.run(&ctx, &events).await;
        }
        for notification in &self.deps.notifications {
            let _ = notification.notify(&ctx, &events).await;
        }

        let snapshot_created_at = self.maybe_snapshot(&events).await;

        Ok(CommitOutcome {
            committed: events,
            new_stream_version: new_tail,
            snapshot_created_at,
        })
    }

    fn materialize_events(&self, staged: &[StagedEvent]) -> Vec<Event> {
        staged
            .iter()
            .map(|s| {
                let event_type = s
                    .request
                    .event_type
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());

                let mut event = Event::new(event_type, s.event_version, s.request.payload.clone())
                    .with_schema_version(s.request.schema_version);

                if let Some(action_metadata) = s.request.action_metadata.clone() {
                    event = event.with_action_metadata(action_metadata);
                }
                if let Some(metadata) = merged_metadata(s.request.metadata.clone(), &s.request.external_sequencer) {
                    event = event.with_metadata(metadata);
                }

                event
            })
            .collect()
    }

    /// Consults the snapshot policy inline, bounded by
    /// `deps.snapshot_timeout`. A timeout or failure logs a warning and
    /// does not fail the commit.
    async fn maybe_snapshot(&mut self, committed: &[Event]) -> Option<u32> {
        let policy = self.deps.snapshot_policy.as_ref()?;
        let snapshot_store = self.deps.snapshot_store.clone()?;
        let source = self.snapshot_source.clone()?;

        let total_events = u32::try_from(self.doc.active.current_stream_version + 1).unwrap_or(0);
        let last_snapshot_version = self.doc.active.snapshots_desc().first().map(|s| s.version);
        let events_since_last = match last_snapshot_version {
            Some(v) => total_events.saturating_sub(v + 1),
            None => total_events,
        };
        let last_appended_type = committed.last().map(|e| e.event_type.as_str());

        if !policy.should_snapshot(total_events, events_since_last, last_appended_type) {
            return None;
        }

        let version = self.doc.active.current_stream_version as u32;
        let doc = self.doc.clone();
        let aggregate_type = self.aggregate_type.clone();
        let created_at = chrono::Utc::now();

        let outcome = tokio::time::timeout(self.deps.snapshot_timeout, async move {
            let data = source.capture().await?;
            snapshot_store
                .put(&doc, Snapshot { version, name: None, data, aggregate_type, created_at })
                .await
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                self.doc.active.record_snapshot(SnapshotDescriptor { version, name: None });
                self.doc.advance_hash();
                if let Ok(doc) = self.deps.document_store.set(self.doc.clone()).await {
                    self.doc = doc;
                }
                metrics::record(metrics::scope::CORE, metrics::name::SNAPSHOTS_CREATED, 1);
                Some(version)
            }
            // Snapshot creation failures (backend error or timeout) are
            // swallowed with a warning; the commit has already succeeded.
            Ok(Err(_failure)) | Err(_timed_out) => None,
        }
    }
}

fn merged_metadata(metadata: Option<Metadata>, external_sequencer: &Option<String>) -> Option<Metadata> {
    let mut metadata = metadata.unwrap_or_default();
    if let Some(sequencer) = external_sequencer {
        metadata.insert("externalSequencer".to_string(), sequencer.clone());
    }
    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}

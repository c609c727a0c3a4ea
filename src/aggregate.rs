//! The Aggregate Folder (C12): rebuilds in-memory state from a stream of
//! committed events. Folding is pure and deterministic; snapshot restore
//! always precedes replay.
//!
//! [`Root`] is a thin wrapper gluing a [`Folder`] to an
//! [`crate::stream::EventStream`] so it can supply snapshots back to the
//! session that opened it -- the session has no notion of aggregate state
//! on its own (see [`crate::session::SnapshotSource`]).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cancel::CancellationSignal;
use crate::error::Error;
use crate::event::{Event, RawPayload};
use crate::session::{SnapshotSource, StreamConstraint};
use crate::stream::EventStream;

/// A pure, deterministic state machine driven by folding events.
///
/// `apply` must be a total function of `(self, event)`: folding the same
/// sequence twice from the same starting state yields equal state.
pub trait Aggregate: Default + Send + Sync {
    /// Applies one post-upcast event to `self`.
    fn apply(&mut self, event: &Event);

    /// Serializes current state into a snapshot payload.
    fn to_snapshot(&self) -> Result<RawPayload, Error>;

    /// Restores state from a snapshot payload.
    fn from_snapshot(data: &RawPayload) -> Result<Self, Error>
    where
        Self: Sized;

    /// The name recorded on [`crate::store::snapshot::Snapshot::aggregate_type`].
    fn aggregate_type() -> &'static str;
}

/// Holds in-memory state plus the bookkeeping counters needed to decide
/// when a snapshot is due and how far replay has progressed.
pub struct Folder<A: Aggregate> {
    pub state: A,
    pub events_since_last_snapshot: u32,
    pub total_events_processed: u32,
    pub last_snapshot_version: Option<u32>,
    /// Highest `eventVersion` folded so far. Distinct from
    /// `last_snapshot_version`: used by [`Folder::catch_up`] so a caller can
    /// re-fold only newly-committed events instead of replaying from the
    /// last snapshot every time.
    last_folded_version: Option<u32>,
}

impl<A: Aggregate> Default for Folder<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> Folder<A> {
    pub fn new() -> Self {
        Self {
            state: A::default(),
            events_since_last_snapshot: 0,
            total_events_processed: 0,
            last_snapshot_version: None,
            last_folded_version: None,
        }
    }

    /// Applies one event and advances both counters.
    pub fn fold(&mut self, event: &Event) {
        self.state.apply(event);
        self.total_events_processed += 1;
        self.events_since_last_snapshot += 1;
        self.last_folded_version = Some(event.event_version);
    }

    pub fn fold_many(&mut self, events: &[Event]) {
        for event in events {
            self.fold(event);
        }
    }

    /// Restores state from `data`, sets `lastSnapshotVersion`, and resets
    /// `eventsSinceLastSnapshot`.
    pub fn process_snapshot(&mut self, version: u32, data: &RawPayload) -> Result<(), Error> {
        self.state = A::from_snapshot(data)?;
        self.last_snapshot_version = Some(version);
        self.last_folded_version = Some(version);
        self.events_since_last_snapshot = 0;
        Ok(())
    }

    /// Reads from the stream starting at `(lastSnapshotVersion? + 1)`,
    /// folds everything through `until`, and updates counters.
    pub async fn fold_from_stream(&mut self, stream: &EventStream, until: Option<u32>, cancel: &CancellationSignal) -> Result<(), Error> {
        let from = self.last_snapshot_version.map(|v| v + 1).unwrap_or(0);
        let events = stream.read(from, until, cancel).await?;
        self.fold_many(&events);
        Ok(())
    }

    /// Reads and folds only events after `last_folded_version`, so a long-
    /// lived [`Root`] can stay current without replaying from the last
    /// snapshot on every call.
    pub async fn catch_up(&mut self, stream: &EventStream, until: Option<u32>, cancel: &CancellationSignal) -> Result<(), Error> {
        let from = self.last_folded_version.map(|v| v + 1).unwrap_or(0);
        let events = stream.read(from, until, cancel).await?;
        self.fold_many(&events);
        Ok(())
    }
}

/// Opens an aggregate against `stream`: loads the latest snapshot at or
/// before `target_version` (if any), then replays events in
/// `(snapshotVersion, targetVersion]`. `target_version = None` means
/// "through the current tail".
pub async fn open<A: Aggregate>(stream: &EventStream, target_version: Option<u32>, cancel: &CancellationSignal) -> Result<Folder<A>, Error> {
    cancel.check()?;
    let mut folder = Folder::new();

    if let Some(snapshot) = stream.latest_snapshot(target_version.unwrap_or(u32::MAX)).await? {
        folder.process_snapshot(snapshot.version, &snapshot.data)?;
    }

    folder.fold_from_stream(stream, target_version, cancel).await?;
    Ok(folder)
}

/// Glues a [`Folder`] to the [`EventStream`] it was built from, so it can
/// be handed to [`crate::stream::EventStream::session`] as a
/// [`SnapshotSource`] and receive newly-appended events as they commit.
pub struct Root<A: Aggregate + 'static> {
    stream: EventStream,
    folder: Arc<Mutex<Folder<A>>>,
}

impl<A: Aggregate + 'static> Root<A> {
    /// Opens the aggregate's current state from `stream`.
    pub async fn load(stream: EventStream, cancel: &CancellationSignal) -> Result<Self, Error> {
        let folder = open(&stream, None, cancel).await?;
        Ok(Self {
            stream,
            folder: Arc::new(Mutex::new(folder)),
        })
    }

    /// Runs `body` inside a session opened under `constraint`, then folds
    /// whatever was committed into the in-memory state before returning.
    pub async fn session<F, Fut, R>(&self, constraint: StreamConstraint, cancel: &CancellationSignal, body: F) -> Result<R, Error>
    where
        F: FnOnce(&mut crate::session::LeasedSession) -> Fut,
        Fut: std::future::Future<Output = Result<R, Error>>,
    {
        let snapshot_source: Arc<dyn SnapshotSource> = Arc::new(FolderSnapshotSource {
            folder: Arc::clone(&self.folder),
        });

        let result = self
            .stream
            .session(constraint, A::aggregate_type(), Some(snapshot_source), cancel, body)
            .await?;

        self.refresh(cancel).await?;
        Ok(result)
    }

    pub async fn with_state<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        let guard = self.folder.lock().await;
        f(&guard.state)
    }

    pub async fn refresh(&self, cancel: &CancellationSignal) -> Result<(), Error> {
        let mut guard = self.folder.lock().await;
        guard.catch_up(&self.stream, None, cancel).await
    }
}

struct FolderSnapshotSource<A: Aggregate + 'static> {
    folder: Arc<Mutex<Folder<A>>>,
}

#[async_trait]
impl<A: Aggregate + 'static> SnapshotSource for FolderSnapshotSource<A> {
    async fn capture(&self) -> Result<RawPayload, Error> {
        let guard = self.folder.lock().await;
        guard.state.to_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawPayload;

    #[derive(Default, Clone, PartialEq, Debug)]
    struct Counter {
        total: i64,
    }

    impl Aggregate for Counter {
        fn apply(&mut self, event: &Event) {
            match event.event_type.as_str() {
                "Incremented" => self.total += 1,
                "Decremented" => self.total -= 1,
                _ => {}
            }
        }

        fn to_snapshot(&self) -> Result<RawPayload, Error> {
            RawPayload::from_value(&self.total).map_err(|e| Error::backend(e))
        }

        fn from_snapshot(data: &RawPayload) -> Result<Self, Error> {
            let total: i64 = data.parse().map_err(|e| Error::backend(e))?;
            Ok(Counter { total })
        }

        fn aggregate_type() -> &'static str {
            "Counter"
        }
    }

    fn event(event_type: &str, version: u32) -> Event {
        Event::new(event_type, version, RawPayload::empty())
    }

    #[test]
    fn folding_is_deterministic() {
        let events = vec![event("Incremented", 0), event("Incremented", 1), event("Decremented", 2)];

        let mut a = Folder::<Counter>::new();
        a.fold_many(&events);
        let mut b = Folder::<Counter>::new();
        b.fold_many(&events);

        assert_eq!(a.state, b.state);
        assert_eq!(a.state.total, 1);
        assert_eq!(a.total_events_processed, 3);
        assert_eq!(a.events_since_last_snapshot, 3);
    }

    #[test]
    fn process_snapshot_resets_counter_and_restores_state() {
        let mut folder = Folder::<Counter>::new();
        folder.fold_many(&[event("Incremented", 0), event("Incremented", 1)]);

        let snapshot = folder.state.to_snapshot().unwrap();
        folder.process_snapshot(1, &snapshot).unwrap();

        assert_eq!(folder.state.total, 1);
        assert_eq!(folder.last_snapshot_version, Some(1));
        assert_eq!(folder.events_since_last_snapshot, 0);

        folder.fold(&event("Incremented", 2));
        assert_eq!(folder.state.total, 2);
        assert_eq!(folder.events_since_last_snapshot, 1);
    }
}

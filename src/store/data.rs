//! Data Store contract (C4): reads and appends events for one stream.

use async_trait::async_trait;

use crate::document::ObjectDocument;
use crate::error::Error;
use crate::event::Event;

/// Which physical chunk to address, when the active stream is chunked.
/// `None` means "resolve the chunk(s) spanning the requested version range".
pub type ChunkId = Option<u32>;

/// Implementations reading and appending events for the stream described by
/// one [`ObjectDocument`].
///
/// Payloads are passed through verbatim (never re-quoted). Values larger
/// than the backend's single-row limit MUST be chunked by the
/// implementation (tracked via `payload_chunked` on the physical row, not
/// modeled here since reassembly is internal to the backend) and MAY be
/// compressed; either way, `read` reassembles transparently before
/// returning events to the caller.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Reads events in `[start_version, until_version]` (inclusive on both
    /// ends, ascending `eventVersion`). Returns `Ok(None)` if the stream
    /// does not exist physically yet (distinct from an empty stream that
    /// has been created but never appended to).
    async fn read(
        &self,
        doc: &ObjectDocument,
        start_version: u32,
        until_version: Option<u32>,
        chunk: ChunkId,
    ) -> Result<Option<Vec<Event>>, Error>;

    /// Appends a non-empty batch of events to the stream described by
    /// `doc`.
    ///
    /// Fails with:
    /// - [`Error::invalid_input`] if `events` is empty (`EmptyBatch`);
    /// - [`Error::stream_terminated`] if the stream is terminated;
    /// - [`Error::concurrency_conflict`] if the writer detects a gap or
    ///   overlap in `eventVersion` relative to the stream's current tail.
    ///
    /// `preserve_timestamp`: when true and an event carries its own
    /// `timestamp`, the backend stores that value verbatim instead of
    /// stamping `now()` -- used by migration.
    async fn append(
        &self,
        doc: &ObjectDocument,
        preserve_timestamp: bool,
        events: Vec<Event>,
    ) -> Result<(), Error>;
}

/// Validates the contiguity precondition before handing `events` to a
/// concrete [`DataStore::append`] implementation: a shared helper so every
/// backend enforces gap/overlap detection identically.
pub fn validate_contiguous_append(current_tail_version: i64, events: &[Event]) -> Result<(), Error> {
    if events.is_empty() {
        return Err(Error::invalid_input("append requires a non-empty batch of events"));
    }

    let mut expected = current_tail_version + 1;
    for event in events {
        if i64::from(event.event_version) != expected {
            return Err(Error::concurrency_conflict(format!(
                "expected eventVersion {expected}, found {}",
                event.event_version
            )));
        }
        expected += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawPayload;

    fn event(version: u32) -> Event {
        Event::new("E", version, RawPayload::empty())
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = validate_contiguous_append(-1, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn contiguous_batch_from_fresh_stream_is_accepted() {
        validate_contiguous_append(-1, &[event(0), event(1)]).unwrap();
    }

    #[test]
    fn gap_is_a_conflict() {
        let err = validate_contiguous_append(-1, &[event(1)]).unwrap_err();
        assert!(matches!(err, Error::ConcurrencyConflict { .. }));
    }

    #[test]
    fn overlap_is_a_conflict() {
        let err = validate_contiguous_append(3, &[event(3)]).unwrap_err();
        assert!(matches!(err, Error::ConcurrencyConflict { .. }));
    }
}

//! Abstract storage contracts (C4-C7).
//!
//! These traits describe the interfaces the stream engine depends on; no
//! concrete backend (blob, table, document database, in-memory) ships as
//! part of the core. Reference in-memory doubles used to exercise these
//! contracts in tests live behind the `testing` feature, see
//! [`crate::testing`].

pub mod data;
pub mod document;
pub mod snapshot;
pub mod tag;

pub use data::DataStore;
pub use document::DocumentStore;
pub use snapshot::SnapshotStore;
pub use tag::{DocumentTagStore, StreamTagStore};

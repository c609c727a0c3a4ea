//! Event-sourcing runtime: hash-chained optimistic concurrency over an
//! object-level document, chunked streams, lazy on-read schema upcasting,
//! and snapshot/retention policy engines.
//!
//! The crate ships abstract store contracts (C4-C7) and the engine built
//! on top of them (C2-C3, C8-C12); concrete storage backends, a
//! dependency-injection surface, and encryption-at-rest are out of scope.
//! See [`stream::EventStream`] for the main entry point and
//! [`session::LeasedSession`] for the commit protocol.

pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod identity;
pub mod metrics;
pub mod registry;
pub mod retention;
pub mod session;
pub mod snapshot_policy;
pub mod store;
pub mod stream;
pub mod upcast;

#[cfg(feature = "testing")]
pub mod testing;

pub use error::{Error, Result};

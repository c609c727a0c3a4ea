//! Tag Stores contract (C7): secondary indexes over documents and streams.

use async_trait::async_trait;

use crate::error::Error;
use crate::identity::ObjectIdentifier;

/// Secondary index keyed by an arbitrary tag, resolving to the
/// [`ObjectIdentifier`]s carrying it.
///
/// Used for both the document-tag and stream-tag stores (C7): the two
/// differ only in what a "tag" denotes to the caller (a document-level
/// attribute vs. a per-stream attribute), not in shape.
#[async_trait]
pub trait DocumentTagStore: Send + Sync {
    async fn tag(&self, object: &ObjectIdentifier, tag: &str) -> Result<(), Error>;
    async fn untag(&self, object: &ObjectIdentifier, tag: &str) -> Result<(), Error>;
    async fn find_by_tag(&self, tag: &str) -> Result<Vec<ObjectIdentifier>, Error>;
}

/// See [`DocumentTagStore`]; a distinct trait so backends may choose
/// different physical indexes per tag kind while sharing the same shape.
#[async_trait]
pub trait StreamTagStore: Send + Sync {
    async fn tag(&self, stream_identifier: &str, tag: &str) -> Result<(), Error>;
    async fn untag(&self, stream_identifier: &str, tag: &str) -> Result<(), Error>;
    async fn find_by_tag(&self, tag: &str) -> Result<Vec<String>, Error>;
}

//! Generic contract assertions any [`crate::store::DocumentStore`]
//! implementation should satisfy. Run against the in-memory double in
//! [`crate::testing::memory`]'s own tests; reusable against a concrete
//! backend's tests too.

use crate::document::ANY_HASH;
use crate::error::Error;
use crate::store::DocumentStore;

/// Exercises get/create/CAS semantics against `store`. Panics (via
/// `assert!`) on the first violated expectation.
pub async fn document_store_tests(store: &dyn DocumentStore) {
    let object_name = "contract-order";
    let object_id = crate::testing::random_object_id("doc");

    let missing = store.get(object_name, &object_id).await;
    assert!(matches!(missing, Err(Error::NotFound { .. })), "unknown document should not be found");

    let created = store.get_or_create(object_name, &object_id).await.expect("get_or_create should succeed");
    assert_eq!(created.active.current_stream_version, -1);
    assert!(created.accepts(ANY_HASH), "a freshly created document accepts the sentinel hash");

    let again = store.get_or_create(object_name, &object_id).await.expect("idempotent get_or_create");
    assert_eq!(again.hash, created.hash, "get_or_create is idempotent for an existing document");

    let mut mutated = created.clone();
    mutated.active.current_stream_version = 0;
    mutated.advance_hash();
    let saved = store.set(mutated.clone()).await.expect("CAS with matching prevHash should succeed");
    assert_eq!(saved.hash, mutated.hash);

    let fetched = store.get(object_name, &object_id).await.expect("document should now be found");
    assert_eq!(fetched.hash, saved.hash);

    let mut stale = created.clone();
    stale.active.current_stream_version = 1;
    stale.advance_hash();
    let conflict = store.set(stale).await;
    assert!(matches!(conflict, Err(Error::ConcurrencyConflict { .. })), "stale prevHash must be rejected");
}

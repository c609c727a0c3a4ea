//! Event Type Registry (C2): maps `(eventName, schemaVersion)` to payload
//! type metadata, seeded once per aggregate at stream construction and
//! read-mostly afterwards.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Error;
use crate::upcast::Upcaster;

/// Metadata describing the payload type registered for one
/// `(eventName, schemaVersion)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub rust_type_name: &'static str,
}

impl TypeInfo {
    pub fn new(rust_type_name: &'static str) -> Self {
        Self { rust_type_name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    event_name: String,
    schema_version: u32,
}

/// Resolution outcome of [`EventTypeRegistry::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Known(TypeInfo),
    Unknown,
}

/// Maps `(eventName, schemaVersion)` to [`TypeInfo`], and holds the ordered
/// list of registered [`Upcaster`]s.
///
/// Lookups are O(1); concurrent readers are always safe. Mutation
/// (`register`, `register_upcaster`) is rare and guarded by a single
/// `RwLock`, last-writer-wins on identical re-registration.
#[derive(Default)]
pub struct EventTypeRegistry {
    types: RwLock<HashMap<Key, TypeInfo>>,
    upcasters: RwLock<Vec<Box<dyn Upcaster>>>,
}

impl std::fmt::Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTypeRegistry")
            .field("types", &self.types.read().expect("registry lock poisoned").len())
            .field(
                "upcasters",
                &self.upcasters.read().expect("registry lock poisoned").len(),
            )
            .finish()
    }
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a payload type for `(eventName, schemaVersion)`.
    ///
    /// Idempotent: an identical re-registration succeeds silently. A
    /// conflicting registration (same key, different [`TypeInfo`]) fails
    /// with [`Error::schema_conflict`].
    pub fn register(
        &self,
        event_name: impl Into<String>,
        schema_version: u32,
        type_info: TypeInfo,
    ) -> Result<(), Error> {
        let key = Key {
            event_name: event_name.into(),
            schema_version,
        };
        let mut types = self.types.write().expect("registry lock poisoned");

        match types.get(&key) {
            Some(existing) if *existing == type_info => Ok(()),
            Some(existing) => Err(Error::schema_conflict(format!(
                "event {}@{} already registered as {}, cannot re-register as {}",
                key.event_name, key.schema_version, existing.rust_type_name, type_info.rust_type_name
            ))),
            None => {
                types.insert(key, type_info);
                Ok(())
            }
        }
    }

    pub fn resolve(&self, event_name: &str, schema_version: u32) -> Resolution {
        let key = Key {
            event_name: event_name.to_string(),
            schema_version,
        };
        match self.types.read().expect("registry lock poisoned").get(&key) {
            Some(type_info) => Resolution::Known(type_info.clone()),
            None => Resolution::Unknown,
        }
    }

    /// Appends an upcaster to the end of the registration order. Pipeline
    /// evaluation (`crate::upcast::apply`) tries upcasters in this order.
    pub fn register_upcaster(&self, upcaster: Box<dyn Upcaster>) {
        self.upcasters.write().expect("registry lock poisoned").push(upcaster);
    }

    /// Runs `f` with the current upcaster list under a read lock.
    pub fn with_upcasters<R>(&self, f: impl FnOnce(&[Box<dyn Upcaster>]) -> R) -> R {
        let upcasters = self.upcasters.read().expect("registry lock poisoned");
        f(&upcasters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_identical_registration_succeeds() {
        let registry = EventTypeRegistry::new();
        registry.register("OrderCreated", 1, TypeInfo::new("OrderCreated")).unwrap();
        registry.register("OrderCreated", 1, TypeInfo::new("OrderCreated")).unwrap();
    }

    #[test]
    fn conflicting_registration_fails() {
        let registry = EventTypeRegistry::new();
        registry.register("OrderCreated", 1, TypeInfo::new("OrderCreated")).unwrap();
        let err = registry
            .register("OrderCreated", 1, TypeInfo::new("OrderCreatedV2"))
            .unwrap_err();
        assert!(matches!(err, Error::SchemaConflict { .. }));
    }

    #[test]
    fn unknown_type_resolves_to_unknown() {
        let registry = EventTypeRegistry::new();
        assert_eq!(registry.resolve("Nope", 1), Resolution::Unknown);
    }
}

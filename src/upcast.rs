//! The upcaster pipeline (C3): deterministic, lazy schema evolution applied
//! on read.
//!
//! Upcasters are pure functions: same input, same output, no I/O. The
//! pipeline re-feeds every produced event back through the upcaster list
//! until none of them claim it (a fixed point), fanning a single stored
//! event out into one or more logical events while preserving order and
//! the original `eventVersion`.

use std::collections::HashSet;

use crate::error::Error;
use crate::event::Event;
use crate::metrics;
use crate::registry::EventTypeRegistry;

/// A pure schema-migration step.
///
/// `can_upcast` decides whether this upcaster claims an event; `up_cast`
/// transforms a claimed event into one or more replacement events.
pub trait Upcaster: Send + Sync {
    fn can_upcast(&self, event: &Event) -> bool;

    /// Transforms `event` into its replacement(s). Only called when
    /// `can_upcast(event)` is true. Must not mutate `event_version`
    /// semantics -- callers re-stamp the contiguous position afterwards.
    fn up_cast(&self, event: Event) -> Vec<Event>;
}

/// Runs the fixed-point pipeline over one stored event, returning the fully
/// upcast replacement sequence in order.
///
/// Iterates the registered upcasters in registration order; the first whose
/// `can_upcast` claims the event is applied, and every event it produces is
/// re-fed through the same process. Termination is enforced by a
/// visited-set keyed on `(eventName, schemaVersion)` *per upcaster
/// position*: if the same upcaster would claim an event it already
/// produced at that position, the pipeline fails with
/// [`Error::upcaster_cycle`] instead of looping forever.
pub fn apply(registry: &EventTypeRegistry, event: Event) -> Result<Vec<Event>, Error> {
    registry.with_upcasters(|upcasters| apply_with(upcasters, event))
}

fn apply_with(upcasters: &[Box<dyn Upcaster>], event: Event) -> Result<Vec<Event>, Error> {
    let mut out = Vec::new();
    upcast_one(upcasters, event, &mut HashSet::new(), &mut out)?;
    Ok(out)
}

/// `visited` tracks `(upcaster_index, eventName, schemaVersion)` triples
/// already produced along this event's lineage; revisiting one means the
/// same upcaster, at the same position, claims an event it already
/// produced -- a cycle.
fn upcast_one(
    upcasters: &[Box<dyn Upcaster>],
    event: Event,
    visited: &mut HashSet<(usize, String, u32)>,
    out: &mut Vec<Event>,
) -> Result<(), Error> {
    let claim = upcasters
        .iter()
        .enumerate()
        .find(|(_, upcaster)| upcaster.can_upcast(&event));

    let Some((index, upcaster)) = claim else {
        out.push(event);
        return Ok(());
    };

    let key = (index, event.event_type.clone(), event.schema_version);
    if !visited.insert(key) {
        return Err(Error::upcaster_cycle(format!(
            "upcaster at position {index} does not reach a fixed point for event {}@{}",
            event.event_type, event.schema_version
        )));
    }

    let original_version = event.event_version;
    let from_schema_version = event.schema_version;
    let from_event_type = event.event_type.clone();

    for produced in upcaster.up_cast(event) {
        let mut produced = produced;
        produced.event_version = original_version;

        metrics::record(metrics::scope::CORE, metrics::name::UPCASTS_PERFORMED, 1);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "elfaes::metrics",
            from_version = from_schema_version,
            to_version = produced.schema_version,
            event_type = %from_event_type,
            "upcast performed"
        );

        upcast_one(upcasters, produced, visited, out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawPayload;

    struct AddCustomer;

    impl Upcaster for AddCustomer {
        fn can_upcast(&self, event: &Event) -> bool {
            event.event_type == "order.created" && event.schema_version == 1
        }

        fn up_cast(&self, event: Event) -> Vec<Event> {
            vec![Event::new(
                "order.created",
                event.event_version,
                RawPayload::from_raw_json(r#"{"customer":"unknown"}"#).unwrap(),
            )
            .with_schema_version(2)]
        }
    }

    struct V2ToV3;

    impl Upcaster for V2ToV3 {
        fn can_upcast(&self, event: &Event) -> bool {
            event.event_type == "order.created" && event.schema_version == 2
        }

        fn up_cast(&self, event: Event) -> Vec<Event> {
            vec![Event::new("order.created", event.event_version, event.payload).with_schema_version(3)]
        }
    }

    struct Loop;

    impl Upcaster for Loop {
        fn can_upcast(&self, event: &Event) -> bool {
            event.event_type == "order.created" && event.schema_version == 3
        }

        fn up_cast(&self, event: Event) -> Vec<Event> {
            vec![Event::new(
                "order.created",
                event.event_version,
                RawPayload::from_raw_json(r#"{"different":true}"#).unwrap(),
            )
            .with_schema_version(3)]
        }
    }

    fn event_v1() -> Event {
        Event::new("order.created", 0, RawPayload::from_raw_json(r#"{"orderId":"ORD-001"}"#).unwrap())
    }

    #[test]
    fn single_upcast_reaches_v2() {
        let upcasters: Vec<Box<dyn Upcaster>> = vec![Box::new(AddCustomer)];
        let result = apply_with(&upcasters, event_v1()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].schema_version, 2);
        assert_eq!(result[0].event_version, 0);
    }

    #[test]
    fn chained_upcasters_reach_fixed_point_at_v3() {
        let upcasters: Vec<Box<dyn Upcaster>> = vec![Box::new(AddCustomer), Box::new(V2ToV3)];
        let result = apply_with(&upcasters, event_v1()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].schema_version, 3);
    }

    #[test]
    fn non_terminating_upcaster_is_a_cycle() {
        let upcasters: Vec<Box<dyn Upcaster>> = vec![Box::new(AddCustomer), Box::new(V2ToV3), Box::new(Loop)];
        let err = apply_with(&upcasters, event_v1()).unwrap_err();
        assert!(matches!(err, Error::UpcasterCycle { .. }));
    }

    #[test]
    fn unclaimed_event_passes_through() {
        let upcasters: Vec<Box<dyn Upcaster>> = vec![Box::new(AddCustomer)];
        let other = Event::new("order.shipped", 0, RawPayload::empty());
        let result = apply_with(&upcasters, other.clone()).unwrap();
        assert_eq!(result, vec![other]);
    }

    struct FanOut;

    impl Upcaster for FanOut {
        fn can_upcast(&self, event: &Event) -> bool {
            event.event_type == "order.bulk_created" && event.schema_version == 1
        }

        fn up_cast(&self, event: Event) -> Vec<Event> {
            vec![
                Event::new("order.created", event.event_version, RawPayload::from_raw_json(r#"{"n":1}"#).unwrap())
                    .with_schema_version(2),
                Event::new("order.created", event.event_version, RawPayload::from_raw_json(r#"{"n":2}"#).unwrap())
                    .with_schema_version(2),
            ]
        }
    }

    #[test]
    fn fan_out_preserves_order_and_original_version() {
        let upcasters: Vec<Box<dyn Upcaster>> = vec![Box::new(FanOut)];
        let source = Event::new("order.bulk_created", 5, RawPayload::empty());
        let result = apply_with(&upcasters, source).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|e| e.event_version == 5));
        assert_eq!(result[0].payload.get(), r#"{"n":1}"#);
        assert_eq!(result[1].payload.get(), r#"{"n":2}"#);
    }
}

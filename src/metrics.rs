//! Observability contract: named metrics and trace scopes. This crate
//! only defines the instrumentation *points*; wiring a concrete sink
//! (Prometheus, OpenTelemetry, ...) is out of scope.
//!
//! When the `tracing` feature is disabled, [`record`] is a no-op so call
//! sites don't need `#[cfg(feature = "tracing")]` scattered through the
//! core logic.

/// Counter and histogram names, kept as constants so call sites can't
/// typo a metric name.
pub mod name {
    pub const EVENTS_APPENDED: &str = "events.appended";
    pub const EVENTS_READ: &str = "events.read";
    pub const COMMITS_TOTAL: &str = "commits.total";
    pub const PROJECTIONS_UPDATES: &str = "projections.updates";
    pub const SNAPSHOTS_CREATED: &str = "snapshots.created";
    pub const UPCASTS_PERFORMED: &str = "upcasts.performed";
    pub const CATCHUP_ITEMS_PROCESSED: &str = "catchup.items_processed";

    pub const COMMIT_DURATION: &str = "commit.duration";
    pub const PROJECTION_UPDATE_DURATION: &str = "projection.update.duration";
    pub const STORAGE_READ_DURATION: &str = "storage.read.duration";
    pub const STORAGE_WRITE_DURATION: &str = "storage.write.duration";
    pub const EVENTS_PER_COMMIT: &str = "events_per_commit";
    pub const PROJECTION_EVENTS_FOLDED: &str = "projection.events_folded";
}

/// Trace scopes.
pub mod scope {
    pub const CORE: &str = "core";
    pub const STORAGE: &str = "storage";
    pub const PROJECTIONS: &str = "projections";
}

/// Emits a structured metric observation as a `tracing` event at `DEBUG`
/// level, tagged with the metric name and an integer value. No-op when the
/// `tracing` feature is disabled.
#[cfg(feature = "tracing")]
pub fn record(scope: &'static str, metric: &'static str, value: i64) {
    tracing::debug!(target: "elfaes::metrics", scope, metric, value, "metric observation");
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_variables)]
pub fn record(scope: &'static str, metric: &'static str, value: i64) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_does_not_panic() {
        record(scope::CORE, name::COMMITS_TOTAL, 1);
    }
}

//! Snapshot Policy Engine (C8): decides when to create a snapshot and
//! drives cleanup.

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::error::Error;
use crate::store::snapshot::Snapshot;

/// Count-and-event-driven snapshot trigger policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPolicy {
    /// `0` disables the count trigger.
    pub every: u32,
    pub on_events: HashSet<String>,
    pub keep_snapshots: usize,
    pub max_age: Option<chrono::Duration>,
    pub min_events_before_snapshot: u32,
    pub enabled: bool,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            every: 0,
            on_events: HashSet::new(),
            keep_snapshots: 1,
            max_age: None,
            min_events_before_snapshot: 10,
            enabled: true,
        }
    }
}

impl SnapshotPolicy {
    /// Decides whether a commit should trigger a snapshot.
    pub fn should_snapshot(&self, total_events: u32, events_since_last: u32, last_appended_type: Option<&str>) -> bool {
        if !self.enabled || total_events < self.min_events_before_snapshot {
            return false;
        }

        if let Some(event_type) = last_appended_type {
            if self.on_events.contains(event_type) {
                return true;
            }
        }

        self.every > 0 && events_since_last >= self.every
    }

    /// Decides which of `snapshots` (any order) should be deleted, returning
    /// their versions: every entry beyond `keep_snapshots` when sorted by
    /// version descending, or older than `max_age`, except the newest entry
    /// is never marked.
    pub fn cleanup_candidates(&self, snapshots: &[Snapshot], now: DateTime<Utc>) -> Vec<u32> {
        let mut sorted: Vec<&Snapshot> = snapshots.iter().collect();
        sorted.sort_by(|a, b| b.version.cmp(&a.version));

        sorted
            .into_iter()
            .enumerate()
            .skip(1) // never delete the newest
            .filter(|(index, snapshot)| {
                let beyond_keep_count = *index >= self.keep_snapshots;
                let too_old = self.max_age.map(|max_age| now - snapshot.created_at > max_age).unwrap_or(false);
                beyond_keep_count || too_old
            })
            .map(|(_, snapshot)| snapshot.version)
            .collect()
    }
}

/// Parses duration strings of the form `{n}h|d|w|m|y` (case-insensitive).
/// `m` approximates 30 days, `y` approximates 365 days -- both lossy;
/// calendar-accurate durations are out of scope unless a caller builds
/// `chrono::Duration` directly.
pub fn parse_duration(input: &str) -> Result<ChronoDuration, Error> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_input("empty duration string"));
    }

    let (digits, unit) = input.split_at(input.len() - 1);
    let n: i64 = digits
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid duration: {input}")))?;

    let duration = match unit.to_ascii_lowercase().as_str() {
        "h" => ChronoDuration::hours(n),
        "d" => ChronoDuration::days(n),
        "w" => ChronoDuration::weeks(n),
        "m" => ChronoDuration::days(n * 30),
        "y" => ChronoDuration::days(n * 365),
        _ => return Err(Error::invalid_input(format!("invalid duration unit: {input}"))),
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_never_snapshots() {
        let policy = SnapshotPolicy { enabled: false, every: 1, ..SnapshotPolicy::default() };
        assert!(!policy.should_snapshot(100, 100, None));
    }

    #[test]
    fn below_minimum_events_never_snapshots() {
        let policy = SnapshotPolicy { every: 1, min_events_before_snapshot: 10, ..SnapshotPolicy::default() };
        assert!(!policy.should_snapshot(5, 5, None));
    }

    #[test]
    fn on_events_trigger_overrides_count() {
        let mut policy = SnapshotPolicy { every: 100, min_events_before_snapshot: 10, ..SnapshotPolicy::default() };
        policy.on_events.insert("OrderCompleted".to_string());
        assert!(policy.should_snapshot(120, 1, Some("OrderCompleted")));
    }

    #[test]
    fn count_trigger_fires_after_threshold_events() {
        let policy = SnapshotPolicy { every: 100, min_events_before_snapshot: 10, ..SnapshotPolicy::default() };
        assert!(!policy.should_snapshot(99, 99, None));
        assert!(policy.should_snapshot(100, 100, None));
    }

    #[test]
    fn cleanup_keeps_newest_and_respects_keep_count() {
        use crate::event::RawPayload;

        let policy = SnapshotPolicy { keep_snapshots: 1, ..SnapshotPolicy::default() };
        let now = Utc::now();
        let snapshot = |version| Snapshot {
            version,
            name: None,
            data: RawPayload::empty(),
            aggregate_type: "Order".to_string(),
            created_at: now,
        };
        let snapshots = vec![snapshot(10), snapshot(20), snapshot(30)];
        let candidates = policy.cleanup_candidates(&snapshots, now);
        assert_eq!(candidates, vec![20, 10]);
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("2h").unwrap(), ChronoDuration::hours(2));
        assert_eq!(parse_duration("3d").unwrap(), ChronoDuration::days(3));
        assert_eq!(parse_duration("1w").unwrap(), ChronoDuration::weeks(1));
        assert_eq!(parse_duration("1m").unwrap(), ChronoDuration::days(30));
        assert_eq!(parse_duration("1y").unwrap(), ChronoDuration::days(365));
        assert!(parse_duration("xd").is_err());
        assert!(parse_duration("5q").is_err());
    }
}

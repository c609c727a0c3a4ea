//! Retention Policy Engine (C9): discovers streams violating retention and
//! issues actions; does not itself rewrite events.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Error;

/// What to do with a stream that violates its [`RetentionPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionAction {
    Migrate,
    Delete,
    FlagForReview,
    Archive,
}

/// Per-type retention configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub max_age: Option<Duration>,
    /// `0` disables the event-count trigger.
    pub max_events: u64,
    pub action: RetentionAction,
    pub keep_recent_events: u64,
    pub create_summary_on_migration: bool,
    pub enabled: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: None,
            max_events: 0,
            action: RetentionAction::FlagForReview,
            keep_recent_events: 100,
            create_summary_on_migration: true,
            enabled: true,
        }
    }
}

/// Outcome of [`RetentionPolicy::check_violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    ExceedsMaxAge,
    ExceedsMaxEvents,
    Both,
}

impl RetentionPolicy {
    /// Evaluates whether a stream with `event_count` events, oldest dated
    /// `oldest_event_date`, violates this policy as of `now`.
    pub fn check_violation(&self, event_count: u64, oldest_event_date: DateTime<Utc>, now: DateTime<Utc>) -> Option<Violation> {
        let exceeds_max_events = self.max_events > 0 && event_count > self.max_events;
        let exceeds_max_age = self.max_age.map(|max_age| now - oldest_event_date > max_age).unwrap_or(false);

        match (exceeds_max_age, exceeds_max_events) {
            (true, true) => Some(Violation::Both),
            (true, false) => Some(Violation::ExceedsMaxAge),
            (false, true) => Some(Violation::ExceedsMaxEvents),
            (false, false) => None,
        }
    }
}

/// One discovered retention violation.
#[derive(Debug, Clone)]
pub struct RetentionViolation {
    pub stream_id: String,
    pub object_name: String,
    pub policy: RetentionPolicy,
    pub current_event_count: u64,
    pub oldest_event_date: DateTime<Utc>,
    pub violation_type: Violation,
}

/// Outcome of processing one [`RetentionViolation`] -- the engine records
/// the intended action and success/failure, the actual rewrite is done by
/// a platform-specific collaborator; the engine does not rewrite events
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Succeeded(RetentionAction),
    Failed { action: RetentionAction, reason: String },
}

/// Source of stream metadata the engine pages through while discovering
/// violations. Implemented by a caller-supplied collaborator so the engine
/// stays storage-agnostic.
#[async_trait::async_trait]
pub trait StreamMetadataSource: Send + Sync {
    /// One page of `(object_name, stream_id, event_count, oldest_event_date)`
    /// tuples, plus an opaque continuation token (`None` when exhausted).
    async fn page(
        &self,
        object_name: &str,
        continuation: Option<String>,
    ) -> Result<(Vec<(String, u64, DateTime<Utc>)>, Option<String>), Error>;
}

/// Executes the intended action for one violation. The engine calls this
/// and records the outcome; it performs no rewriting itself.
#[async_trait::async_trait]
pub trait RetentionExecutor: Send + Sync {
    async fn execute(&self, violation: &RetentionViolation) -> Result<(), Error>;
}

/// Discovers violations across the configured object types, paginating via
/// an opaque continuation token, yielding a lazy, cancelable sequence.
pub fn discover_violations<'a>(
    source: &'a dyn StreamMetadataSource,
    object_types: Vec<(String, RetentionPolicy)>,
    cancel: crate::cancel::CancellationSignal,
) -> BoxStream<'a, Result<RetentionViolation, Error>> {
    let now = Utc::now();

    stream::iter(object_types)
        .flat_map(move |(object_name, policy)| {
            let cancel = cancel.clone();
            stream::unfold(
                (source, object_name, policy, None::<String>, false, cancel),
                move |(source, object_name, policy, continuation, exhausted, cancel)| async move {
                    if exhausted || cancel.is_cancelled() {
                        return None;
                    }

                    let page_result = source.page(&object_name, continuation).await;
                    match page_result {
                        Err(err) => Some((
                            stream::iter(vec![Err(err)]),
                            (source, object_name, policy, None, true, cancel),
                        )),
                        Ok((entries, next_continuation)) => {
                            let violations: Vec<Result<RetentionViolation, Error>> = entries
                                .into_iter()
                                .filter_map(|(stream_id, count, oldest)| {
                                    policy
                                        .check_violation(count, oldest, now)
                                        .map(|violation_type| {
                                            Ok(RetentionViolation {
                                                stream_id,
                                                object_name: object_name.clone(),
                                                policy: policy.clone(),
                                                current_event_count: count,
                                                oldest_event_date: oldest,
                                                violation_type,
                                            })
                                        })
                                })
                                .collect();

                            let done = next_continuation.is_none();
                            Some((
                                stream::iter(violations),
                                (source, object_name, policy, next_continuation, done, cancel),
                            ))
                        }
                    }
                },
            )
            .flatten()
        })
        .boxed()
}

/// Dispatches on `violation.policy.action`, delegating the actual work to
/// `executor` and recording the outcome.
pub async fn process_violation(executor: &dyn RetentionExecutor, violation: &RetentionViolation) -> ProcessOutcome {
    match executor.execute(violation).await {
        Ok(()) => ProcessOutcome::Succeeded(violation.policy.action),
        Err(err) => ProcessOutcome::Failed {
            action: violation.policy.action,
            reason: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_violation_flags_age_and_count_thresholds() {
        let policy = RetentionPolicy { max_events: 1000, max_age: Some(Duration::days(30)), ..RetentionPolicy::default() };
        let now = Utc::now();

        assert_eq!(policy.check_violation(500, now - Duration::days(1), now), None);
        assert_eq!(policy.check_violation(1500, now - Duration::days(1), now), Some(Violation::ExceedsMaxEvents));
        assert_eq!(policy.check_violation(500, now - Duration::days(40), now), Some(Violation::ExceedsMaxAge));
        assert_eq!(policy.check_violation(1500, now - Duration::days(40), now), Some(Violation::Both));
    }

    #[test]
    fn disabled_count_trigger_never_flags_max_events() {
        let policy = RetentionPolicy { max_events: 0, ..RetentionPolicy::default() };
        let now = Utc::now();
        assert_eq!(policy.check_violation(u64::MAX, now, now), None);
    }

    struct FakeSource;

    #[async_trait::async_trait]
    impl StreamMetadataSource for FakeSource {
        async fn page(
            &self,
            _object_name: &str,
            continuation: Option<String>,
        ) -> Result<(Vec<(String, u64, DateTime<Utc>)>, Option<String>), Error> {
            if continuation.is_some() {
                return Ok((vec![], None));
            }
            Ok((vec![("order-1".to_string(), 1500, Utc::now())], None))
        }
    }

    struct FakeExecutor;

    #[async_trait::async_trait]
    impl RetentionExecutor for FakeExecutor {
        async fn execute(&self, _violation: &RetentionViolation) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn violation_discovery_feeds_processing_to_completion() {
        let source = FakeSource;
        let policy = RetentionPolicy { max_events: 1000, action: RetentionAction::Migrate, keep_recent_events: 100, ..RetentionPolicy::default() };

        let violations: Vec<_> = discover_violations(&source, vec![("order".to_string(), policy)], crate::cancel::CancellationSignal::new())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, Violation::ExceedsMaxEvents);

        let outcome = process_violation(&FakeExecutor, &violations[0]).await;
        assert_eq!(outcome, ProcessOutcome::Succeeded(RetentionAction::Migrate));
    }
}

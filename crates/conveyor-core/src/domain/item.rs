//! Queue item: one unit of work plus its lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Lifecycle status of a queue item.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Failed -> Pending (retry loop, until the budget runs out)
/// - Pending -> Processing -> Failed -> Dead (budget exhausted)
///
/// Completed and Dead are terminal: the item is never mutated again. A Dead
/// item is deleted from the live namespace and recreated in the DLQ namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// Eligible for processing once `scheduled_for` (if any) has passed.
    Pending,

    /// Currently being executed by the polling loop.
    Processing,

    /// Handler returned a result. Terminal.
    Completed,

    /// Last attempt failed; the retry machinery decides what happens next.
    Failed,

    /// Retry budget exhausted, quarantined in the DLQ. Terminal.
    Dead,
}

impl ItemStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Dead)
    }
}

/// One failure observation: message plus when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The record for one enqueued job.
///
/// Design:
/// - This is the single source of truth for item state; the pending list
///   holds ids only.
/// - All state transitions go through methods, never direct field pokes
///   outside this module's callers.
/// - The whole record is serialized as one JSON value at the store boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Assigned at creation, immutable.
    pub id: Uuid,

    /// Registry lookup key for the handler.
    pub job_type: String,

    /// Opaque payload handed to the handler.
    pub data: Value,

    pub status: ItemStatus,

    /// Failed attempts so far.
    pub retries: u32,

    /// Per-item retry budget.
    pub max_retries: u32,

    /// Accepted at enqueue time; not consulted by the fetch ordering.
    pub priority: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Not eligible for processing before this time (initial delay or
    /// retry backoff).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Caller-supplied auxiliary map; DLQ resubmission records its lineage
    /// here (`retried_from_dlq`, `original_id`, `original_errors`).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorRecord>,

    /// Full failure history, one record per failed attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorRecord>,

    /// Handler return value; present only when Completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_lettered_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn new(job_type: impl Into<String>, data: Value, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            data,
            status: ItemStatus::Pending,
            retries: 0,
            max_retries,
            priority: 0,
            created_at: now,
            updated_at: now,
            scheduled_for: None,
            metadata: Map::new(),
            last_error: None,
            errors: Vec::new(),
            result: None,
            processing_started_at: None,
            completed_at: None,
            dead_lettered_at: None,
        }
    }

    /// Mark as processing and record when the attempt started.
    pub fn mark_processing(&mut self) {
        self.status = ItemStatus::Processing;
        self.processing_started_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Mark as completed with the handler's result. Terminal.
    pub fn mark_completed(&mut self, result: Value) {
        self.status = ItemStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Record one failed attempt: bump the counter, append to the history,
    /// overwrite `last_error`.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        let record = ErrorRecord {
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.retries += 1;
        self.last_error = Some(record.clone());
        self.errors.push(record);
        self.status = ItemStatus::Failed;
        self.updated_at = Utc::now();
    }

    /// Has the retry budget been used up?
    pub fn exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }

    /// Put the item back into the pending set, eligible again at `at`.
    pub fn schedule_retry(&mut self, at: DateTime<Utc>) {
        self.status = ItemStatus::Pending;
        self.scheduled_for = Some(at);
        self.updated_at = Utc::now();
    }

    /// Quarantine the item. Terminal.
    pub fn mark_dead(&mut self) {
        self.status = ItemStatus::Dead;
        self.scheduled_for = None;
        self.dead_lettered_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Is the item eligible for dispatch at `now`?
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == ItemStatus::Pending
            && self.scheduled_for.is_none_or(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn new_item_starts_pending_with_zero_retries() {
        let item = QueueItem::new("send_email", json!({"to": "a@b.c"}), 3);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.retries, 0);
        assert_eq!(item.max_retries, 3);
        assert!(item.errors.is_empty());
        assert!(item.result.is_none());
        assert!(item.is_ready(Utc::now()));
    }

    #[test]
    fn completion_records_result_and_timestamp() {
        let mut item = QueueItem::new("send_email", json!({}), 3);
        item.mark_processing();
        assert_eq!(item.status, ItemStatus::Processing);
        assert!(item.processing_started_at.is_some());

        item.mark_completed(json!({"ok": true}));
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.result, Some(json!({"ok": true})));
        assert!(item.completed_at.is_some());
    }

    #[test]
    fn failures_accumulate_in_order() {
        let mut item = QueueItem::new("send_email", json!({}), 3);
        item.record_failure("first");
        item.record_failure("second");

        assert_eq!(item.retries, 2);
        assert_eq!(item.errors.len(), 2);
        assert_eq!(item.errors[0].message, "first");
        assert_eq!(item.errors[1].message, "second");
        assert_eq!(item.last_error.as_ref().unwrap().message, "second");
        assert!(!item.exhausted());

        item.record_failure("third");
        assert!(item.exhausted());
    }

    #[test]
    fn scheduled_item_is_not_ready_until_due() {
        let mut item = QueueItem::new("send_email", json!({}), 3);
        let now = Utc::now();
        item.schedule_retry(now + chrono::Duration::milliseconds(500));

        assert_eq!(item.status, ItemStatus::Pending);
        assert!(!item.is_ready(now));
        assert!(item.is_ready(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn dead_item_keeps_its_error_history() {
        let mut item = QueueItem::new("send_email", json!({}), 1);
        item.record_failure("boom");
        item.mark_dead();

        assert_eq!(item.status, ItemStatus::Dead);
        assert!(item.dead_lettered_at.is_some());
        assert!(item.scheduled_for.is_none());
        assert_eq!(item.errors.len(), 1);
    }

    #[rstest]
    #[case::completed(ItemStatus::Completed, true)]
    #[case::dead(ItemStatus::Dead, true)]
    #[case::pending(ItemStatus::Pending, false)]
    #[case::processing(ItemStatus::Processing, false)]
    #[case::failed(ItemStatus::Failed, false)]
    fn terminal_states(#[case] status: ItemStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn item_round_trips_through_json_with_priority() {
        let mut item = QueueItem::new("send_email", json!({"to": "a@b.c"}), 5);
        item.priority = 7;
        item.metadata
            .insert("tenant".to_string(), json!("acme"));

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["status"], "PENDING");
        let back: QueueItem = serde_json::from_value(value).unwrap();

        assert_eq!(back.id, item.id);
        assert_eq!(back.priority, 7);
        assert_eq!(back.metadata["tenant"], json!("acme"));
    }
}

//! Dead letter queue manager.
//!
//! Quarantined items live under the `dlq:<name>:*` namespace, which this
//! manager owns exclusively. Items arrive here from the request queue when
//! their retry budget runs out and leave only through manual resubmission,
//! deletion, or purge.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::{QueueError, QueueItem};
use crate::keys;
use crate::queue::{EnqueueOptions, RequestQueue};
use crate::store::Store;

/// Metadata key marking an item resubmitted from the DLQ.
pub const META_RETRIED_FROM_DLQ: &str = "retried_from_dlq";
/// Metadata key holding the quarantined item's id.
pub const META_ORIGINAL_ID: &str = "original_id";
/// Metadata key holding the quarantined item's failure history.
pub const META_ORIGINAL_ERRORS: &str = "original_errors";

pub struct DeadLetterQueue {
    store: Arc<dyn Store>,
}

impl DeadLetterQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Up to `limit` quarantined items for a queue, oldest first.
    pub async fn list(&self, queue_name: &str, limit: usize) -> Result<Vec<QueueItem>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids = self
            .store
            .get_list(&keys::dlq_items(queue_name), 0, limit as i64 - 1)
            .await?;

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(value) = self.store.get(&keys::dlq_item(queue_name, &id)).await? {
                items.push(serde_json::from_value(value)?);
            }
        }
        Ok(items)
    }

    pub async fn get(
        &self,
        queue_name: &str,
        item_id: Uuid,
    ) -> Result<Option<QueueItem>, QueueError> {
        let value = self
            .store
            .get(&keys::dlq_item(queue_name, &item_id.to_string()))
            .await?;
        match value {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Resubmit a quarantined item into a live queue as a brand-new item:
    /// fresh id, fresh retry budget, lineage recorded in its metadata. The
    /// DLQ entry is deleted afterward. Returns the new id.
    pub async fn retry(
        &self,
        queue_name: &str,
        item_id: Uuid,
        queue: &RequestQueue,
    ) -> Result<Uuid, QueueError> {
        let item = self
            .get(queue_name, item_id)
            .await?
            .ok_or(QueueError::ItemNotFound(item_id))?;

        let mut metadata = item.metadata.clone();
        metadata.insert(META_RETRIED_FROM_DLQ.to_string(), json!(true));
        metadata.insert(META_ORIGINAL_ID.to_string(), json!(item_id.to_string()));
        metadata.insert(
            META_ORIGINAL_ERRORS.to_string(),
            serde_json::to_value(&item.errors)?,
        );

        let options = EnqueueOptions::default()
            .priority(item.priority)
            .metadata(metadata);
        let new_id = queue
            .enqueue(&item.job_type, item.data.clone(), options)
            .await?;

        self.delete(queue_name, item_id).await?;
        info!(
            queue = queue_name,
            original = %item_id,
            resubmitted = %new_id,
            "dead-lettered item resubmitted"
        );
        Ok(new_id)
    }

    /// Remove one entry from both the id list and the record store.
    pub async fn delete(&self, queue_name: &str, item_id: Uuid) -> Result<(), QueueError> {
        let id = item_id.to_string();
        self.store
            .remove_from_list(&keys::dlq_items(queue_name), &id)
            .await?;
        self.store.delete(&keys::dlq_item(queue_name, &id)).await?;
        Ok(())
    }

    /// Delete every entry for a queue. Idempotent: purging an empty DLQ is
    /// a no-op.
    pub async fn purge(&self, queue_name: &str) -> Result<(), QueueError> {
        let ids = self
            .store
            .get_list(&keys::dlq_items(queue_name), 0, -1)
            .await?;
        for id in ids {
            self.store
                .remove_from_list(&keys::dlq_items(queue_name), &id)
                .await?;
            self.store.delete(&keys::dlq_item(queue_name, &id)).await?;
        }
        Ok(())
    }

    pub async fn count(&self, queue_name: &str) -> Result<usize, QueueError> {
        Ok(self
            .store
            .list_length(&keys::dlq_items(queue_name))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::domain::ItemStatus;
    use crate::registry::{ProcessError, Processor};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Seed a dead item directly into the DLQ namespace.
    async fn seed_dead_item(store: &Arc<MemoryStore>, queue_name: &str) -> QueueItem {
        let mut item = QueueItem::new("report.generate", serde_json::json!({"week": 7}), 2);
        item.record_failure("first failure");
        item.record_failure("second failure");
        item.mark_dead();

        let id = item.id.to_string();
        store
            .set(
                &keys::dlq_item(queue_name, &id),
                serde_json::to_value(&item).unwrap(),
            )
            .await
            .unwrap();
        store
            .add_to_list(&keys::dlq_items(queue_name), &id)
            .await
            .unwrap();
        item
    }

    fn dlq_over(store: &Arc<MemoryStore>) -> DeadLetterQueue {
        DeadLetterQueue::new(Arc::clone(store) as Arc<dyn Store>)
    }

    #[tokio::test]
    async fn list_get_and_count_see_seeded_items() {
        let store = Arc::new(MemoryStore::new());
        let dlq = dlq_over(&store);

        let first = seed_dead_item(&store, "reports").await;
        let second = seed_dead_item(&store, "reports").await;

        assert_eq!(dlq.count("reports").await.unwrap(), 2);

        let listed = dlq.list("reports", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);

        // bounded by the limit
        assert_eq!(dlq.list("reports", 1).await.unwrap().len(), 1);
        assert!(dlq.list("reports", 0).await.unwrap().is_empty());

        let fetched = dlq.get("reports", first.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ItemStatus::Dead);
        assert_eq!(fetched.errors.len(), 2);

        // other queue names are untouched
        assert_eq!(dlq.count("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_removes_record_and_list_entry() {
        let store = Arc::new(MemoryStore::new());
        let dlq = dlq_over(&store);
        let item = seed_dead_item(&store, "reports").await;

        dlq.delete("reports", item.id).await.unwrap();

        assert_eq!(dlq.count("reports").await.unwrap(), 0);
        assert!(dlq.get("reports", item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_empties_the_queue_and_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let dlq = dlq_over(&store);
        for _ in 0..3 {
            seed_dead_item(&store, "reports").await;
        }

        dlq.purge("reports").await.unwrap();
        assert_eq!(dlq.count("reports").await.unwrap(), 0);

        // second purge is a no-op
        dlq.purge("reports").await.unwrap();
        assert_eq!(dlq.count("reports").await.unwrap(), 0);
    }

    struct OkProcessor;

    #[async_trait]
    impl Processor for OkProcessor {
        async fn run(
            &self,
            _data: &Value,
            _metadata: &Map<String, Value>,
        ) -> Result<Value, ProcessError> {
            Ok(serde_json::json!("done"))
        }
    }

    #[tokio::test]
    async fn retry_resubmits_as_a_fresh_item_with_lineage() {
        let store = Arc::new(MemoryStore::new());
        let dlq = dlq_over(&store);
        let dead = seed_dead_item(&store, "reports").await;

        let queue = RequestQueue::new(
            "reports",
            Arc::clone(&store) as Arc<dyn Store>,
            QueueConfig::default().poll_interval(Duration::from_millis(5)),
        );
        queue.register_processor("report.generate", Arc::new(OkProcessor));

        let new_id = dlq.retry("reports", dead.id, &queue).await.unwrap();
        assert_ne!(new_id, dead.id);

        // the DLQ entry is gone
        assert!(dlq.get("reports", dead.id).await.unwrap().is_none());
        assert_eq!(dlq.count("reports").await.unwrap(), 0);

        // the resubmitted item carries its lineage and a fresh budget
        let value = store
            .get(&keys::item("reports", &new_id.to_string()))
            .await
            .unwrap();
        let resubmitted: QueueItem = match value {
            Some(value) => serde_json::from_value(value).unwrap(),
            None => {
                // already processed; the record is kept after completion
                panic!("resubmitted item record missing");
            }
        };
        assert_eq!(resubmitted.retries, 0);
        assert_eq!(
            resubmitted.metadata[META_RETRIED_FROM_DLQ],
            serde_json::json!(true)
        );
        assert_eq!(
            resubmitted.metadata[META_ORIGINAL_ID],
            serde_json::json!(dead.id.to_string())
        );
        let original_errors = resubmitted.metadata[META_ORIGINAL_ERRORS]
            .as_array()
            .unwrap();
        assert_eq!(original_errors.len(), 2);

        // and it eventually completes through the live queue
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while queue.stats().processed < 1 {
            assert!(tokio::time::Instant::now() < deadline, "item never completed");
            sleep(Duration::from_millis(5)).await;
        }
        queue.stop().await;
    }

    #[tokio::test]
    async fn retry_of_a_missing_item_errors() {
        let store = Arc::new(MemoryStore::new());
        let dlq = dlq_over(&store);
        let queue = RequestQueue::new(
            "reports",
            Arc::clone(&store) as Arc<dyn Store>,
            QueueConfig::default(),
        );

        let missing = Uuid::new_v4();
        let result = dlq.retry("reports", missing, &queue).await;
        assert!(matches!(result, Err(QueueError::ItemNotFound(id)) if id == missing));
    }
}

//! End-to-end demonstration of the queue: a flaky job that recovers through
//! retries, a poison job that lands in the DLQ, and a manual DLQ
//! resubmission after the handler is fixed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conveyor_core::{
    DeadLetterQueue, EnqueueOptions, EventChannel, MemoryStore, ProcessError, Processor,
    QueueConfig, RequestQueue, Store,
};
use serde_json::{Map, Value, json};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

/// Succeeds after failing a configured number of times.
struct FlakyMailer {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl Processor for FlakyMailer {
    async fn run(
        &self,
        data: &Value,
        _metadata: &Map<String, Value>,
    ) -> Result<Value, ProcessError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ProcessError::new(format!("smtp unavailable (left={left})")));
        }
        Ok(json!({ "sent_to": data["to"] }))
    }
}

/// Always fails; its items end up in the DLQ.
struct BrokenExporter;

#[async_trait]
impl Processor for BrokenExporter {
    async fn run(
        &self,
        _data: &Value,
        _metadata: &Map<String, Value>,
    ) -> Result<Value, ProcessError> {
        Err(ProcessError::new("export target unreachable"))
    }
}

/// The fixed replacement, registered later (last registration wins).
struct FixedExporter;

#[async_trait]
impl Processor for FixedExporter {
    async fn run(
        &self,
        data: &Value,
        metadata: &Map<String, Value>,
    ) -> Result<Value, ProcessError> {
        let resubmitted = metadata.contains_key("retried_from_dlq");
        Ok(json!({ "exported": data["report"], "resubmitted": resubmitted }))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let config = QueueConfig::default()
        .poll_interval(Duration::from_millis(20))
        .retry_delay(Duration::from_millis(100))
        .max_retries(3);

    let queue = RequestQueue::new("demo", Arc::clone(&store), config);
    let dlq = DeadLetterQueue::new(Arc::clone(&store));

    queue.subscribe(EventChannel::Retry, |event| {
        println!(
            "  [retry] {} attempt {} failed, next in {:?}",
            event.item.id, event.item.retries, event.delay
        );
    });
    queue.subscribe(EventChannel::DeadLettered, |event| {
        println!("  [dead] {} quarantined after {} attempts", event.item.id, event.item.retries);
    });

    queue.register_processor(
        "email.send",
        Arc::new(FlakyMailer {
            remaining_failures: AtomicU32::new(2),
        }),
    );
    queue.register_processor("report.export", Arc::new(BrokenExporter));

    println!("enqueueing one flaky job and one poison job...");
    queue
        .enqueue("email.send", json!({"to": "user@example.com"}), EnqueueOptions::default())
        .await
        .expect("enqueue failed");
    let poison_id = queue
        .enqueue("report.export", json!({"report": "weekly"}), EnqueueOptions::default())
        .await
        .expect("enqueue failed");

    // wait for both to settle: one completed, one dead-lettered
    loop {
        let stats = queue.stats();
        if stats.processed >= 1 && stats.dead_lettered >= 1 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    println!("stats after first round: {:?}", queue.stats());

    let quarantined = dlq.list("demo", 10).await.expect("dlq list failed");
    println!(
        "dlq holds {} item(s); last error: {:?}",
        quarantined.len(),
        quarantined[0].last_error.as_ref().map(|e| &e.message)
    );

    // fix the handler and resubmit the quarantined item
    queue.register_processor("report.export", Arc::new(FixedExporter));
    let new_id = dlq
        .retry("demo", poison_id, &queue)
        .await
        .expect("dlq retry failed");
    println!("resubmitted {poison_id} as {new_id}");

    loop {
        if queue.stats().processed >= 2 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    println!("final stats: {:?}", queue.stats());
    println!("dlq count: {}", dlq.count("demo").await.expect("dlq count failed"));

    queue.stop().await;
}

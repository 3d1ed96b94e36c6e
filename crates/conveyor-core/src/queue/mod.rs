//! Request queue: enqueue path, polling loop, and the retry/backoff state
//! machine.

pub(crate) mod retry;
mod stats;

pub use stats::StatsSnapshot;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::domain::{QueueError, QueueItem};
use crate::events::{EventBus, EventChannel, QueueEvent};
use crate::keys;
use crate::queue::retry::RetryPolicy;
use crate::queue::stats::QueueStats;
use crate::registry::{Processor, ProcessorRegistry};
use crate::store::Store;

/// Per-enqueue overrides.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Override the queue's default retry budget.
    pub max_retries: Option<u32>,

    /// Scheduling hint; persisted but not consulted by the fetch ordering.
    pub priority: i64,

    /// Initial delay before the item becomes eligible.
    pub delay: Option<Duration>,

    pub metadata: Map<String, Value>,
}

impl EnqueueOptions {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Everything the polling task needs, shared between the queue handle and
/// the spawned loop.
struct QueueCore {
    name: String,
    store: Arc<dyn Store>,
    config: QueueConfig,
    retry_policy: RetryPolicy,
    registry: ProcessorRegistry,
    stats: QueueStats,
    events: EventBus,
}

/// One named queue: accepts items, runs the polling loop, and drives the
/// per-item retry state machine.
///
/// Construct once in the host's startup code and pass by reference to
/// anything that needs to enqueue; there is no process-wide singleton.
///
/// Single consumer only: the store contract has no atomic claim step, so two
/// instances polling the same queue name against a shared store can both
/// pick up the same item.
pub struct RequestQueue {
    core: Arc<QueueCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl RequestQueue {
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>, config: QueueConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            core: Arc::new(QueueCore {
                name: name.into(),
                store,
                retry_policy: config.retry_policy(),
                config,
                registry: ProcessorRegistry::new(),
                stats: QueueStats::default(),
                events: EventBus::new(),
            }),
            worker: Mutex::new(None),
            shutdown,
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Persist a new Pending item and append its id to the pending list.
    /// Starts the polling loop if it is idle. Fire-and-forget: processing
    /// failures never come back through this call.
    pub async fn enqueue(
        &self,
        job_type: &str,
        data: Value,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let max_retries = options.max_retries.unwrap_or(self.core.config.max_retries);
        let mut item = QueueItem::new(job_type, data, max_retries);
        item.priority = options.priority;
        item.metadata = options.metadata;
        item.scheduled_for = options
            .delay
            .map(|d| Utc::now() + chrono::Duration::milliseconds(d.as_millis() as i64));

        let id = item.id;
        let value = serde_json::to_value(&item)?;
        self.core
            .store
            .set(&keys::item(&self.core.name, &id.to_string()), value)
            .await?;
        self.core
            .store
            .add_to_list(&keys::pending(&self.core.name), &id.to_string())
            .await?;

        debug!(queue = %self.core.name, item = %id, job_type, "item enqueued");
        self.core.events.emit(&QueueEvent::enqueued(item));
        self.start();

        Ok(id)
    }

    /// Associate a handler with a job type. Later registration wins.
    pub fn register_processor(&self, job_type: &str, handler: Arc<dyn Processor>) {
        self.core.registry.register(job_type, handler);
    }

    /// Spawn the polling loop if it is not already running.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap();
        let running = worker.as_ref().is_some_and(|handle| !handle.is_finished());
        if running {
            return;
        }

        self.shutdown.send_replace(false);
        let core = Arc::clone(&self.core);
        let shutdown_rx = self.shutdown.subscribe();
        info!(queue = %core.name, "starting polling loop");
        *worker = Some(tokio::spawn(poll_loop(core, shutdown_rx)));
    }

    /// Signal the polling loop to exit after its current iteration and wait
    /// for it. Items already dispatched in the current batch run to
    /// completion.
    pub async fn stop(&self) {
        let handle = { self.worker.lock().unwrap().take() };
        if let Some(handle) = handle {
            let _ = self.shutdown.send(true);
            let _ = handle.await;
            info!(queue = %self.core.name, "polling loop stopped");
        }
    }

    /// Cumulative counters since construction.
    pub fn stats(&self) -> StatsSnapshot {
        self.core.stats.snapshot()
    }

    /// Subscribe to one notification channel. Delivery is synchronous, in
    /// registration order; a panicking subscriber is isolated and logged.
    pub fn subscribe(
        &self,
        channel: EventChannel,
        subscriber: impl Fn(&QueueEvent) + Send + Sync + 'static,
    ) {
        self.core.events.subscribe(channel, subscriber);
    }

    /// Current pending-list length, for host monitoring. Includes retrying
    /// and not-yet-due items.
    pub async fn pending_len(&self) -> Result<usize, QueueError> {
        Ok(self
            .core
            .store
            .list_length(&keys::pending(&self.core.name))
            .await?)
    }
}

/// One cooperative polling task per queue instance. The shutdown signal is
/// checked once per iteration; the batch in flight is always joined before
/// the check.
async fn poll_loop(core: Arc<QueueCore>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match run_iteration(&core).await {
            Ok(dispatched) if dispatched > 0 => {}
            Ok(_) => {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = sleep(core.config.poll_interval) => {}
                }
            }
            Err(error) => {
                // Store-level failure: pause the whole queue, then resume.
                error!(queue = %core.name, %error, "queue iteration failed; backing off");
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = sleep(core.config.error_cooldown) => {}
                }
            }
        }
    }
}

/// Fetch a bounded window of pending ids, load and filter them, and dispatch
/// the ready ones concurrently. Returns how many were dispatched.
async fn run_iteration(core: &Arc<QueueCore>) -> Result<usize, QueueError> {
    let pending_key = keys::pending(&core.name);
    let window_end = core.config.batch_size as i64 - 1;
    let ids = core.store.get_list(&pending_key, 0, window_end).await?;
    if ids.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    let mut ready = Vec::new();
    for id in ids {
        let Some(value) = core.store.get(&keys::item(&core.name, &id)).await? else {
            // Stale id with no backing record; drop it from the list.
            core.store.remove_from_list(&pending_key, &id).await?;
            continue;
        };
        let item: QueueItem = serde_json::from_value(value)?;
        if !item.is_ready(now) {
            continue;
        }
        if !core.registry.contains(&item.job_type) {
            // Not an error: the item stays Pending until someone registers
            // a processor for this type.
            debug!(
                queue = %core.name,
                item = %item.id,
                job_type = %item.job_type,
                "no processor registered; leaving item pending"
            );
            continue;
        }
        ready.push(item);
    }

    if ready.is_empty() {
        return Ok(0);
    }

    let dispatched = ready.len();
    debug!(queue = %core.name, count = dispatched, "dispatching batch");

    // Fan out, then join all: one slow or failing item cannot block its
    // siblings, and nothing escapes the batch as an error.
    let futures = ready.into_iter().map(|item| {
        let core = Arc::clone(core);
        async move { process_item(&core, item).await }
    });
    join_all(futures).await;

    Ok(dispatched)
}

/// Run the handler for one item under the processing timeout and settle the
/// outcome: Completed, retry with backoff, or dead-lettered.
async fn process_item(core: &Arc<QueueCore>, mut item: QueueItem) {
    let Some(handler) = core.registry.get(&item.job_type) else {
        return;
    };

    item.mark_processing();
    if let Err(error) = persist(core, &item).await {
        error!(queue = %core.name, item = %item.id, %error, "failed to mark item as processing");
        return;
    }

    let outcome = timeout(
        core.config.processing_timeout,
        handler.run(&item.data, &item.metadata),
    )
    .await;

    match outcome {
        Ok(Ok(result)) => complete_item(core, item, result).await,
        Ok(Err(error)) => handle_failure(core, item, error.to_string()).await,
        Err(_) => {
            // The handler future is dropped here; side effects it already
            // performed are not rolled back.
            let message = format!(
                "processing timed out after {:?}",
                core.config.processing_timeout
            );
            handle_failure(core, item, message).await;
        }
    }
}

async fn complete_item(core: &Arc<QueueCore>, mut item: QueueItem, result: Value) {
    item.mark_completed(result);
    if let Err(error) = persist(core, &item).await {
        error!(queue = %core.name, item = %item.id, %error, "failed to persist completed item");
        return;
    }
    if let Err(error) = core
        .store
        .remove_from_list(&keys::pending(&core.name), &item.id.to_string())
        .await
    {
        error!(queue = %core.name, item = %item.id, %error, "failed to remove completed item from pending list");
    }

    core.stats.record_processed();
    debug!(queue = %core.name, item = %item.id, "item completed");
    core.events.emit(&QueueEvent::completed(item));
}

/// The retry/backoff state machine: either schedule another attempt or move
/// the item into the DLQ namespace.
async fn handle_failure(core: &Arc<QueueCore>, mut item: QueueItem, message: String) {
    item.record_failure(message);

    if item.exhausted() {
        dead_letter_item(core, item).await;
    } else {
        let delay = core.retry_policy.next_delay(item.retries);
        item.schedule_retry(Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64));
        if let Err(error) = persist(core, &item).await {
            error!(queue = %core.name, item = %item.id, %error, "failed to persist retry state");
            return;
        }

        core.stats.record_retried();
        warn!(
            queue = %core.name,
            item = %item.id,
            retries = item.retries,
            ?delay,
            "attempt failed; retry scheduled"
        );
        // The id keeps its position in the pending list; the item becomes
        // eligible again once `scheduled_for` elapses.
        core.events.emit(&QueueEvent::retry(item, delay));
    }
}

/// Delete the item from the live namespace and recreate it under the DLQ
/// namespace.
async fn dead_letter_item(core: &Arc<QueueCore>, mut item: QueueItem) {
    item.mark_dead();
    let id = item.id.to_string();

    let value = match serde_json::to_value(&item) {
        Ok(value) => value,
        Err(error) => {
            error!(queue = %core.name, item = %id, %error, "failed to encode dead item");
            return;
        }
    };

    let result = async {
        core.store.set(&keys::dlq_item(&core.name, &id), value).await?;
        core.store.add_to_list(&keys::dlq_items(&core.name), &id).await?;
        core.store.delete(&keys::item(&core.name, &id)).await?;
        core.store
            .remove_from_list(&keys::pending(&core.name), &id)
            .await
    }
    .await;
    if let Err(error) = result {
        error!(queue = %core.name, item = %id, %error, "failed to move item to dead letter queue");
        return;
    }

    core.stats.record_failed();
    core.stats.record_dead_lettered();
    warn!(
        queue = %core.name,
        item = %id,
        job_type = %item.job_type,
        retries = item.retries,
        "retry budget exhausted; item dead-lettered"
    );
    core.events.emit(&QueueEvent::dead_lettered(item));
}

async fn persist(core: &QueueCore, item: &QueueItem) -> Result<(), QueueError> {
    let value = serde_json::to_value(item)?;
    core.store
        .set(&keys::item(&core.name, &item.id.to_string()), value)
        .await?;
    Ok(())
}

//! conveyor-core
//!
//! A reliable asynchronous job queue with a dead letter queue.
//!
//! # Module map
//! - **domain**: the queue item record, its lifecycle state machine, and
//!   error types
//! - **store**: key/value + ordered-list persistence port, with in-memory
//!   and Redis backends
//! - **queue**: the request queue (enqueue path, polling loop, retry/backoff
//!   state machine)
//! - **dlq**: the dead letter queue manager (inspect, resubmit, purge)
//! - **registry**: job type -> handler mapping
//! - **events**: the notification surface (`enqueued`, `completed`, `retry`,
//!   `dead_lettered`)
//! - **config**: queue tuning knobs
//!
//! # Delivery model
//! At-least-once: a job is attempted until it succeeds or exhausts its retry
//! budget, and a timed-out attempt may have already produced side effects.
//! Handlers must be idempotent. Items that run out of budget are quarantined
//! in the DLQ for inspection and manual resubmission.
//!
//! # Deployment model
//! One active consumer per queue name. The store contract has no atomic
//! claim primitive, so pointing two instances at the same shared backend can
//! double-process items.

pub mod config;
pub mod dlq;
pub mod domain;
pub mod events;
pub(crate) mod keys;
pub mod queue;
pub mod registry;
pub mod store;

pub use config::QueueConfig;
pub use dlq::DeadLetterQueue;
pub use domain::{ErrorRecord, ItemStatus, QueueError, QueueItem};
pub use events::{EventChannel, QueueEvent};
pub use queue::{EnqueueOptions, RequestQueue, StatsSnapshot};
pub use registry::{ProcessError, Processor};
pub use store::{MemoryStore, RedisStore, Store, StoreError};

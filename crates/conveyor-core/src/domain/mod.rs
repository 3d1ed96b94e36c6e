//! Domain model: the queue item record, its lifecycle state machine, and
//! the crate error types.

pub mod error;
pub mod item;

pub use error::QueueError;
pub use item::{ErrorRecord, ItemStatus, QueueItem};

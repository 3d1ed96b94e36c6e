use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Errors surfaced by the queue's own API (enqueue, DLQ operations, ...).
///
/// Handler failures never show up here: those are recovered locally by the
/// retry machinery and only become visible as DLQ records and counters.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("item codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("item {0} not found")]
    ItemNotFound(Uuid),
}

//! Persistence port: key/value records plus ordered id lists.
//!
//! The store is the only shared mutable resource in the system. It is
//! injected into both the request queue and the DLQ manager; neither owns it.
//!
//! The contract deliberately has no claim/compare-and-swap primitive, so a
//! queue name must have a single active consumer. Fetching pending ids and
//! marking an item as processing are separate operations; two instances
//! sharing one backend can both pick up the same id.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Store port. Every backend must implement these seven operations with the
/// same semantics; the in-memory backend is the reference.
///
/// List slices follow Redis LRANGE conventions: `start`/`end` are inclusive,
/// negative indices count from the tail, and `end = -1` means "to the tail".
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert a JSON record.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Append an id to an ordered list. Insertion order is the only ordering
    /// guarantee.
    async fn add_to_list(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove the first occurrence of `value`.
    async fn remove_from_list(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get_list(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>, StoreError>;

    async fn list_length(&self, key: &str) -> Result<usize, StoreError>;
}

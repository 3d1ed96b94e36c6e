//! Redis-backed store for multi-instance deployments.
//!
//! Records are stored as JSON strings; ordered lists map directly onto Redis
//! lists (RPUSH / LREM / LRANGE / LLEN), which already follow the contract's
//! slice semantics.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use serde_json::Value;

use super::{Store, StoreError};

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&value)?;
        conn.set::<_, _, ()>(key, payload).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(key).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn add_to_list(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn remove_from_list(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.lrem::<_, _, ()>(key, 1, value).await?;
        Ok(())
    }

    async fn get_list(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.lrange(key, start as isize, end as isize).await?;
        Ok(ids)
    }

    async fn list_length(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }
}

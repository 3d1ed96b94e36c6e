//! In-memory store implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Store, StoreError};

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, Value>,
    lists: HashMap<String, Vec<String>>,
}

/// Map-backed store for single-instance deployments. Contents are lost on
/// restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolve a Redis-style inclusive range against a list of `len` entries.
/// Returns None when the range is empty.
fn resolve_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if start > end || start >= len || end < 0 {
        return None;
    }
    Some((start as usize, end as usize))
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.values.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.values.remove(key);
        Ok(())
    }

    async fn add_to_list(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn remove_from_list(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(list) = state.lists.get_mut(key)
            && let Some(pos) = list.iter().position(|v| v == value)
        {
            list.remove(pos);
        }
        Ok(())
    }

    async fn get_list(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };
        let Some((start, end)) = resolve_range(list.len(), start, end) else {
            return Ok(Vec::new());
        };
        Ok(list[start..=end].to_vec())
    }

    async fn list_length(&self, key: &str) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state.lists.get(key).map_or(0, |l| l.len()))
    }
}

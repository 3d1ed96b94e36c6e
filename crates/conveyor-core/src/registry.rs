//! Processor registry: job type -> handler.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Error returned (or synthesized, for timeouts) by a failed handler run.
/// It is recorded in the item's failure history, never propagated to the
/// enqueuing caller.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProcessError {
    pub message: String,
}

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ProcessError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ProcessError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// A handler for one job type.
///
/// Processors must be idempotent: delivery is at-least-once, and a timed-out
/// attempt may still have produced side effects before being dropped.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn run(&self, data: &Value, metadata: &Map<String, Value>)
    -> Result<Value, ProcessError>;
}

/// Type -> handler map owned by the request queue.
///
/// Registration is last-wins: registering a second handler for the same type
/// silently replaces the first.
#[derive(Default)]
pub(crate) struct ProcessorRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Processor>>>,
}

impl ProcessorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, job_type: &str, handler: Arc<dyn Processor>) {
        let mut handlers = self.handlers.write().unwrap();
        handlers.insert(job_type.to_string(), handler);
    }

    pub(crate) fn get(&self, job_type: &str) -> Option<Arc<dyn Processor>> {
        let handlers = self.handlers.read().unwrap();
        handlers.get(job_type).cloned()
    }

    pub(crate) fn contains(&self, job_type: &str) -> bool {
        let handlers = self.handlers.read().unwrap();
        handlers.contains_key(job_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(&'static str);

    #[async_trait]
    impl Processor for Fixed {
        async fn run(
            &self,
            _data: &Value,
            _metadata: &Map<String, Value>,
        ) -> Result<Value, ProcessError> {
            Ok(json!(self.0))
        }
    }

    #[tokio::test]
    async fn later_registration_wins() {
        let registry = ProcessorRegistry::new();
        registry.register("send_email", Arc::new(Fixed("old")));
        registry.register("send_email", Arc::new(Fixed("new")));

        let handler = registry.get("send_email").unwrap();
        let result = handler.run(&json!({}), &Map::new()).await.unwrap();
        assert_eq!(result, json!("new"));
    }

    #[test]
    fn unknown_type_is_absent() {
        let registry = ProcessorRegistry::new();
        assert!(!registry.contains("missing"));
        assert!(registry.get("missing").is_none());
    }
}

//! Notification surface: four named channels, synchronous delivery.
//!
//! Subscribers run inline on the emitting task, in registration order. A
//! panicking subscriber is isolated and logged; it never aborts the emitting
//! operation.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::RwLock;
use std::time::Duration;

use tracing::warn;

use crate::domain::QueueItem;

/// The four notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    Enqueued,
    Completed,
    Retry,
    DeadLettered,
}

/// One notification: the affected item, plus the computed backoff delay on
/// the Retry channel.
#[derive(Debug, Clone)]
pub struct QueueEvent {
    pub channel: EventChannel,
    pub item: QueueItem,
    pub delay: Option<Duration>,
}

impl QueueEvent {
    pub(crate) fn enqueued(item: QueueItem) -> Self {
        Self {
            channel: EventChannel::Enqueued,
            item,
            delay: None,
        }
    }

    pub(crate) fn completed(item: QueueItem) -> Self {
        Self {
            channel: EventChannel::Completed,
            item,
            delay: None,
        }
    }

    pub(crate) fn retry(item: QueueItem, delay: Duration) -> Self {
        Self {
            channel: EventChannel::Retry,
            item,
            delay: Some(delay),
        }
    }

    pub(crate) fn dead_lettered(item: QueueItem) -> Self {
        Self {
            channel: EventChannel::DeadLettered,
            item,
            delay: None,
        }
    }
}

type Subscriber = Box<dyn Fn(&QueueEvent) + Send + Sync>;

/// Publish/subscribe registry keyed by channel.
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: RwLock<HashMap<EventChannel, Vec<Subscriber>>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(
        &self,
        channel: EventChannel,
        subscriber: impl Fn(&QueueEvent) + Send + Sync + 'static,
    ) {
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers
            .entry(channel)
            .or_default()
            .push(Box::new(subscriber));
    }

    pub(crate) fn emit(&self, event: &QueueEvent) {
        let subscribers = self.subscribers.read().unwrap();
        let Some(list) = subscribers.get(&event.channel) else {
            return;
        };
        for subscriber in list {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                warn!(
                    channel = ?event.channel,
                    item = %event.item.id,
                    "event subscriber panicked; continuing"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn item() -> QueueItem {
        QueueItem::new("noop", json!({}), 3)
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(EventChannel::Completed, move |_| {
                seen.lock().unwrap().push(label);
            });
        }

        bus.emit(&QueueEvent::completed(item()));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn channels_are_independent() {
        let bus = EventBus::new();
        let retries = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&retries);
        bus.subscribe(EventChannel::Retry, move |event| {
            assert!(event.delay.is_some());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&QueueEvent::completed(item()));
        assert_eq!(retries.load(Ordering::SeqCst), 0);

        bus.emit(&QueueEvent::retry(item(), Duration::from_millis(100)));
        assert_eq!(retries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_block_later_ones() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventChannel::DeadLettered, |_| {
            panic!("subscriber bug");
        });
        let counter = Arc::clone(&reached);
        bus.subscribe(EventChannel::DeadLettered, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&QueueEvent::dead_lettered(item()));
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }
}

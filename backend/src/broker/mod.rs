//! In-process pub/sub broker for route event streams.
//!
//! Topics are route ids. Publishing is best-effort and non-blocking: a
//! subscriber whose channel is full simply misses that event, so slow
//! consumers lose messages and publishers never block. The subscription map
//! mutex is held only across constant-time operations.
//!
//! A distributed implementation of [`EventBroker`] must preserve the same
//! contract: per-topic ordering is not guaranteed across nodes and
//! consumers must tolerate drops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// Channel capacity per in-process subscriber.
const SUBSCRIBER_CAPACITY: usize = 8;

/// One event published to a topic.
#[derive(Debug, Clone)]
pub struct BrokerEvent {
    pub event_type: String,
    pub data: Value,
}

impl BrokerEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// Identifier of one subscriber registration within a topic.
pub type SubscriberId = u64;

/// A live subscription: the id used for removal plus the receiving end.
pub struct BrokerSubscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<BrokerEvent>,
}

/// Broker capability: subscribe, unsubscribe, publish.
pub trait EventBroker: Send + Sync {
    /// Register a bounded subscriber channel for the topic.
    fn subscribe(&self, topic: &str) -> BrokerSubscription;
    /// Remove a subscriber; idempotent.
    fn unsubscribe(&self, topic: &str, id: SubscriberId);
    /// Best-effort fanout to every current subscriber of the topic.
    fn publish(&self, topic: &str, event: BrokerEvent);
}

/// Process-wide topic -> subscriber fanout backed by bounded channels.
#[derive(Default)]
pub struct InProcessBroker {
    next_id: AtomicU64,
    topics: Mutex<HashMap<String, Vec<(SubscriberId, mpsc::Sender<BrokerEvent>)>>>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(u64, mpsc::Sender<BrokerEvent>)>>> {
        match self.topics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of live subscribers for a topic; test and metrics helper.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().get(topic).map_or(0, Vec::len)
    }
}

impl EventBroker for InProcessBroker {
    fn subscribe(&self, topic: &str) -> BrokerSubscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(topic.to_owned())
            .or_default()
            .push((id, sender));
        BrokerSubscription { id, receiver }
    }

    fn unsubscribe(&self, topic: &str, id: SubscriberId) {
        let mut topics = self.lock();
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.retain(|(subscriber, _)| *subscriber != id);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
    }

    fn publish(&self, topic: &str, event: BrokerEvent) {
        let topics = self.lock();
        let Some(subscribers) = topics.get(topic) else {
            return;
        };
        for (id, sender) in subscribers {
            if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(event.clone()) {
                warn!(topic, subscriber = id, "subscriber channel full, event dropped");
            }
        }
    }
}

/// RAII guard that unsubscribes its registration on drop, so streaming
/// handlers clean up when the client goes away.
pub struct SubscriberGuard {
    broker: Arc<dyn EventBroker>,
    topic: String,
    id: SubscriberId,
}

impl SubscriberGuard {
    pub fn new(broker: Arc<dyn EventBroker>, topic: String, id: SubscriberId) -> Self {
        Self { broker, topic, id }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.broker.unsubscribe(&self.topic, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let broker = InProcessBroker::new();
        let mut first = broker.subscribe("route-1");
        let mut second = broker.subscribe("route-1");

        broker.publish("route-1", BrokerEvent::new("stop.advanced", json!({"seq": 1})));

        let event = first.receiver.recv().await.expect("first subscriber");
        assert_eq!(event.event_type, "stop.advanced");
        let event = second.receiver.recv().await.expect("second subscriber");
        assert_eq!(event.data, json!({"seq": 1}));
    }

    #[rstest]
    #[tokio::test]
    async fn full_subscriber_drops_events_without_blocking() {
        let broker = InProcessBroker::new();
        let mut subscription = broker.subscribe("route-1");

        for seq in 0..20 {
            broker.publish("route-1", BrokerEvent::new("tick", json!({ "seq": seq })));
        }

        // Only the first eight fit; the publisher never blocked.
        let mut received = 0;
        while let Ok(event) = subscription.receiver.try_recv() {
            assert_eq!(event.event_type, "tick");
            received += 1;
        }
        assert_eq!(received, 8);
    }

    #[rstest]
    fn unsubscribe_is_idempotent_and_prunes_topics() {
        let broker = InProcessBroker::new();
        let subscription = broker.subscribe("route-1");
        assert_eq!(broker.subscriber_count("route-1"), 1);

        broker.unsubscribe("route-1", subscription.id);
        broker.unsubscribe("route-1", subscription.id);
        assert_eq!(broker.subscriber_count("route-1"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn guard_unsubscribes_on_drop() {
        let concrete = Arc::new(InProcessBroker::new());
        let broker: Arc<dyn EventBroker> = concrete.clone();

        let subscription = broker.subscribe("route-9");
        let guard = SubscriberGuard::new(broker.clone(), "route-9".to_owned(), subscription.id);
        assert_eq!(concrete.subscriber_count("route-9"), 1);
        drop(guard);
        assert_eq!(concrete.subscriber_count("route-9"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn closed_receiver_does_not_panic_publisher() {
        let broker = InProcessBroker::new();
        let subscription = broker.subscribe("route-1");
        drop(subscription.receiver);
        broker.publish("route-1", BrokerEvent::new("tick", json!({})));
    }
}

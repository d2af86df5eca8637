//! Event fanout and webhook delivery pipeline.
//!
//! [`Publisher`] renders event envelopes and enqueues deduplicated delivery
//! rows; [`WebhookWorker`] drains due rows to remote URLs with signing,
//! backoff and dead-lettering; [`EventFanout`] bundles the broker and the
//! publisher for call sites that feed both.

pub mod publisher;
pub mod signature;
pub mod worker;

pub use self::publisher::{compute_dedup_key, Publisher};
pub use self::worker::{DeliveryAttempt, DeliveryTransport, HttpTransport, WebhookWorker};

use std::sync::Arc;

use serde_json::Value;

use crate::broker::{BrokerEvent, EventBroker};

/// Broker + webhook pair used wherever an event goes to both live streams
/// and the durable delivery queue.
#[derive(Clone)]
pub struct EventFanout {
    broker: Arc<dyn EventBroker>,
    publisher: Publisher,
}

impl EventFanout {
    pub fn new(broker: Arc<dyn EventBroker>, publisher: Publisher) -> Self {
        Self { broker, publisher }
    }

    /// Publish to the in-process broker topic only.
    pub fn publish(&self, topic: &str, event_type: &str, data: Value) {
        self.broker.publish(topic, BrokerEvent::new(event_type, data));
    }

    /// Enqueue webhook deliveries only.
    pub async fn emit(&self, tenant: &str, event_type: &str, data: Value) {
        self.publisher.emit(tenant, event_type, data).await;
    }

    /// Fan an event out to both channels.
    pub async fn broadcast(&self, tenant: &str, topic: &str, event_type: &str, data: Value) {
        self.publish(topic, event_type, data.clone());
        self.emit(tenant, event_type, data).await;
    }
}

//! Webhook publisher: envelope rendering and deduplicated enqueueing.

use std::sync::Arc;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::domain::ports::DispatchStore;
use crate::models::DeliveryDraft;

/// Stable fingerprint for duplicate suppression: the envelope's `id` when
/// present, otherwise the first sixteen hex characters of the payload's
/// SHA-256.
pub fn compute_dedup_key(payload: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(payload) {
        if let Some(id) = value.get("id").and_then(Value::as_str) {
            if !id.is_empty() {
                return id.to_owned();
            }
        }
    }
    let digest = Sha256::digest(payload);
    hex::encode(&digest[..8])
}

/// Renders one envelope per event and enqueues a delivery row per matching
/// subscription. Emission is best-effort: enqueue failures are logged, never
/// surfaced to the caller.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn DispatchStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn DispatchStore>) -> Self {
        Self { store }
    }

    /// Emit an event to every subscription of `(tenant, event_type)`.
    pub async fn emit(&self, tenant: &str, event_type: &str, data: Value) {
        let subscriptions = match self.store.subscriptions_for_event(tenant, event_type).await {
            Ok(subscriptions) => subscriptions,
            Err(error) => {
                warn!(%error, tenant, event_type, "subscription lookup failed");
                return;
            }
        };
        if subscriptions.is_empty() {
            return;
        }

        let envelope = json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "type": event_type,
            "tenantId": tenant,
            "ts": chrono::Utc::now(),
            "data": data,
        });
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, event_type, "envelope serialisation failed");
                return;
            }
        };
        let dedup_key = compute_dedup_key(&payload);

        for subscription in subscriptions {
            let draft = DeliveryDraft {
                tenant: tenant.to_owned(),
                subscription_id: Some(subscription.id.clone()),
                event_type: event_type.to_owned(),
                url: subscription.url.clone(),
                secret: subscription.secret.clone(),
                payload: payload.clone(),
                dedup_key: dedup_key.clone(),
            };
            if let Err(error) = self.store.enqueue_delivery(draft).await {
                warn!(%error, subscription = %subscription.id, "delivery enqueue failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn dedup_key_prefers_envelope_id() {
        let payload = br#"{"id":"evt_123","type":"stop.advanced"}"#;
        assert_eq!(compute_dedup_key(payload), "evt_123");
    }

    #[rstest]
    fn dedup_key_falls_back_to_payload_hash() {
        // sha256("{\"x\":1}")[..16]
        assert_eq!(compute_dedup_key(br#"{"x":1}"#), "5041bf1f713df204");
        // Same payload, same key; different payload, different key.
        assert_eq!(
            compute_dedup_key(br#"{"x":1}"#),
            compute_dedup_key(br#"{"x":1}"#)
        );
        assert_ne!(
            compute_dedup_key(br#"{"x":1}"#),
            compute_dedup_key(br#"{"x":2}"#)
        );
    }

    #[rstest]
    fn dedup_key_ignores_blank_ids() {
        let payload = br#"{"id":""}"#;
        assert_eq!(compute_dedup_key(payload).len(), 16);
    }
}

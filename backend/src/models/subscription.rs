//! Webhook subscriptions.

use serde::{Deserialize, Serialize};

/// Subscription registration payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDraft {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// A saved webhook subscription. Deliveries reference subscriptions weakly:
/// deleting a subscription never cancels in-flight deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Subscription {
    /// Whether this subscription wants the given event type.
    pub fn matches(&self, event_type: &str) -> bool {
        self.events.iter().any(|event| event == event_type)
    }
}

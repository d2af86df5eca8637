//! Webhook delivery queue records, dead-letter entries and delivery metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery queue status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Retry,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// Statuses eligible for the worker's due-fetch.
    pub fn is_due_candidate(&self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }
}

/// New delivery row handed to the queue. The store absorbs drafts whose
/// `(tenant, eventType, url, dedupKey)` tuple already exists.
#[derive(Debug, Clone)]
pub struct DeliveryDraft {
    pub tenant: String,
    pub subscription_id: Option<String>,
    pub event_type: String,
    pub url: String,
    pub secret: Option<String>,
    pub payload: Vec<u8>,
    pub dedup_key: String,
}

/// A queued webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub id: String,
    pub tenant: String,
    pub subscription_id: Option<String>,
    pub event_type: String,
    pub url: String,
    pub secret: Option<String>,
    pub payload: Vec<u8>,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub response_code: Option<u16>,
    pub latency_ms: Option<u64>,
    pub dedup_key: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Admin-facing delivery listing row (payload and secret omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub id: String,
    pub event_type: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub url: String,
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl From<&WebhookDelivery> for DeliverySummary {
    fn from(delivery: &WebhookDelivery) -> Self {
        Self {
            id: delivery.id.clone(),
            event_type: delivery.event_type.clone(),
            status: delivery.status,
            attempts: delivery.attempts,
            url: delivery.url.clone(),
            next_attempt_at: delivery.next_attempt_at,
            last_error: delivery.last_error.clone(),
            response_code: delivery.response_code,
            latency_ms: delivery.latency_ms,
        }
    }
}

/// Details of a failed delivery attempt reported by the worker.
#[derive(Debug, Clone, Default)]
pub struct AttemptFailure {
    pub last_error: Option<String>,
    pub response_code: Option<u16>,
    pub latency_ms: u64,
}

/// Archived delivery that exhausted its retry budget.
#[derive(Debug, Clone)]
pub struct DlqEntry {
    pub id: String,
    pub tenant: String,
    pub delivery_id: String,
    pub event_type: String,
    pub url: String,
    pub secret: Option<String>,
    pub payload: Vec<u8>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub response_code: Option<u16>,
    pub latency_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Filters for the DLQ admin listing.
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub event_type: Option<String>,
    pub older_than: Option<DateTime<Utc>>,
    pub code_min: Option<u16>,
    pub code_max: Option<u16>,
    pub error_query: Option<String>,
    pub cursor: Option<String>,
    pub limit: usize,
}

/// Query for aggregated delivery metrics.
#[derive(Debug, Clone)]
pub struct DeliveryMetricsQuery {
    pub since: DateTime<Utc>,
    pub event_type: Option<String>,
    pub status: Option<DeliveryStatus>,
    pub code_min: Option<u16>,
    pub code_max: Option<u16>,
    pub buckets: Vec<u32>,
}

/// Response-code class counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeClassCounts {
    pub c2xx: u64,
    pub c3xx: u64,
    pub c4xx: u64,
    pub c5xx: u64,
}

/// One aggregated metrics row per `(eventType, status)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMetricsRow {
    pub event_type: String,
    pub status: DeliveryStatus,
    pub count: u64,
    pub avg_latency_ms: u64,
    pub latency_bucket_edges: Vec<u32>,
    pub latency_bucket_counts: Vec<u64>,
    pub code_classes: CodeClassCounts,
}

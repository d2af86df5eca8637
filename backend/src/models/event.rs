//! Driver events, hours-of-service state and proof-of-delivery records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A telematics or workflow event reported by a driver device. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leg_id: Option<String>,
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Driver shift status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HosStatus {
    On,
    Off,
}

/// Hours-of-service state for one driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HosState {
    pub status: HosStatus,
    #[serde(rename = "break")]
    pub on_break: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Default for HosState {
    fn default() -> Self {
        Self {
            status: HosStatus::Off,
            on_break: false,
            break_type: None,
            shift_start: None,
            shift_end: None,
            break_start: None,
            break_end: None,
            note: None,
        }
    }
}

/// Hours-of-service transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HosAction {
    ShiftStart,
    ShiftEnd,
    BreakStart,
    BreakEnd,
}

/// One hours-of-service update for a driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HosUpdate {
    pub action: HosAction,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub break_type: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Media attached to a proof-of-delivery capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMedia {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Proof-of-delivery creation payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodDraft {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub order_id: String,
    pub stop_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub media: Option<PodMedia>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A captured proof-of-delivery record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant: String,
    pub order_id: String,
    pub stop_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

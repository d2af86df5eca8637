//! Orders and their stops.
//!
//! An order owns one or more stops; stop locations are immutable once
//! created, and stop status is advanced by the planner (`scheduled`) and the
//! execution engine (`visited`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Demand, GeoPoint, TimeWindow};

/// Role of a stop within an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Pickup,
    Dropoff,
    Depot,
}

/// Lifecycle of a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Pending,
    Scheduled,
    Visited,
}

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Planned,
    Completed,
    Canceled,
}

/// Stop payload within an order creation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopDraft {
    pub kind: StopKind,
    #[serde(default)]
    pub address: Option<String>,
    pub location: GeoPoint,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    #[serde(default)]
    pub service_sec: u32,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub demand: Demand,
}

/// Order creation payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub attributes: Option<Value>,
    pub stops: Vec<StopDraft>,
}

/// Order read model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    pub priority: i32,
    pub status: OrderStatus,
}

/// A persisted stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant: String,
    pub order_id: String,
    pub kind: StopKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub location: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    pub service_sec: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub demand: Demand,
    pub status: StopStatus,
}

/// Summary returned by order ingestion. Orders whose `externalRef` already
/// exists for the tenant are absorbed and counted as skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderImport {
    pub import_id: String,
    pub created: usize,
    pub skipped: usize,
}

//! Geofences. Fences of type `hub` double as planner depots.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::GeoPoint;

/// Geofence creation or patch payload. On patch, absent fields keep their
/// stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub radius_m: Option<u32>,
    #[serde(default)]
    pub center: Option<GeoPoint>,
    #[serde(default)]
    pub rules: Option<Value>,
}

/// A stored geofence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub radius_m: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Value>,
}

//! Routes, legs and the advance protocol.
//!
//! A route exclusively owns its ordered legs; all cross-entity links are by
//! id. Leg status obeys the single-cursor invariant: at most one leg is
//! `in_progress`, every lower-seq leg is `visited` and every higher-seq leg
//! is `pending`. Route versions increase on every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Route lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Planned,
    Assigned,
    InProgress,
    Completed,
    Canceled,
}

/// Kind of a leg: a drive between two stops or a planned break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    Drive,
    Break,
}

/// Leg execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Pending,
    InProgress,
    Visited,
}

/// One ordered segment of a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    pub id: String,
    pub seq: u32,
    pub kind: LegKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_stop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_stop_id: Option<String>,
    pub dist_m: u32,
    pub drive_sec: u32,
    #[serde(default)]
    pub break_sec: u32,
    pub eta_arrival: DateTime<Utc>,
    pub eta_departure: DateTime<Utc>,
    pub status: LegStatus,
}

/// Weighted cost components of a materialised route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub drive_sec: f64,
    pub dist_m: f64,
    pub lateness_sec: f64,
    pub total: f64,
}

/// Auto-advance policy attached to a route.
///
/// Field names follow the wire contract; note the `requirePoD`
/// capitalisation carried over from the public API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoAdvancePolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<AdvanceTrigger>,
    #[serde(default)]
    pub min_dwell_sec: u32,
    #[serde(default, rename = "requirePoD")]
    pub require_pod: bool,
    #[serde(default)]
    pub grace_period_sec: u32,
    #[serde(default)]
    pub moving_lock: bool,
    #[serde(default)]
    pub hos_max_drive_sec: u32,
}

/// Normalised trigger reasons accepted by the auto-advance policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceTrigger {
    PodAck,
    Depart,
    GeofenceArrive,
}

impl AdvanceTrigger {
    /// Wire spelling of the trigger.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PodAck => "pod_ack",
            Self::Depart => "depart",
            Self::GeofenceArrive => "geofence_arrive",
        }
    }
}

/// A planned or active route with its legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant: String,
    pub plan_date: String,
    pub version: u64,
    pub status: RouteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub legs: Vec<Leg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_advance: Option<AutoAdvancePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_breakdown: Option<CostBreakdown>,
    #[serde(default)]
    pub breaks_count: u32,
    #[serde(default)]
    pub total_break_sec: u32,
}

impl Route {
    /// The lowest-seq leg that has not been visited yet, if any.
    pub fn current_leg(&self) -> Option<&Leg> {
        self.legs.iter().find(|leg| leg.status != LegStatus::Visited)
    }

    /// Recompute the break summary fields from the legs.
    pub fn refresh_break_summary(&mut self) {
        let breaks: Vec<&Leg> = self
            .legs
            .iter()
            .filter(|leg| leg.kind == LegKind::Break)
            .collect();
        self.breaks_count = breaks.len() as u32;
        self.total_break_sec = breaks.iter().map(|leg| leg.break_sec).sum();
    }
}

/// Driver/vehicle assignment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub driver_id: String,
    pub vehicle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
}

/// Partial route update. `expectedVersion`, when present, must match the
/// stored version or the patch is rejected with a conflict.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePatch {
    #[serde(default)]
    pub status: Option<RouteStatus>,
    #[serde(default)]
    pub auto_advance: Option<AutoAdvancePolicy>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Request body for `POST /routes/{id}/advance`. Both fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// Outcome summary of an advance attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResult {
    pub route_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_leg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_stop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_leg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_stop_id: Option<String>,
    pub ts: DateTime<Utc>,
    pub changed: bool,
}

impl AdvanceResult {
    /// An unchanged outcome at the given instant.
    pub fn unchanged(route_id: &str, ts: DateTime<Utc>) -> Self {
        Self {
            route_id: route_id.to_owned(),
            from_leg_id: None,
            from_stop_id: None,
            to_leg_id: None,
            to_stop_id: None,
            ts,
            changed: false,
        }
    }
}

/// Policy-gate notification returned alongside an unchanged advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAlert {
    pub reason: String,
    pub ts: DateTime<Utc>,
}

/// Full advance response: outcome, refreshed route and any alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    pub result: AdvanceResult,
    pub route: Route,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<PolicyAlert>,
}

/// Leg cursor movement committed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegTransition {
    pub from_leg_id: String,
    pub from_stop_id: Option<String>,
    pub to_leg_id: Option<String>,
    pub to_stop_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn policy_uses_require_pod_wire_key() {
        let policy = AutoAdvancePolicy {
            enabled: true,
            require_pod: true,
            ..AutoAdvancePolicy::default()
        };
        let json = serde_json::to_value(&policy).expect("serialise policy");
        assert_eq!(json["requirePoD"], serde_json::json!(true));
    }

    #[rstest]
    #[case(AdvanceTrigger::PodAck, "pod_ack")]
    #[case(AdvanceTrigger::Depart, "depart")]
    #[case(AdvanceTrigger::GeofenceArrive, "geofence_arrive")]
    fn trigger_wire_spelling(#[case] trigger: AdvanceTrigger, #[case] expected: &str) {
        assert_eq!(trigger.as_str(), expected);
        let json = serde_json::to_value(trigger).expect("serialise trigger");
        assert_eq!(json, serde_json::json!(expected));
    }
}

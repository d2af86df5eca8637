//! Route execution engine: leg progression gated by the auto-advance policy.
//!
//! The engine finds the current leg (lowest seq not yet visited), evaluates
//! the policy gates in order and, only when every gate passes, commits the
//! leg transition through the store. A blocked gate returns `changed=false`
//! with the alert; no partial mutation happens before the commit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::domain::ports::{DispatchStore, StoreError};
use crate::models::{
    AdvanceRequest, AdvanceResponse, AdvanceResult, HosStatus, PolicyAlert, Route,
};

/// Speed above which the moving lock considers the vehicle in motion, km/h.
const MOVING_LOCK_SPEED_KPH: f64 = 3.0;

/// Normalise a caller-supplied advance reason to the policy vocabulary.
/// `arrive` and `pod` are shorthand for the geofence and PoD triggers; other
/// values pass through unchanged.
pub fn normalize_reason(reason: Option<&str>) -> Option<String> {
    reason.map(|value| match value {
        "arrive" => "geofence_arrive".to_owned(),
        "pod" => "pod_ack".to_owned(),
        other => other.to_owned(),
    })
}

/// Map a normalised reason back to the driver-event type consulted by the
/// grace-period gate.
fn reason_event_type(reason: &str) -> &str {
    match reason {
        "pod_ack" => "pod",
        "geofence_arrive" => "arrive",
        other => other,
    }
}

/// Per-route leg state machine driver.
pub struct ExecutionEngine {
    store: Arc<dyn DispatchStore>,
}

impl ExecutionEngine {
    pub fn new(store: Arc<dyn DispatchStore>) -> Self {
        Self { store }
    }

    /// Advance the route's current leg, evaluating policy gates at `Utc::now()`.
    pub async fn advance(
        &self,
        tenant: &str,
        route_id: &str,
        request: &AdvanceRequest,
    ) -> Result<AdvanceResponse, StoreError> {
        self.advance_at(tenant, route_id, request, Utc::now()).await
    }

    /// Advance with an explicit evaluation instant.
    pub async fn advance_at(
        &self,
        tenant: &str,
        route_id: &str,
        request: &AdvanceRequest,
        now: DateTime<Utc>,
    ) -> Result<AdvanceResponse, StoreError> {
        let route = self.store.route(tenant, route_id).await?;

        let Some(current) = route.current_leg() else {
            return Ok(unchanged(route_id, route, Vec::new(), now));
        };
        let current_stop = current.to_stop_id.clone();

        let mut alerts = Vec::new();
        if !request.force {
            if let Some(policy) = route.auto_advance.clone() {
                if !policy.enabled {
                    return Ok(unchanged(route_id, route, alerts, now));
                }
                let reason = normalize_reason(request.reason.as_deref());

                if policy.require_pod && reason.as_deref() != Some("pod_ack") {
                    alerts.push(alert("require_pod", now));
                    return Ok(unchanged(route_id, route, alerts, now));
                }
                if let (Some(trigger), Some(reason)) = (policy.trigger, reason.as_deref()) {
                    if trigger.as_str() != reason {
                        alerts.push(alert("trigger_mismatch", now));
                        return Ok(unchanged(route_id, route, alerts, now));
                    }
                }
                if policy.min_dwell_sec > 0 {
                    if let Some(stop_id) = current_stop.as_deref() {
                        let arrived = self
                            .store
                            .last_event_for_stop(tenant, route_id, "arrive", stop_id)
                            .await?;
                        if let Some(ts) = arrived {
                            if now - ts < Duration::seconds(i64::from(policy.min_dwell_sec)) {
                                alerts.push(alert("min_dwell", now));
                                return Ok(unchanged(route_id, route, alerts, now));
                            }
                        }
                    }
                }
                if policy.grace_period_sec > 0 {
                    if let (Some(reason), Some(stop_id)) =
                        (reason.as_deref(), current_stop.as_deref())
                    {
                        let triggered = self
                            .store
                            .last_event_for_stop(
                                tenant,
                                route_id,
                                reason_event_type(reason),
                                stop_id,
                            )
                            .await?;
                        if let Some(ts) = triggered {
                            if now - ts < Duration::seconds(i64::from(policy.grace_period_sec)) {
                                alerts.push(alert("grace_period", now));
                                return Ok(unchanged(route_id, route, alerts, now));
                            }
                        }
                    }
                }
                if policy.moving_lock {
                    let speed = self
                        .store
                        .last_location_speed_kph(tenant, route_id)
                        .await?;
                    if speed.is_some_and(|kph| kph > MOVING_LOCK_SPEED_KPH) {
                        alerts.push(alert("moving_lock", now));
                        return Ok(unchanged(route_id, route, alerts, now));
                    }
                }
                if policy.hos_max_drive_sec > 0 {
                    let driven = self.store.visited_drive_sec(tenant, route_id).await?;
                    if driven >= u64::from(policy.hos_max_drive_sec) {
                        self.record_policy_alert(tenant, route_id, "hos.break.required", now)
                            .await?;
                        alerts.push(alert("hos.break.required", now));
                        return Ok(unchanged(route_id, route, alerts, now));
                    }
                }
                if let Some(driver_id) = route.driver_id.as_deref() {
                    if let Some(hos) = self.store.driver_hos(tenant, driver_id).await? {
                        if hos.on_break {
                            self.record_policy_alert(tenant, route_id, "hos.break.in.progress", now)
                                .await?;
                            alerts.push(alert("hos.break.in.progress", now));
                            return Ok(unchanged(route_id, route, alerts, now));
                        }
                        if hos.status == HosStatus::Off {
                            self.record_policy_alert(tenant, route_id, "hos.shift.off", now)
                                .await?;
                            alerts.push(alert("hos.shift.off", now));
                            return Ok(unchanged(route_id, route, alerts, now));
                        }
                    }
                }
            }
        }

        let Some(transition) = self.store.advance_current_leg(tenant, route_id).await? else {
            return Ok(unchanged(route_id, route, alerts, now));
        };
        let refreshed = self.store.route(tenant, route_id).await?;
        let result = AdvanceResult {
            route_id: route_id.to_owned(),
            from_leg_id: Some(transition.from_leg_id),
            from_stop_id: transition.from_stop_id,
            to_leg_id: transition.to_leg_id,
            to_stop_id: transition.to_stop_id,
            ts: now,
            changed: true,
        };
        Ok(AdvanceResponse {
            result,
            route: refreshed,
            alerts,
        })
    }

    async fn record_policy_alert(
        &self,
        tenant: &str,
        route_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store
            .record_event(
                tenant,
                "policy.alert",
                json!({ "routeId": route_id, "reason": reason, "ts": now }),
            )
            .await?;
        Ok(())
    }
}

fn alert(reason: &str, ts: DateTime<Utc>) -> PolicyAlert {
    PolicyAlert {
        reason: reason.to_owned(),
        ts,
    }
}

fn unchanged(
    route_id: &str,
    route: Route,
    alerts: Vec<PolicyAlert>,
    ts: DateTime<Utc>,
) -> AdvanceResponse {
    AdvanceResponse {
        result: AdvanceResult::unchanged(route_id, ts),
        route,
        alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("arrive"), Some("geofence_arrive"))]
    #[case(Some("pod"), Some("pod_ack"))]
    #[case(Some("depart"), Some("depart"))]
    #[case(None, None)]
    fn reason_normalisation(#[case] input: Option<&str>, #[case] expected: Option<&str>) {
        assert_eq!(normalize_reason(input).as_deref(), expected);
    }

    #[rstest]
    #[case("pod_ack", "pod")]
    #[case("geofence_arrive", "arrive")]
    #[case("depart", "depart")]
    fn grace_event_mapping(#[case] reason: &str, #[case] expected: &str) {
        assert_eq!(reason_event_type(reason), expected);
    }
}

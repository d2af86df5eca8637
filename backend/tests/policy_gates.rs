//! Auto-advance policy gating, over HTTP and directly against the engine.

mod support;

use std::sync::Arc;

use actix_web::{test as actix_test, App};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use backend::domain::execution::ExecutionEngine;
use backend::domain::ports::DispatchStore;
use backend::models::{
    AdvanceRequest, AdvanceTrigger, AutoAdvancePolicy, DriverEvent, HosAction, HosUpdate, Leg,
    LegKind, LegStatus, Route, RouteStatus,
};
use backend::outbound::MemoryStore;
use backend::server::configure_app;
use support::{harness, order_with_stops, TENANT};

async fn read_json(response: actix_web::dev::ServiceResponse) -> Value {
    let body = actix_test::read_body(response).await;
    serde_json::from_slice(&body).expect("JSON response body")
}

#[actix_web::test]
async fn moving_lock_blocks_the_advance_over_http() {
    let harness = harness();
    let app = actix_test::init_service(
        App::new()
            .app_data(harness.state.clone())
            .configure(configure_app),
    )
    .await;

    actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/v1/orders")
            .insert_header(("X-Tenant-Id", TENANT))
            .set_json(order_with_stops(3))
            .to_request(),
    )
    .await;
    let optimized = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/v1/optimize")
            .insert_header(("X-Tenant-Id", TENANT))
            .set_json(json!({
                "tenantId": TENANT,
                "planDate": "2024-01-01",
                "algorithm": "greedy",
            }))
            .to_request(),
    )
    .await;
    let outcome = read_json(optimized).await;
    let route_id = outcome["routes"][0]["id"].as_str().expect("route id").to_owned();

    let patched = actix_test::call_service(
        &app,
        actix_test::TestRequest::patch()
            .uri(&format!("/v1/routes/{route_id}"))
            .insert_header(("X-Tenant-Id", TENANT))
            .set_json(json!({
                "autoAdvance": { "enabled": true, "movingLock": true },
            }))
            .to_request(),
    )
    .await;
    assert_eq!(patched.status(), 200);

    let ingested = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/v1/driver-events")
            .insert_header(("X-Tenant-Id", TENANT))
            .insert_header(("X-Role", "driver"))
            .set_json(json!({
                "tenantId": TENANT,
                "events": [{
                    "type": "location",
                    "routeId": route_id,
                    "ts": Utc::now(),
                    "payload": { "speedKph": 10.0 },
                }],
            }))
            .to_request(),
    )
    .await;
    assert_eq!(ingested.status(), 202);

    let advanced = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri(&format!("/v1/routes/{route_id}/advance"))
            .insert_header(("X-Tenant-Id", TENANT))
            .set_json(json!({}))
            .to_request(),
    )
    .await;
    assert_eq!(advanced.status(), 200);
    let advanced = read_json(advanced).await;
    assert_eq!(advanced["result"]["changed"], json!(false));
    let alerts = advanced["alerts"].as_array().expect("alerts");
    assert!(alerts
        .iter()
        .any(|alert| alert["reason"] == json!("moving_lock")));
}

fn leg(seq: u32, status: LegStatus, drive_sec: u32) -> Leg {
    Leg {
        id: format!("leg-{seq}"),
        seq,
        kind: LegKind::Drive,
        from_stop_id: Some(format!("stop-{}", seq - 1)),
        to_stop_id: Some(format!("stop-{seq}")),
        dist_m: 1000,
        drive_sec,
        break_sec: 0,
        eta_arrival: Utc::now(),
        eta_departure: Utc::now(),
        status,
    }
}

fn policy_route(id: &str, policy: AutoAdvancePolicy) -> Route {
    Route {
        id: id.to_owned(),
        tenant: TENANT.to_owned(),
        plan_date: "2024-01-01".to_owned(),
        version: 1,
        status: RouteStatus::Assigned,
        driver_id: Some("drv1".to_owned()),
        vehicle_id: Some("veh1".to_owned()),
        legs: vec![
            leg(1, LegStatus::InProgress, 600),
            leg(2, LegStatus::Pending, 600),
        ],
        auto_advance: Some(policy),
        cost_breakdown: None,
        breaks_count: 0,
        total_break_sec: 0,
    }
}

async fn engine_with(route: Route) -> (ExecutionEngine, Arc<dyn DispatchStore>) {
    let store: Arc<dyn DispatchStore> = Arc::new(MemoryStore::new());
    store.insert_route(route).await.expect("insert route");
    (ExecutionEngine::new(store.clone()), store)
}

#[actix_web::test]
async fn require_pod_blocks_other_reasons_and_passes_pod() {
    let policy = AutoAdvancePolicy {
        enabled: true,
        require_pod: true,
        ..AutoAdvancePolicy::default()
    };
    let (engine, _store) = engine_with(policy_route("route-1", policy)).await;

    let blocked = engine
        .advance(
            TENANT,
            "route-1",
            &AdvanceRequest {
                reason: Some("depart".to_owned()),
                force: false,
            },
        )
        .await
        .expect("advance");
    assert!(!blocked.result.changed);
    assert_eq!(blocked.alerts[0].reason, "require_pod");

    let passed = engine
        .advance(
            TENANT,
            "route-1",
            &AdvanceRequest {
                reason: Some("pod".to_owned()),
                force: false,
            },
        )
        .await
        .expect("advance");
    assert!(passed.result.changed);
}

#[actix_web::test]
async fn mismatched_trigger_reason_is_rejected() {
    let policy = AutoAdvancePolicy {
        enabled: true,
        trigger: Some(AdvanceTrigger::GeofenceArrive),
        ..AutoAdvancePolicy::default()
    };
    let (engine, _store) = engine_with(policy_route("route-1", policy)).await;

    let blocked = engine
        .advance(
            TENANT,
            "route-1",
            &AdvanceRequest {
                reason: Some("depart".to_owned()),
                force: false,
            },
        )
        .await
        .expect("advance");
    assert!(!blocked.result.changed);
    assert_eq!(blocked.alerts[0].reason, "trigger_mismatch");

    // The `arrive` shorthand normalises onto the configured trigger.
    let passed = engine
        .advance(
            TENANT,
            "route-1",
            &AdvanceRequest {
                reason: Some("arrive".to_owned()),
                force: false,
            },
        )
        .await
        .expect("advance");
    assert!(passed.result.changed);
}

#[actix_web::test]
async fn min_dwell_blocks_recent_arrivals_and_skips_when_unknown() {
    let policy = AutoAdvancePolicy {
        enabled: true,
        min_dwell_sec: 300,
        ..AutoAdvancePolicy::default()
    };
    let (engine, store) = engine_with(policy_route("route-1", policy)).await;

    // No arrive event recorded: the gate is permissive.
    let passed = engine
        .advance(TENANT, "route-1", &AdvanceRequest::default())
        .await
        .expect("advance");
    assert!(passed.result.changed);

    // Fresh arrival at the new current stop blocks until the dwell elapses.
    store
        .insert_driver_events(
            TENANT,
            vec![DriverEvent {
                event_type: "arrive".to_owned(),
                driver_id: Some("drv1".to_owned()),
                route_id: Some("route-1".to_owned()),
                stop_id: Some("stop-2".to_owned()),
                leg_id: None,
                ts: Utc::now(),
                payload: None,
            }],
        )
        .await
        .expect("insert event");
    let blocked = engine
        .advance(TENANT, "route-1", &AdvanceRequest::default())
        .await
        .expect("advance");
    assert!(!blocked.result.changed);
    assert_eq!(blocked.alerts[0].reason, "min_dwell");
}

#[actix_web::test]
async fn grace_period_holds_right_after_the_trigger_event() {
    let policy = AutoAdvancePolicy {
        enabled: true,
        grace_period_sec: 120,
        ..AutoAdvancePolicy::default()
    };
    let (engine, store) = engine_with(policy_route("route-1", policy)).await;
    store
        .insert_driver_events(
            TENANT,
            vec![DriverEvent {
                event_type: "pod".to_owned(),
                driver_id: Some("drv1".to_owned()),
                route_id: Some("route-1".to_owned()),
                stop_id: Some("stop-1".to_owned()),
                leg_id: None,
                ts: Utc::now(),
                payload: None,
            }],
        )
        .await
        .expect("insert event");

    let blocked = engine
        .advance(
            TENANT,
            "route-1",
            &AdvanceRequest {
                reason: Some("pod".to_owned()),
                force: false,
            },
        )
        .await
        .expect("advance");
    assert!(!blocked.result.changed);
    assert_eq!(blocked.alerts[0].reason, "grace_period");
}

#[actix_web::test]
async fn hos_drive_budget_blocks_with_a_break_required_alert() {
    let policy = AutoAdvancePolicy {
        enabled: true,
        hos_max_drive_sec: 500,
        ..AutoAdvancePolicy::default()
    };
    let mut route = policy_route("route-1", policy);
    route.legs[0].status = LegStatus::Visited;
    route.legs[1].status = LegStatus::InProgress;
    let (engine, _store) = engine_with(route).await;

    let blocked = engine
        .advance(TENANT, "route-1", &AdvanceRequest::default())
        .await
        .expect("advance");
    assert!(!blocked.result.changed);
    assert_eq!(blocked.alerts[0].reason, "hos.break.required");
}

#[actix_web::test]
async fn driver_break_and_off_shift_block_the_advance() {
    let policy = AutoAdvancePolicy {
        enabled: true,
        ..AutoAdvancePolicy::default()
    };
    let (engine, store) = engine_with(policy_route("route-1", policy)).await;

    store
        .update_hos(
            TENANT,
            "drv1",
            HosUpdate {
                action: HosAction::ShiftStart,
                ts: Utc::now() - Duration::hours(1),
                break_type: None,
                note: None,
            },
        )
        .await
        .expect("shift start");
    store
        .update_hos(
            TENANT,
            "drv1",
            HosUpdate {
                action: HosAction::BreakStart,
                ts: Utc::now(),
                break_type: Some("rest".to_owned()),
                note: None,
            },
        )
        .await
        .expect("break start");

    let blocked = engine
        .advance(TENANT, "route-1", &AdvanceRequest::default())
        .await
        .expect("advance");
    assert!(!blocked.result.changed);
    assert_eq!(blocked.alerts[0].reason, "hos.break.in.progress");

    store
        .update_hos(
            TENANT,
            "drv1",
            HosUpdate {
                action: HosAction::BreakEnd,
                ts: Utc::now(),
                break_type: None,
                note: None,
            },
        )
        .await
        .expect("break end");
    store
        .update_hos(
            TENANT,
            "drv1",
            HosUpdate {
                action: HosAction::ShiftEnd,
                ts: Utc::now(),
                break_type: None,
                note: None,
            },
        )
        .await
        .expect("shift end");

    let blocked = engine
        .advance(TENANT, "route-1", &AdvanceRequest::default())
        .await
        .expect("advance");
    assert!(!blocked.result.changed);
    assert_eq!(blocked.alerts[0].reason, "hos.shift.off");
}

#[actix_web::test]
async fn force_bypasses_every_gate() {
    let policy = AutoAdvancePolicy {
        enabled: true,
        require_pod: true,
        moving_lock: true,
        ..AutoAdvancePolicy::default()
    };
    let (engine, _store) = engine_with(policy_route("route-1", policy)).await;

    let forced = engine
        .advance(
            TENANT,
            "route-1",
            &AdvanceRequest {
                reason: None,
                force: true,
            },
        )
        .await
        .expect("advance");
    assert!(forced.result.changed);
    assert!(forced.alerts.is_empty());
}

#[actix_web::test]
async fn disabled_policy_reports_no_change_without_alerts() {
    let policy = AutoAdvancePolicy {
        enabled: false,
        ..AutoAdvancePolicy::default()
    };
    let (engine, _store) = engine_with(policy_route("route-1", policy)).await;

    let outcome = engine
        .advance(TENANT, "route-1", &AdvanceRequest::default())
        .await
        .expect("advance");
    assert!(!outcome.result.changed);
    assert!(outcome.alerts.is_empty());
}

#[actix_web::test]
async fn exhausted_route_reports_no_change() {
    let policy = AutoAdvancePolicy::default();
    let mut route = policy_route("route-1", policy);
    route.auto_advance = None;
    for leg in &mut route.legs {
        leg.status = LegStatus::Visited;
    }
    let (engine, store) = engine_with(route).await;

    let outcome = engine
        .advance(TENANT, "route-1", &AdvanceRequest::default())
        .await
        .expect("advance");
    assert!(!outcome.result.changed);
    let stored = store.route(TENANT, "route-1").await.expect("route");
    assert_eq!(stored.version, 1);
}

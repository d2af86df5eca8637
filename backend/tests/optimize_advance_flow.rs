//! End-to-end planning and execution flow over the HTTP surface.

mod support;

use actix_web::{test as actix_test, App};
use serde_json::{json, Value};

use backend::server::configure_app;
use support::{harness, order_with_stops, TENANT};

async fn read_json(response: actix_web::dev::ServiceResponse) -> Value {
    let body = actix_test::read_body(response).await;
    serde_json::from_slice(&body).expect("JSON response body")
}

#[actix_web::test]
async fn greedy_optimize_with_two_stops_plans_one_route() {
    let harness = harness();
    let app = actix_test::init_service(
        App::new()
            .app_data(harness.state.clone())
            .configure(configure_app),
    )
    .await;

    let created = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/v1/orders")
            .insert_header(("X-Tenant-Id", TENANT))
            .set_json(order_with_stops(2))
            .to_request(),
    )
    .await;
    assert_eq!(created.status(), 202);
    let import = read_json(created).await;
    assert_eq!(import["created"], json!(1));

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
    assert_eq!(optimized.status(), 200);
    let outcome = read_json(optimized).await;

    assert!(outcome["batchId"].as_str().is_some_and(|id| !id.is_empty()));
    let routes = outcome["routes"].as_array().expect("routes array");
    assert_eq!(routes.len(), 1);
    let route = &routes[0];
    assert_eq!(route["status"], json!("planned"));
    assert_eq!(route["version"], json!(1));
    let legs = route["legs"].as_array().expect("legs array");
    assert!(!legs.is_empty());
    assert!(legs.iter().any(|leg| leg["kind"] == json!("drive")));
}

#[actix_web::test]
async fn assign_then_advance_moves_the_leg_cursor_and_enqueues_a_webhook() {
    let harness = harness();
    let app = actix_test::init_service(
        App::new()
            .app_data(harness.state.clone())
            .configure(configure_app),
    )
    .await;

    // A subscription first, so the advance has somewhere to deliver.
    let subscribed = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/v1/subscriptions")
            .insert_header(("X-Tenant-Id", TENANT))
            .insert_header(("X-Role", "admin"))
            .set_json(json!({
                "url": "http://sink.invalid/hook",
                "events": ["stop.advanced"],
                "secret": "shh",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(subscribed.status(), 201);

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

    let assigned = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri(&format!("/v1/routes/{route_id}/assign"))
            .insert_header(("X-Tenant-Id", TENANT))
            .set_json(json!({ "driverId": "drv1", "vehicleId": "veh1" }))
            .to_request(),
    )
    .await;
    assert_eq!(assigned.status(), 200);
    let assigned = read_json(assigned).await;
    assert_eq!(assigned["status"], json!("assigned"));
    assert_eq!(assigned["driverId"], json!("drv1"));

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
    assert_eq!(advanced["result"]["changed"], json!(true));
    let legs = advanced["route"]["legs"].as_array().expect("legs");
    assert_eq!(legs[0]["status"], json!("visited"));
    assert_eq!(legs[1]["status"], json!("in_progress"));
    assert!(legs[2..]
        .iter()
        .all(|leg| leg["status"] == json!("pending")));

    // The stop.advanced webhook shows up in the admin listing.
    let deliveries = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri("/v1/admin/webhook-deliveries")
            .insert_header(("X-Tenant-Id", TENANT))
            .insert_header(("X-Role", "admin"))
            .to_request(),
    )
    .await;
    assert_eq!(deliveries.status(), 200);
    let deliveries = read_json(deliveries).await;
    let items = deliveries["items"].as_array().expect("items");
    assert!(items
        .iter()
        .any(|item| item["eventType"] == json!("stop.advanced")));
}

#[actix_web::test]
async fn optimize_with_fewer_than_two_stops_returns_an_empty_route() {
    let harness = harness();
    let app = actix_test::init_service(
        App::new()
            .app_data(harness.state.clone())
            .configure(configure_app),
    )
    .await;

    let optimized = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/v1/optimize")
            .insert_header(("X-Tenant-Id", TENANT))
            .set_json(json!({ "tenantId": TENANT, "planDate": "2024-01-01" }))
            .to_request(),
    )
    .await;
    assert_eq!(optimized.status(), 200);
    let outcome = read_json(optimized).await;
    let routes = outcome["routes"].as_array().expect("routes");
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["legs"].as_array().expect("legs").len(), 0);
    assert_eq!(routes[0]["version"], json!(1));
}

#[actix_web::test]
async fn optimize_requires_dispatch_powers() {
    let harness = harness();
    let app = actix_test::init_service(
        App::new()
            .app_data(harness.state.clone())
            .configure(configure_app),
    )
    .await;

    let denied = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/v1/optimize")
            .insert_header(("X-Tenant-Id", TENANT))
            .insert_header(("X-Role", "customer"))
            .set_json(json!({ "planDate": "2024-01-01" }))
            .to_request(),
    )
    .await;
    assert_eq!(denied.status(), 403);
    let problem = read_json(denied).await;
    assert_eq!(problem["type"], json!("about:blank"));
    assert_eq!(problem["status"], json!(403));
}

#[actix_web::test]
async fn alns_optimize_records_plan_metrics() {
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
            .set_json(order_with_stops(6))
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
                "planDate": "2024-01-02",
                "algorithm": "alns",
                "timeBudgetMs": 50,
            }))
            .to_request(),
    )
    .await;
    assert_eq!(optimized.status(), 200);
    let outcome = read_json(optimized).await;
    assert!(!outcome["routes"].as_array().expect("routes").is_empty());

    let metrics = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri("/v1/admin/plan-metrics?planDate=2024-01-02&algo=alns")
            .insert_header(("X-Tenant-Id", TENANT))
            .insert_header(("X-Role", "admin"))
            .to_request(),
    )
    .await;
    assert_eq!(metrics.status(), 200);
    let metrics = read_json(metrics).await;
    let items = metrics["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["algo"], json!("alns"));
    assert!(items[0]["iterations"].as_u64().expect("iterations") > 0);
}

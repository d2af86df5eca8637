//! SSE fanout: frames arrive promptly and teardown unsubscribes.

mod support;

use std::pin::Pin;
use std::time::Duration;

use actix_web::body::MessageBody;
use actix_web::{test as actix_test, App};
use futures_util::future::poll_fn;

use backend::broker::{BrokerEvent, EventBroker};
use backend::server::configure_app;
use support::{harness, TENANT};

async fn next_chunk<B: MessageBody>(mut body: Pin<&mut B>) -> Option<String> {
    let chunk = tokio::time::timeout(
        Duration::from_millis(500),
        poll_fn(|cx| body.as_mut().poll_next(cx)),
    )
    .await
    .ok()??;
    let bytes = chunk.ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[actix_web::test]
async fn published_events_reach_the_stream_within_the_deadline() {
    let harness = harness();
    let app = actix_test::init_service(
        App::new()
            .app_data(harness.state.clone())
            .configure(configure_app),
    )
    .await;

    let response = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri("/v1/routes/route-42/events/stream")
            .insert_header(("X-Tenant-Id", TENANT))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(harness.broker.subscriber_count("route-42"), 1);

    let mut body = Box::pin(response.into_body());

    // The first frame is the immediate heartbeat.
    let heartbeat = next_chunk(body.as_mut()).await.expect("heartbeat frame");
    assert!(heartbeat.starts_with("event: heartbeat\n"), "{heartbeat}");
    assert!(heartbeat.contains("route-42"));

    harness.broker.publish(
        "route-42",
        BrokerEvent::new("policy.alert", serde_json::json!({"reason": "moving_lock"})),
    );
    let frame = next_chunk(body.as_mut()).await.expect("alert frame");
    assert!(frame.starts_with("event: policy.alert\n"), "{frame}");
    assert!(frame.contains("moving_lock"));

    // Dropping the body is the client going away: the subscription is gone.
    drop(body);
    assert_eq!(harness.broker.subscriber_count("route-42"), 0);
}

#[actix_web::test]
async fn driver_streams_require_an_assignment_match() {
    let harness = harness();
    let app = actix_test::init_service(
        App::new()
            .app_data(harness.state.clone())
            .configure(configure_app),
    )
    .await;

    let denied = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri("/v1/routes/route-42/events/stream")
            .insert_header(("X-Tenant-Id", TENANT))
            .insert_header(("X-Role", "driver"))
            .insert_header(("X-Driver-Id", "drv1"))
            .to_request(),
    )
    .await;
    // Route does not exist for this tenant: the driver cannot subscribe.
    assert_eq!(denied.status(), 404);
    assert_eq!(harness.broker.subscriber_count("route-42"), 0);
}

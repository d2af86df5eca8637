//! Server-sent-events presenter for route event streams.
//!
//! Each client wraps one broker subscription. Frames follow the
//! `event: <type>\ndata: <json>\n\n` contract; a heartbeat goes out
//! immediately on connect and every fifteen seconds after. Dropping the
//! response body (client gone, request cancelled) drops the guard, which
//! unsubscribes the channel.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use actix_web::http::header;
use actix_web::HttpResponse;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream;
use tokio::sync::mpsc;
use tokio::time::Interval;

use crate::broker::{BrokerEvent, EventBroker, SubscriberGuard};

/// Heartbeat cadence for SSE clients.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

struct StreamState {
    route_id: String,
    receiver: mpsc::Receiver<BrokerEvent>,
    heartbeat: Interval,
    _guard: SubscriberGuard,
}

/// Render one event frame.
pub fn event_frame(event: &BrokerEvent) -> Bytes {
    Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        event.event_type, event.data
    ))
}

/// Render a heartbeat frame for the route.
pub fn heartbeat_frame(route_id: &str, ts: DateTime<Utc>) -> Bytes {
    Bytes::from(format!(
        "event: heartbeat\ndata: {{\"routeId\":\"{route_id}\",\"ts\":\"{}\"}}\n\n",
        ts.to_rfc3339()
    ))
}

/// Subscribe to the route topic and stream events as SSE frames.
pub fn sse_response(broker: Arc<dyn EventBroker>, route_id: String) -> HttpResponse {
    let subscription = broker.subscribe(&route_id);
    let guard = SubscriberGuard::new(broker, route_id.clone(), subscription.id);
    let state = StreamState {
        route_id,
        receiver: subscription.receiver,
        heartbeat: tokio::time::interval(HEARTBEAT_INTERVAL),
        _guard: guard,
    };

    let body = stream::unfold(state, |mut state| async move {
        let frame = tokio::select! {
            received = state.receiver.recv() => match received {
                Some(event) => event_frame(&event),
                None => return None,
            },
            _ = state.heartbeat.tick() => heartbeat_frame(&state.route_id, Utc::now()),
        };
        Some((Ok::<Bytes, Infallible>(frame), state))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn event_frames_follow_the_sse_contract() {
        let event = BrokerEvent::new("policy.alert", json!({"reason": "moving_lock"}));
        let frame = event_frame(&event);
        let text = std::str::from_utf8(&frame).expect("utf8 frame");
        assert!(text.starts_with("event: policy.alert\ndata: "));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains(r#""reason":"moving_lock""#));
    }

    #[rstest]
    fn heartbeat_frames_carry_route_and_timestamp() {
        let frame = heartbeat_frame("route-1", Utc::now());
        let text = std::str::from_utf8(&frame).expect("utf8 frame");
        assert!(text.starts_with("event: heartbeat\n"));
        assert!(text.contains(r#""routeId":"route-1""#));
    }
}

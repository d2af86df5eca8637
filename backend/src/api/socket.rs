//! WebSocket presenter for route event streams.
//!
//! One actor per client wraps one broker subscription, pings every five
//! seconds and drops clients silent for ten. When the broker stream ends
//! the client receives a `complete` frame and the connection closes.

use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws::{self, Message, ProtocolError};
use futures_util::stream;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::warn;

use crate::broker::{BrokerEvent, SubscriberGuard};

/// Time between pings to the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Maximum client silence before the connection is considered dead.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RouteEventsSocket {
    route_id: String,
    receiver: Option<mpsc::Receiver<BrokerEvent>>,
    _guard: SubscriberGuard,
    last_heartbeat: Instant,
}

impl RouteEventsSocket {
    pub fn new(
        route_id: String,
        receiver: mpsc::Receiver<BrokerEvent>,
        guard: SubscriberGuard,
    ) -> Self {
        Self {
            route_id,
            receiver: Some(receiver),
            _guard: guard,
            last_heartbeat: Instant::now(),
        }
    }
}

impl Actor for RouteEventsSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();
        ctx.run_interval(HEARTBEAT_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > CLIENT_TIMEOUT {
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
        if let Some(receiver) = self.receiver.take() {
            ctx.add_stream(stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|event| (event, receiver))
            }));
        }
    }
}

impl StreamHandler<BrokerEvent> for RouteEventsSocket {
    fn handle(&mut self, event: BrokerEvent, ctx: &mut Self::Context) {
        let frame = json!({
            "type": event.event_type,
            "routeId": self.route_id,
            "data": event.data,
        });
        ctx.text(frame.to_string());
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        ctx.text(r#"{"type":"complete"}"#);
        ctx.stop();
    }
}

impl StreamHandler<Result<Message, ProtocolError>> for RouteEventsSocket {
    fn handle(&mut self, msg: Result<Message, ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(Message::Pong(_)) | Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(Message::Nop) | Ok(Message::Continuation(_)) => {}
            Err(err) => {
                warn!(error = %err, route = %self.route_id, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

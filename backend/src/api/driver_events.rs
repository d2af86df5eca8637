//! Driver event ingestion and proof-of-delivery capture.

use actix_web::{post, web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::broker::BrokerEvent;
use crate::models::{AdvanceRequest, AdvanceResult, DriverEvent, PodDraft};
use crate::server::AppState;

use super::routes::fanout_advance;
use super::{Principal, Problem};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverEventsBody {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub events: Vec<DriverEvent>,
}

/// Batch driver-event ingestion. A `pod`, `arrive` or `depart` event also
/// attempts an auto-advance of its route; the first advance that commits is
/// reported and the rest of the batch is left alone.
#[post("/driver-events")]
pub async fn ingest_driver_events(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<DriverEventsBody>,
) -> Result<HttpResponse, Problem> {
    principal.require_event_source()?;
    let body = body.into_inner();
    let tenant = body.tenant_id.unwrap_or_else(|| principal.tenant.clone());
    let accepted = state
        .store
        .insert_driver_events(&tenant, body.events.clone())
        .await?;

    let mut advanced: Vec<AdvanceResult> = Vec::new();
    for event in &body.events {
        if !matches!(event.event_type.as_str(), "pod" | "arrive" | "depart") {
            continue;
        }
        let Some(route_id) = event.route_id.as_deref() else {
            continue;
        };
        let request = AdvanceRequest {
            reason: Some(event.event_type.clone()),
            force: false,
        };
        if let Ok(response) = state.engine.advance(&tenant, route_id, &request).await {
            fanout_advance(&state, &tenant, route_id, &response).await;
            if response.result.changed {
                advanced.push(response.result);
                break;
            }
        }
    }

    let mut payload = json!({ "accepted": accepted, "rejected": 0 });
    if !advanced.is_empty() {
        payload["advanced"] = serde_json::to_value(&advanced).unwrap_or_default();
    }
    Ok(HttpResponse::Accepted().json(payload))
}

/// Capture a proof-of-delivery and notify every route containing the stop.
#[post("/pod")]
pub async fn capture_pod(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<PodDraft>,
) -> Result<HttpResponse, Problem> {
    let draft = body.into_inner();
    let tenant = draft
        .tenant_id
        .clone()
        .unwrap_or_else(|| principal.tenant.clone());
    let pod = state.store.create_pod(&tenant, draft).await?;

    let routes = state
        .store
        .routes_for_stop(&tenant, &pod.stop_id)
        .await
        .unwrap_or_default();
    let data = json!({
        "orderId": pod.order_id,
        "stopId": pod.stop_id,
        "podId": pod.id,
        "ts": Utc::now(),
    });
    for route_id in routes {
        state
            .broker
            .publish(&route_id, BrokerEvent::new("pod.captured", data.clone()));
    }

    Ok(HttpResponse::Created().json(json!({ "podId": pod.id, "status": "processing" })))
}

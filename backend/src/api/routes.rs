//! Route read models, assignment, advance and live event streams.

use actix_web::{get, patch, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::broker::{BrokerEvent, SubscriberGuard};
use crate::models::{AdvanceRequest, AdvanceResponse, Assignment, LegKind, RoutePatch};
use crate::server::AppState;

use super::socket::RouteEventsSocket;
use super::{is_falsy, Principal, Problem};

#[derive(Debug, Deserialize)]
pub struct ListRoutesQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[get("/routes")]
pub async fn list_routes(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<ListRoutesQuery>,
) -> Result<HttpResponse, Problem> {
    let page = state
        .store
        .list_routes(
            &principal.tenant,
            query.cursor.as_deref(),
            query.limit.unwrap_or(0),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRouteQuery {
    pub include_breaks: Option<String>,
}

/// Fetch one route; `includeBreaks=false` filters break legs out of the
/// response.
#[get("/routes/{id}")]
pub async fn get_route(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    query: web::Query<GetRouteQuery>,
) -> Result<HttpResponse, Problem> {
    let mut route = state.store.route(&principal.tenant, &path).await?;
    if is_falsy(query.include_breaks.as_deref()) {
        route.legs.retain(|leg| leg.kind != LegKind::Break);
    }
    Ok(HttpResponse::Ok().json(route))
}

#[patch("/routes/{id}")]
pub async fn patch_route(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    body: web::Json<RoutePatch>,
) -> Result<HttpResponse, Problem> {
    let route = state
        .store
        .patch_route(&principal.tenant, &path, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(route))
}

#[post("/routes/{id}/assign")]
pub async fn assign_route(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    body: web::Json<Assignment>,
) -> Result<HttpResponse, Problem> {
    principal.require_dispatcher()?;
    let route = state
        .store
        .assign_route(&principal.tenant, &path, &body)
        .await?;
    Ok(HttpResponse::Ok().json(route))
}

/// Advance the route's current leg. Policy-gate rejections come back as
/// `changed=false` with alerts, not as errors.
#[post("/routes/{id}/advance")]
pub async fn advance_route(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    body: Option<web::Json<AdvanceRequest>>,
) -> Result<HttpResponse, Problem> {
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let response = state
        .engine
        .advance(&principal.tenant, &path, &request)
        .await?;
    fanout_advance(&state, &principal.tenant, &path, &response).await;
    Ok(HttpResponse::Ok().json(response))
}

/// Publish the side effects of a committed (or gated) advance: the
/// `stop.advanced` event on both channels, every alert on the live stream,
/// and HoS alerts additionally to the webhook queue.
pub(crate) async fn fanout_advance(
    state: &AppState,
    tenant: &str,
    route_id: &str,
    response: &AdvanceResponse,
) {
    if response.result.changed {
        let data = json!({
            "routeId": response.result.route_id,
            "fromStopId": response.result.from_stop_id,
            "toStopId": response.result.to_stop_id,
            "ts": response.result.ts,
        });
        state
            .fanout
            .broadcast(tenant, route_id, "stop.advanced", data)
            .await;
    }
    for alert in &response.alerts {
        let data = json!({
            "routeId": route_id,
            "reason": alert.reason,
            "ts": alert.ts,
        });
        state
            .broker
            .publish(route_id, BrokerEvent::new("policy.alert", data.clone()));
        if alert.reason.starts_with("hos.") {
            state.fanout.emit(tenant, "policy.alert", data).await;
        }
    }
}

/// Streams are open to dispatchers and admins; drivers only for routes
/// assigned to them.
async fn authorize_stream(
    state: &AppState,
    principal: &Principal,
    route_id: &str,
) -> Result<(), Problem> {
    if principal.can_dispatch() {
        return Ok(());
    }
    let route = state.store.route(&principal.tenant, route_id).await?;
    let assigned = principal.driver_id.is_some() && route.driver_id == principal.driver_id;
    if principal.role == super::Role::Driver && assigned {
        Ok(())
    } else {
        Err(Problem::forbidden("not authorized for route events"))
    }
}

/// SSE stream of route events: heartbeats, `stop.advanced`, `policy.alert`,
/// `pod.captured` and `hos.break.*`.
#[get("/routes/{id}/events/stream")]
pub async fn route_events_stream(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, Problem> {
    let route_id = path.into_inner();
    authorize_stream(&state, &principal, &route_id).await?;
    Ok(super::stream::sse_response(state.broker.clone(), route_id))
}

/// WebSocket variant of the same stream.
#[get("/routes/{id}/events/ws")]
pub async fn route_events_ws(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    let route_id = path.into_inner();
    authorize_stream(&state, &principal, &route_id).await?;
    let subscription = state.broker.subscribe(&route_id);
    let guard = SubscriberGuard::new(state.broker.clone(), route_id.clone(), subscription.id);
    let socket = RouteEventsSocket::new(route_id, subscription.receiver, guard);
    actix_web_actors::ws::start(socket, &req, payload)
}

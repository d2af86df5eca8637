//! Order ingestion and paging.

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use crate::models::{OrderDraft, OrderStatus};
use crate::server::AppState;

use super::{Principal, Problem};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrdersBody {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub orders: Vec<OrderDraft>,
}

/// Batch order ingestion. Duplicated external refs are absorbed and counted
/// as skipped.
#[post("/orders")]
pub async fn create_orders(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<CreateOrdersBody>,
) -> Result<HttpResponse, Problem> {
    let body = body.into_inner();
    if body.orders.is_empty() {
        return Err(Problem::bad_request("orders must not be empty"));
    }
    let tenant = body.tenant_id.unwrap_or(principal.tenant);
    let import = state.store.create_orders(&tenant, body.orders).await?;
    Ok(HttpResponse::Accepted().json(import))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[get("/orders")]
pub async fn list_orders(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<ListOrdersQuery>,
) -> Result<HttpResponse, Problem> {
    let page = state
        .store
        .list_orders(
            &principal.tenant,
            query.status,
            query.cursor.as_deref(),
            query.limit.unwrap_or(0),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

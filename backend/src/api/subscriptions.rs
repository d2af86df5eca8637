//! Webhook subscription management. Admin only.

use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;

use crate::models::SubscriptionDraft;
use crate::server::AppState;

use super::{Principal, Problem};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[post("/subscriptions")]
pub async fn create_subscription(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<SubscriptionDraft>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let draft = body.into_inner();
    if draft.url.trim().is_empty() {
        return Err(Problem::bad_request("url is required"));
    }
    if draft.events.is_empty() {
        return Err(Problem::bad_request("events must not be empty"));
    }
    let tenant = draft
        .tenant_id
        .clone()
        .unwrap_or_else(|| principal.tenant.clone());
    let subscription = state.store.create_subscription(&tenant, draft).await?;
    Ok(HttpResponse::Created().json(subscription))
}

#[get("/subscriptions")]
pub async fn list_subscriptions(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let page = state
        .store
        .list_subscriptions(
            &principal.tenant,
            query.cursor.as_deref(),
            query.limit.unwrap_or(0),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[delete("/subscriptions/{id}")]
pub async fn delete_subscription(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    state
        .store
        .delete_subscription(&principal.tenant, &path)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

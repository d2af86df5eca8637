//! Geofence CRUD. Mutations require dispatch powers.

use actix_web::{delete, get, patch, post, web, HttpResponse};
use serde::Deserialize;

use crate::models::GeofenceInput;
use crate::server::AppState;

use super::{Principal, Problem};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[get("/geofences")]
pub async fn list_geofences(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, Problem> {
    principal.require_dispatcher()?;
    let page = state
        .store
        .list_geofences(
            &principal.tenant,
            query.cursor.as_deref(),
            query.limit.unwrap_or(0),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/geofences")]
pub async fn create_geofence(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<GeofenceInput>,
) -> Result<HttpResponse, Problem> {
    principal.require_dispatcher()?;
    let fence = state
        .store
        .create_geofence(&principal.tenant, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(fence))
}

#[get("/geofences/{id}")]
pub async fn get_geofence(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, Problem> {
    principal.require_dispatcher()?;
    let fence = state.store.geofence(&principal.tenant, &path).await?;
    Ok(HttpResponse::Ok().json(fence))
}

#[patch("/geofences/{id}")]
pub async fn patch_geofence(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
    body: web::Json<GeofenceInput>,
) -> Result<HttpResponse, Problem> {
    principal.require_dispatcher()?;
    let fence = state
        .store
        .patch_geofence(&principal.tenant, &path, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(fence))
}

#[delete("/geofences/{id}")]
pub async fn delete_geofence(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, Problem> {
    principal.require_dispatcher()?;
    state
        .store
        .delete_geofence(&principal.tenant, &path)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

//! Planning entry points and optimizer configuration.

use actix_web::{get, post, put, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::domain::ports::effective_tenant;
use crate::models::{OptimizeRequest, OptimizerConfig};
use crate::server::AppState;

use super::{Principal, Problem};

fn validate(request: &OptimizeRequest) -> Result<(), Problem> {
    if request.plan_date.trim().is_empty() {
        return Err(Problem::bad_request("planDate is required"));
    }
    if let Some(cooling) = request.cooling {
        if !(cooling > 0.0 && cooling < 1.0) {
            return Err(Problem::bad_request("cooling must be in (0, 1)"));
        }
    }
    if let Some(temp) = request.init_temp {
        if temp <= 0.0 {
            return Err(Problem::bad_request("initTemp must be positive"));
        }
    }
    Ok(())
}

/// Plan routes for the tenant's pending stops. Dispatcher or admin only.
#[post("/optimize")]
pub async fn optimize(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<OptimizeRequest>,
) -> Result<HttpResponse, Problem> {
    principal.require_dispatcher()?;
    let request = body.into_inner();
    validate(&request)?;
    let tenant = effective_tenant(&request, &principal.tenant).to_owned();
    let outcome = state.planner.plan(&tenant, &request, &state.fanout).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Effective optimizer defaults for the calling tenant.
#[get("/optimizer/config")]
pub async fn optimizer_config(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<HttpResponse, Problem> {
    let defaults = state
        .store
        .optimizer_config(&principal.tenant)
        .await?
        .unwrap_or_default();
    Ok(HttpResponse::Ok().json(json!({ "defaults": defaults })))
}

/// Admin view of the stored tenant configuration.
#[get("/admin/optimizer/config")]
pub async fn admin_optimizer_config(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let config = state.store.optimizer_config(&principal.tenant).await?;
    Ok(HttpResponse::Ok().json(json!({ "config": config })))
}

#[derive(Debug, Deserialize)]
pub struct PutConfigBody {
    pub config: OptimizerConfig,
}

#[put("/admin/optimizer/config")]
pub async fn put_optimizer_config(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<PutConfigBody>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let config = body.into_inner().config;
    if config.latency_buckets.iter().any(|edge| *edge == 0) {
        return Err(Problem::bad_request("latencyBuckets must be positive"));
    }
    state
        .store
        .save_optimizer_config(&principal.tenant, config)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

//! Driver hours-of-service endpoints.

use actix_web::{post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::models::{HosAction, HosUpdate};
use crate::server::AppState;

use super::{Principal, Problem};

#[derive(Debug, Default, Deserialize)]
pub struct HosBody {
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default, rename = "type")]
    pub break_type: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

fn action_for(section: &str, action: &str) -> Option<HosAction> {
    match (section, action) {
        ("shift", "start") => Some(HosAction::ShiftStart),
        ("shift", "end") => Some(HosAction::ShiftEnd),
        ("breaks", "start") => Some(HosAction::BreakStart),
        ("breaks", "end") => Some(HosAction::BreakEnd),
        _ => None,
    }
}

/// Shift and break transitions: `POST /drivers/{id}/{shift|breaks}/{start|end}`.
/// Break transitions broadcast `hos.break.started`/`hos.break.ended` to
/// every active route of the driver.
#[post("/drivers/{driver_id}/{section}/{action}")]
pub async fn update_hos(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<(String, String, String)>,
    body: Option<web::Json<HosBody>>,
) -> Result<HttpResponse, Problem> {
    let (driver_id, section, action) = path.into_inner();
    let Some(action) = action_for(&section, &action) else {
        return Err(Problem::not_found());
    };
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let ts = body.ts.unwrap_or_else(Utc::now);
    let update = HosUpdate {
        action,
        ts,
        break_type: body.break_type,
        note: body.note,
    };
    let hos = state
        .store
        .update_hos(&principal.tenant, &driver_id, update)
        .await?;

    if matches!(action, HosAction::BreakStart | HosAction::BreakEnd) {
        let event_type = if action == HosAction::BreakStart {
            "hos.break.started"
        } else {
            "hos.break.ended"
        };
        let routes = state
            .store
            .active_routes_for_driver(&principal.tenant, &driver_id)
            .await
            .unwrap_or_default();
        for route_id in routes {
            let data = json!({ "routeId": route_id, "driverId": driver_id, "ts": ts });
            state
                .fanout
                .broadcast(&principal.tenant, &route_id, event_type, data)
                .await;
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "driverId": driver_id,
        "status": hos.status,
        "hosState": hos,
    })))
}

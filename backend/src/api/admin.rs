//! Admin surface: delivery queue, dead letters, route and planner metrics.

use actix_web::{delete, get, post, web, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{
    Algorithm, DeliveryMetricsQuery, DeliveryStatus, DlqEntry, DlqFilter, Page,
};
use crate::server::AppState;

use super::{is_truthy, Principal, Problem};

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    pub status: Option<DeliveryStatus>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[get("/admin/webhook-deliveries")]
pub async fn list_deliveries(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<DeliveriesQuery>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let page = state
        .store
        .list_deliveries(
            &principal.tenant,
            query.status,
            query.cursor.as_deref(),
            query.limit.unwrap_or(0),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/admin/webhook-deliveries/{id}/retry")]
pub async fn retry_delivery(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    state.store.retry_delivery(&principal.tenant, &path).await?;
    Ok(HttpResponse::Accepted().json(json!({ "accepted": 1 })))
}

/// DLQ listing row; payload and secret never leave the store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqSummary {
    pub id: String,
    pub delivery_id: String,
    pub event_type: String,
    pub url: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl From<DlqEntry> for DlqSummary {
    fn from(entry: DlqEntry) -> Self {
        Self {
            id: entry.id,
            delivery_id: entry.delivery_id,
            event_type: entry.event_type,
            url: entry.url,
            attempts: entry.attempts,
            last_error: entry.last_error,
            response_code: entry.response_code,
            latency_ms: entry.latency_ms,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqQuery {
    pub event_type: Option<String>,
    pub older_than_hours: Option<i64>,
    pub response_code_min: Option<u16>,
    pub response_code_max: Option<u16>,
    pub error_query: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[get("/admin/webhook-dlq")]
pub async fn list_dlq(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<DlqQuery>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let query = query.into_inner();
    let filter = DlqFilter {
        event_type: query.event_type,
        older_than: query
            .older_than_hours
            .filter(|hours| *hours > 0)
            .map(|hours| Utc::now() - Duration::hours(hours)),
        code_min: query.response_code_min,
        code_max: query.response_code_max,
        error_query: query.error_query,
        cursor: query.cursor,
        limit: query.limit.unwrap_or(0),
    };
    let page = state.store.list_dlq(&principal.tenant, filter).await?;
    let page = Page {
        items: page.items.into_iter().map(DlqSummary::from).collect(),
        next_cursor: page.next_cursor,
    };
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Debug, Deserialize)]
pub struct RequeueBody {
    pub ids: Vec<String>,
}

/// Bulk requeue of dead-lettered deliveries.
#[post("/admin/webhook-dlq")]
pub async fn requeue_dlq_bulk(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<RequeueBody>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    if body.ids.is_empty() {
        return Err(Problem::bad_request("ids must not be empty"));
    }
    let accepted = state
        .store
        .requeue_dlq_bulk(&principal.tenant, &body.ids)
        .await?;
    Ok(HttpResponse::Accepted().json(json!({ "accepted": accepted })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDlqBody {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub older_than_hours: Option<i64>,
}

/// Bulk delete by explicit ids or by age.
#[delete("/admin/webhook-dlq")]
pub async fn delete_dlq(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<DeleteDlqBody>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let older_than = body
        .older_than_hours
        .filter(|hours| *hours > 0)
        .map(|hours| Utc::now() - Duration::hours(hours));
    let accepted = state
        .store
        .delete_dlq(&principal.tenant, &body.ids, older_than)
        .await?;
    Ok(HttpResponse::Accepted().json(json!({ "accepted": accepted })))
}

#[post("/admin/webhook-dlq/{id}/requeue")]
pub async fn requeue_dlq(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let delivery_id = state.store.requeue_dlq(&principal.tenant, &path).await?;
    Ok(HttpResponse::Accepted().json(json!({ "accepted": 1, "deliveryId": delivery_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub plan_date: Option<String>,
}

#[get("/admin/routes/stats")]
pub async fn route_stats(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let Some(plan_date) = query.plan_date.as_deref().filter(|date| !date.is_empty()) else {
        return Err(Problem::bad_request("planDate is required"));
    };
    let stats = state.store.route_stats(&principal.tenant, plan_date).await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetricsQuery {
    pub plan_date: Option<String>,
    pub algo: Option<Algorithm>,
    pub include_weights: Option<String>,
}

/// Planner metrics per algorithm: the durable record, with the in-process
/// registry as fallback for runs the store has not seen.
#[get("/admin/plan-metrics")]
pub async fn plan_metrics(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<PlanMetricsQuery>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let Some(plan_date) = query.plan_date.as_deref().filter(|date| !date.is_empty()) else {
        return Err(Problem::bad_request("planDate is required"));
    };

    let mut rows = state
        .store
        .list_plan_metrics(&principal.tenant, plan_date, query.algo)
        .await?;
    if rows.is_empty() {
        rows = state
            .registry
            .get(&principal.tenant, plan_date)
            .into_iter()
            .filter(|metrics| query.algo.map_or(true, |algo| metrics.algo == algo))
            .collect();
    }

    let mut items = Vec::with_capacity(rows.len());
    for metrics in rows {
        let algo = metrics.algo;
        let mut item = serde_json::to_value(&metrics)
            .map_err(|_| Problem::internal())?;
        if is_truthy(query.include_weights.as_deref()) {
            let snapshots = state
                .store
                .list_weight_snapshots(&principal.tenant, plan_date, algo)
                .await?;
            if !snapshots.is_empty() {
                item["weights"] = serde_json::to_value(&snapshots).unwrap_or_default();
            }
        }
        items.push(item);
    }
    Ok(HttpResponse::Ok().json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightsQuery {
    pub plan_date: Option<String>,
    pub algo: Option<Algorithm>,
}

#[get("/admin/plan-metrics/weights")]
pub async fn plan_metrics_weights(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<WeightsQuery>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let (Some(plan_date), Some(algo)) = (query.plan_date.as_deref(), query.algo) else {
        return Err(Problem::bad_request("planDate and algo are required"));
    };
    let items = state
        .store
        .list_weight_snapshots(&principal.tenant, plan_date, algo)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMetricsQuery {
    pub since_hours: Option<i64>,
    pub event_type: Option<String>,
    pub status: Option<DeliveryStatus>,
    pub code_class: Option<String>,
    pub response_code_min: Option<u16>,
    pub response_code_max: Option<u16>,
}

#[get("/admin/webhook-metrics")]
pub async fn webhook_metrics(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<WebhookMetricsQuery>,
) -> Result<HttpResponse, Problem> {
    principal.require_admin()?;
    let query = query.into_inner();

    let (mut code_min, mut code_max) = (query.response_code_min, query.response_code_max);
    if code_min.is_none() && code_max.is_none() {
        if let Some(class) = query.code_class.as_deref() {
            let range = match class {
                "2xx" => Some((200, 299)),
                "3xx" => Some((300, 399)),
                "4xx" => Some((400, 499)),
                "5xx" => Some((500, 599)),
                _ => None,
            };
            if let Some((min, max)) = range {
                code_min = Some(min);
                code_max = Some(max);
            }
        }
    }

    let buckets = state
        .store
        .optimizer_config(&principal.tenant)
        .await?
        .map(|config| config.latency_buckets)
        .unwrap_or_default();
    let since_hours = query.since_hours.filter(|hours| *hours > 0).unwrap_or(24);

    let rows = state
        .store
        .delivery_metrics(
            &principal.tenant,
            DeliveryMetricsQuery {
                since: Utc::now() - Duration::hours(since_hours),
                event_type: query.event_type,
                status: query.status,
                code_min,
                code_max,
                buckets,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "items": rows })))
}

//! In-memory store adapter.
//!
//! The default store for development and tests. Records live in id-ordered
//! maps so cursor paging is deterministic; one mutex serialises every
//! mutation, which also gives per-route advance calls the last-write-wins,
//! monotonic-version behaviour the port contract requires.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::ports::{DispatchStore, StoreError};
use crate::models::{
    Algorithm, Assignment, AttemptFailure, CodeClassCounts, DeliveryDraft, DeliveryMetricsQuery,
    DeliveryMetricsRow, DeliveryStatus, DeliverySummary, DlqEntry, DlqFilter, DriverEvent,
    Geofence, GeofenceInput, HosAction, HosState, HosStatus, HosUpdate, LegStatus, LegTransition,
    OptimizerConfig, Order, OrderDraft, OrderImport, OrderStatus, Page, PlanMetrics, Pod,
    PodDraft, Route, RoutePatch, RouteStats, RouteStatus, Stop, StopStatus, Subscription,
    SubscriptionDraft, Vehicle, WebhookDelivery, WeightSnapshot,
};

const DEFAULT_PAGE_LIMIT: usize = 100;
const MAX_PAGE_LIMIT: usize = 500;

/// Event row kept for policy lookups and audit.
#[derive(Debug, Clone)]
struct EventRow {
    tenant: String,
    event_type: String,
    route_id: Option<String>,
    stop_id: Option<String>,
    ts: DateTime<Utc>,
    payload: Option<Value>,
}

#[derive(Default)]
struct State {
    orders: BTreeMap<String, Order>,
    stops: BTreeMap<String, Stop>,
    external_refs: HashSet<(String, String)>,
    vehicles: BTreeMap<String, Vehicle>,
    routes: BTreeMap<String, Route>,
    events: Vec<EventRow>,
    pods: BTreeMap<String, Pod>,
    hos: HashMap<(String, String), HosState>,
    geofences: BTreeMap<String, Geofence>,
    subscriptions: BTreeMap<String, Subscription>,
    deliveries: BTreeMap<String, WebhookDelivery>,
    dedup_index: HashSet<(String, String, String, String)>,
    dlq: BTreeMap<String, DlqEntry>,
    plan_metrics: HashMap<(String, String, Algorithm), PlanMetrics>,
    weight_snapshots: HashMap<(String, String, Algorithm), Vec<WeightSnapshot>>,
    optimizer_configs: HashMap<String, OptimizerConfig>,
}

/// Mutex-guarded in-memory state behind the [`DispatchStore`] port.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::backend("store mutex poisoned"))
    }
}

/// Cursor paging over an id-ordered iterator: items strictly after the
/// cursor id, plus a next cursor when the page filled up.
fn paged<T: Clone>(
    items: impl Iterator<Item = T>,
    id_of: impl Fn(&T) -> &str,
    cursor: Option<&str>,
    limit: usize,
) -> Page<T> {
    let limit = if limit == 0 || limit > MAX_PAGE_LIMIT {
        DEFAULT_PAGE_LIMIT
    } else {
        limit
    };
    let mut out = Vec::new();
    let mut last_id = None;
    let mut full = false;
    for item in items {
        if let Some(cursor) = cursor {
            if id_of(&item) <= cursor {
                continue;
            }
        }
        if out.len() == limit {
            full = true;
            break;
        }
        last_id = Some(id_of(&item).to_owned());
        out.push(item);
    }
    Page {
        items: out,
        next_cursor: if full { last_id } else { None },
    }
}

fn dedup_tuple(draft: &DeliveryDraft) -> (String, String, String, String) {
    (
        draft.tenant.clone(),
        draft.event_type.clone(),
        draft.url.clone(),
        draft.dedup_key.clone(),
    )
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn create_orders(
        &self,
        tenant: &str,
        orders: Vec<OrderDraft>,
    ) -> Result<OrderImport, StoreError> {
        let mut state = self.lock()?;
        let import_id = format!("imp_{}", Uuid::new_v4().simple());
        let mut created = 0;
        let mut skipped = 0;
        for draft in orders {
            if let Some(external_ref) = &draft.external_ref {
                let key = (tenant.to_owned(), external_ref.clone());
                if state.external_refs.contains(&key) {
                    skipped += 1;
                    continue;
                }
                state.external_refs.insert(key);
            }
            let order_id = Uuid::new_v4().to_string();
            state.orders.insert(
                order_id.clone(),
                Order {
                    id: order_id.clone(),
                    tenant: tenant.to_owned(),
                    external_ref: draft.external_ref.clone(),
                    priority: draft.priority,
                    status: OrderStatus::Pending,
                },
            );
            for stop in draft.stops {
                let stop_id = Uuid::new_v4().to_string();
                state.stops.insert(
                    stop_id.clone(),
                    Stop {
                        id: stop_id,
                        tenant: tenant.to_owned(),
                        order_id: order_id.clone(),
                        kind: stop.kind,
                        address: stop.address,
                        location: stop.location,
                        time_window: stop.time_window,
                        service_sec: stop.service_sec,
                        required_skills: stop.required_skills,
                        demand: stop.demand,
                        status: StopStatus::Pending,
                    },
                );
            }
            created += 1;
        }
        Ok(OrderImport {
            import_id,
            created,
            skipped,
        })
    }

    async fn list_orders(
        &self,
        tenant: &str,
        status: Option<OrderStatus>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Order>, StoreError> {
        let state = self.lock()?;
        let items = state
            .orders
            .values()
            .filter(|order| order.tenant == tenant)
            .filter(|order| status.map_or(true, |wanted| order.status == wanted))
            .cloned();
        Ok(paged(items, |order| order.id.as_str(), cursor, limit))
    }

    async fn pending_stops(&self, tenant: &str, limit: usize) -> Result<Vec<Stop>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .stops
            .values()
            .filter(|stop| stop.tenant == tenant && stop.status == StopStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_stops_scheduled(
        &self,
        tenant: &str,
        stop_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        for id in stop_ids {
            if let Some(stop) = state.stops.get_mut(id) {
                if stop.tenant == tenant {
                    stop.status = StopStatus::Scheduled;
                }
            }
        }
        Ok(())
    }

    async fn vehicle(&self, tenant: &str, id: &str) -> Result<Option<Vehicle>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .vehicles
            .get(id)
            .filter(|vehicle| vehicle.tenant == tenant)
            .cloned())
    }

    async fn upsert_vehicle(&self, vehicle: Vehicle) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.vehicles.insert(vehicle.id.clone(), vehicle);
        Ok(())
    }

    async fn insert_route(&self, route: Route) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.routes.insert(route.id.clone(), route);
        Ok(())
    }

    async fn route(&self, tenant: &str, id: &str) -> Result<Route, StoreError> {
        let state = self.lock()?;
        let mut route = state
            .routes
            .get(id)
            .filter(|route| route.tenant == tenant)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        route.refresh_break_summary();
        Ok(route)
    }

    async fn list_routes(
        &self,
        tenant: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Route>, StoreError> {
        let state = self.lock()?;
        let items = state
            .routes
            .values()
            .filter(|route| route.tenant == tenant)
            .cloned();
        Ok(paged(items, |route| route.id.as_str(), cursor, limit))
    }

    async fn assign_route(
        &self,
        tenant: &str,
        id: &str,
        assignment: &Assignment,
    ) -> Result<Route, StoreError> {
        let mut state = self.lock()?;
        let route = state
            .routes
            .get_mut(id)
            .filter(|route| route.tenant == tenant)
            .ok_or(StoreError::NotFound)?;
        route.driver_id = Some(assignment.driver_id.clone());
        route.vehicle_id = Some(assignment.vehicle_id.clone());
        route.status = RouteStatus::Assigned;
        route.version += 1;
        let mut refreshed = route.clone();
        refreshed.refresh_break_summary();
        Ok(refreshed)
    }

    async fn patch_route(
        &self,
        tenant: &str,
        id: &str,
        patch: RoutePatch,
    ) -> Result<Route, StoreError> {
        let mut state = self.lock()?;
        let route = state
            .routes
            .get_mut(id)
            .filter(|route| route.tenant == tenant)
            .ok_or(StoreError::NotFound)?;
        if let Some(expected) = patch.expected_version {
            if expected != route.version {
                return Err(StoreError::conflict(format!(
                    "expected version {expected}, route is at {}",
                    route.version
                )));
            }
        }
        if let Some(status) = patch.status {
            route.status = status;
        }
        if let Some(policy) = patch.auto_advance {
            route.auto_advance = Some(policy);
        }
        route.version += 1;
        let mut refreshed = route.clone();
        refreshed.refresh_break_summary();
        Ok(refreshed)
    }

    async fn advance_current_leg(
        &self,
        tenant: &str,
        route_id: &str,
    ) -> Result<Option<LegTransition>, StoreError> {
        let mut state = self.lock()?;
        let route = state
            .routes
            .get_mut(route_id)
            .filter(|route| route.tenant == tenant)
            .ok_or(StoreError::NotFound)?;
        let Some(current) = route
            .legs
            .iter()
            .position(|leg| leg.status != LegStatus::Visited)
        else {
            return Ok(None);
        };
        route.legs[current].status = LegStatus::Visited;
        let transition = LegTransition {
            from_leg_id: route.legs[current].id.clone(),
            from_stop_id: route.legs[current].to_stop_id.clone(),
            to_leg_id: route.legs.get(current + 1).map(|leg| leg.id.clone()),
            to_stop_id: route
                .legs
                .get(current + 1)
                .and_then(|leg| leg.to_stop_id.clone()),
        };
        if let Some(next) = route.legs.get_mut(current + 1) {
            next.status = LegStatus::InProgress;
        }
        route.version += 1;
        Ok(Some(transition))
    }

    async fn routes_for_stop(
        &self,
        tenant: &str,
        stop_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .routes
            .values()
            .filter(|route| route.tenant == tenant)
            .filter(|route| {
                route
                    .legs
                    .iter()
                    .any(|leg| leg.to_stop_id.as_deref() == Some(stop_id))
            })
            .map(|route| route.id.clone())
            .collect())
    }

    async fn active_routes_for_driver(
        &self,
        tenant: &str,
        driver_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .routes
            .values()
            .filter(|route| {
                route.tenant == tenant
                    && route.driver_id.as_deref() == Some(driver_id)
                    && route.status != RouteStatus::Completed
            })
            .map(|route| route.id.clone())
            .collect())
    }

    async fn route_stats(&self, tenant: &str, plan_date: &str) -> Result<RouteStats, StoreError> {
        let state = self.lock()?;
        let mut stats = RouteStats::default();
        for route in state
            .routes
            .values()
            .filter(|route| route.tenant == tenant && route.plan_date == plan_date)
        {
            stats.routes += 1;
            for leg in &route.legs {
                stats.legs += 1;
                stats.total_dist_m += u64::from(leg.dist_m);
                stats.total_drive_sec += u64::from(leg.drive_sec);
                if leg.kind == crate::models::LegKind::Break {
                    stats.breaks += 1;
                    stats.break_sec += u64::from(leg.break_sec);
                }
            }
        }
        if stats.routes > 0 {
            stats.avg_legs_per_route = stats.legs as f64 / stats.routes as f64;
        }
        Ok(stats)
    }

    async fn insert_driver_events(
        &self,
        tenant: &str,
        events: Vec<DriverEvent>,
    ) -> Result<usize, StoreError> {
        let mut state = self.lock()?;
        let accepted = events.len();
        for event in events {
            state.events.push(EventRow {
                tenant: tenant.to_owned(),
                event_type: event.event_type,
                route_id: event.route_id,
                stop_id: event.stop_id,
                ts: event.ts,
                payload: event.payload,
            });
        }
        Ok(accepted)
    }

    async fn record_event(
        &self,
        tenant: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<String, StoreError> {
        let mut state = self.lock()?;
        let id = format!("evt_{}", Uuid::new_v4().simple());
        let route_id = payload
            .get("routeId")
            .and_then(Value::as_str)
            .map(str::to_owned);
        state.events.push(EventRow {
            tenant: tenant.to_owned(),
            event_type: event_type.to_owned(),
            route_id,
            stop_id: None,
            ts: Utc::now(),
            payload: Some(payload),
        });
        Ok(id)
    }

    async fn last_event_for_stop(
        &self,
        tenant: &str,
        route_id: &str,
        event_type: &str,
        stop_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .rev()
            .find(|event| {
                event.tenant == tenant
                    && event.event_type == event_type
                    && event.route_id.as_deref() == Some(route_id)
                    && event.stop_id.as_deref() == Some(stop_id)
            })
            .map(|event| event.ts))
    }

    async fn last_location_speed_kph(
        &self,
        tenant: &str,
        route_id: &str,
    ) -> Result<Option<f64>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .rev()
            .find(|event| {
                event.tenant == tenant
                    && event.event_type == "location"
                    && event.route_id.as_deref() == Some(route_id)
            })
            .and_then(|event| {
                event
                    .payload
                    .as_ref()
                    .and_then(|payload| payload.get("speedKph"))
                    .and_then(Value::as_f64)
            }))
    }

    async fn visited_drive_sec(&self, tenant: &str, route_id: &str) -> Result<u64, StoreError> {
        let state = self.lock()?;
        let route = state
            .routes
            .get(route_id)
            .filter(|route| route.tenant == tenant)
            .ok_or(StoreError::NotFound)?;
        Ok(route
            .legs
            .iter()
            .filter(|leg| leg.status == LegStatus::Visited)
            .map(|leg| u64::from(leg.drive_sec))
            .sum())
    }

    async fn create_pod(&self, tenant: &str, draft: PodDraft) -> Result<Pod, StoreError> {
        let mut state = self.lock()?;
        let pod = Pod {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.to_owned(),
            order_id: draft.order_id,
            stop_id: draft.stop_id,
            kind: draft.kind,
            media_url: draft.media.as_ref().and_then(|media| media.upload_url.clone()),
            media_sha256: draft.media.as_ref().and_then(|media| media.sha256.clone()),
            metadata: draft.metadata,
            created_at: Utc::now(),
        };
        state.pods.insert(pod.id.clone(), pod.clone());
        Ok(pod)
    }

    async fn driver_hos(
        &self,
        tenant: &str,
        driver_id: &str,
    ) -> Result<Option<HosState>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .hos
            .get(&(tenant.to_owned(), driver_id.to_owned()))
            .cloned())
    }

    async fn update_hos(
        &self,
        tenant: &str,
        driver_id: &str,
        update: HosUpdate,
    ) -> Result<HosState, StoreError> {
        let mut state = self.lock()?;
        let entry = state
            .hos
            .entry((tenant.to_owned(), driver_id.to_owned()))
            .or_default();
        match update.action {
            HosAction::ShiftStart => {
                entry.status = HosStatus::On;
                entry.shift_start = Some(update.ts);
            }
            HosAction::ShiftEnd => {
                entry.status = HosStatus::Off;
                entry.shift_end = Some(update.ts);
            }
            HosAction::BreakStart => {
                entry.on_break = true;
                entry.break_type = update.break_type.clone();
                entry.break_start = Some(update.ts);
            }
            HosAction::BreakEnd => {
                entry.on_break = false;
                entry.break_end = Some(update.ts);
            }
        }
        if update.note.is_some() {
            entry.note = update.note;
        }
        Ok(entry.clone())
    }

    async fn create_geofence(
        &self,
        tenant: &str,
        input: GeofenceInput,
    ) -> Result<Geofence, StoreError> {
        let mut state = self.lock()?;
        let fence = Geofence {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.to_owned(),
            name: input.name.unwrap_or_default(),
            kind: input.kind.unwrap_or_default(),
            radius_m: input.radius_m.unwrap_or_default(),
            center: input.center,
            rules: input.rules,
        };
        state.geofences.insert(fence.id.clone(), fence.clone());
        Ok(fence)
    }

    async fn list_geofences(
        &self,
        tenant: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Geofence>, StoreError> {
        let state = self.lock()?;
        let items = state
            .geofences
            .values()
            .filter(|fence| fence.tenant == tenant)
            .cloned();
        Ok(paged(items, |fence| fence.id.as_str(), cursor, limit))
    }

    async fn geofence(&self, tenant: &str, id: &str) -> Result<Geofence, StoreError> {
        let state = self.lock()?;
        state
            .geofences
            .get(id)
            .filter(|fence| fence.tenant == tenant)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn patch_geofence(
        &self,
        tenant: &str,
        id: &str,
        input: GeofenceInput,
    ) -> Result<Geofence, StoreError> {
        let mut state = self.lock()?;
        let fence = state
            .geofences
            .get_mut(id)
            .filter(|fence| fence.tenant == tenant)
            .ok_or(StoreError::NotFound)?;
        if let Some(name) = input.name {
            fence.name = name;
        }
        if let Some(kind) = input.kind {
            fence.kind = kind;
        }
        if let Some(radius) = input.radius_m {
            fence.radius_m = radius;
        }
        if let Some(center) = input.center {
            fence.center = Some(center);
        }
        if let Some(rules) = input.rules {
            fence.rules = Some(rules);
        }
        Ok(fence.clone())
    }

    async fn delete_geofence(&self, tenant: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let existing = state
            .geofences
            .get(id)
            .filter(|fence| fence.tenant == tenant);
        if existing.is_none() {
            return Err(StoreError::NotFound);
        }
        state.geofences.remove(id);
        Ok(())
    }

    async fn hub_geofences(&self, tenant: &str) -> Result<Vec<Geofence>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .geofences
            .values()
            .filter(|fence| fence.tenant == tenant && fence.kind == "hub")
            .cloned()
            .collect())
    }

    async fn create_subscription(
        &self,
        tenant: &str,
        draft: SubscriptionDraft,
    ) -> Result<Subscription, StoreError> {
        let mut state = self.lock()?;
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.to_owned(),
            url: draft.url,
            events: draft.events,
            secret: draft.secret,
        };
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn list_subscriptions(
        &self,
        tenant: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Subscription>, StoreError> {
        let state = self.lock()?;
        let items = state
            .subscriptions
            .values()
            .filter(|subscription| subscription.tenant == tenant)
            .cloned();
        Ok(paged(items, |sub| sub.id.as_str(), cursor, limit))
    }

    async fn delete_subscription(&self, tenant: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let existing = state
            .subscriptions
            .get(id)
            .filter(|subscription| subscription.tenant == tenant);
        if existing.is_none() {
            return Err(StoreError::NotFound);
        }
        state.subscriptions.remove(id);
        Ok(())
    }

    async fn subscriptions_for_event(
        &self,
        tenant: &str,
        event_type: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .subscriptions
            .values()
            .filter(|subscription| {
                subscription.tenant == tenant && subscription.matches(event_type)
            })
            .cloned()
            .collect())
    }

    async fn enqueue_delivery(&self, draft: DeliveryDraft) -> Result<Option<String>, StoreError> {
        let mut state = self.lock()?;
        let key = dedup_tuple(&draft);
        if state.dedup_index.contains(&key) {
            return Ok(None);
        }
        state.dedup_index.insert(key);
        let now = Utc::now();
        let delivery = WebhookDelivery {
            id: Uuid::new_v4().to_string(),
            tenant: draft.tenant,
            subscription_id: draft.subscription_id,
            event_type: draft.event_type,
            url: draft.url,
            secret: draft.secret,
            payload: draft.payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            response_code: None,
            latency_ms: None,
            dedup_key: draft.dedup_key,
            delivered_at: None,
            updated_at: now,
        };
        let id = delivery.id.clone();
        state.deliveries.insert(id.clone(), delivery);
        Ok(Some(id))
    }

    async fn due_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        let state = self.lock()?;
        let mut due: Vec<WebhookDelivery> = state
            .deliveries
            .values()
            .filter(|delivery| {
                delivery.status.is_due_candidate() && delivery.next_attempt_at <= now
            })
            .cloned()
            .collect();
        due.sort_by_key(|delivery| delivery.next_attempt_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_delivered(
        &self,
        id: &str,
        response_code: u16,
        latency_ms: u64,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let delivery = state.deliveries.get_mut(id).ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        delivery.status = DeliveryStatus::Delivered;
        delivery.attempts += 1;
        delivery.response_code = Some(response_code);
        delivery.latency_ms = Some(latency_ms);
        delivery.delivered_at = Some(now);
        delivery.updated_at = now;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: &str,
        next_attempt_at: DateTime<Utc>,
        failure: AttemptFailure,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let delivery = state.deliveries.get_mut(id).ok_or(StoreError::NotFound)?;
        delivery.status = DeliveryStatus::Retry;
        delivery.attempts += 1;
        delivery.next_attempt_at = next_attempt_at;
        delivery.last_error = failure.last_error;
        delivery.response_code = failure.response_code;
        delivery.latency_ms = Some(failure.latency_ms);
        delivery.updated_at = Utc::now();
        Ok(())
    }

    async fn fail_delivery(&self, id: &str, failure: AttemptFailure) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let delivery = state.deliveries.get_mut(id).ok_or(StoreError::NotFound)?;
        delivery.status = DeliveryStatus::Failed;
        delivery.attempts += 1;
        delivery.last_error = failure.last_error.clone();
        delivery.response_code = failure.response_code;
        delivery.latency_ms = Some(failure.latency_ms);
        delivery.updated_at = Utc::now();
        let entry = DlqEntry {
            id: Uuid::new_v4().to_string(),
            tenant: delivery.tenant.clone(),
            delivery_id: delivery.id.clone(),
            event_type: delivery.event_type.clone(),
            url: delivery.url.clone(),
            secret: delivery.secret.clone(),
            payload: delivery.payload.clone(),
            attempts: delivery.attempts,
            last_error: failure.last_error,
            response_code: failure.response_code,
            latency_ms: Some(failure.latency_ms),
            created_at: Utc::now(),
        };
        state.dlq.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn delivery(&self, tenant: &str, id: &str) -> Result<WebhookDelivery, StoreError> {
        let state = self.lock()?;
        state
            .deliveries
            .get(id)
            .filter(|delivery| delivery.tenant == tenant)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_deliveries(
        &self,
        tenant: &str,
        status: Option<DeliveryStatus>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<DeliverySummary>, StoreError> {
        let state = self.lock()?;
        let items = state
            .deliveries
            .values()
            .filter(|delivery| delivery.tenant == tenant)
            .filter(|delivery| status.map_or(true, |wanted| delivery.status == wanted))
            .map(DeliverySummary::from);
        Ok(paged(items, |summary| summary.id.as_str(), cursor, limit))
    }

    async fn retry_delivery(&self, tenant: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let delivery = state
            .deliveries
            .get_mut(id)
            .filter(|delivery| delivery.tenant == tenant)
            .ok_or(StoreError::NotFound)?;
        delivery.status = DeliveryStatus::Pending;
        delivery.next_attempt_at = Utc::now();
        delivery.updated_at = Utc::now();
        Ok(())
    }

    async fn delivery_metrics(
        &self,
        tenant: &str,
        query: DeliveryMetricsQuery,
    ) -> Result<Vec<DeliveryMetricsRow>, StoreError> {
        let state = self.lock()?;
        let buckets = if query.buckets.is_empty() {
            vec![100, 500, 1000]
        } else {
            query.buckets.clone()
        };

        struct Aggregate {
            count: u64,
            latency_sum: u64,
            bucket_counts: Vec<u64>,
            code_classes: CodeClassCounts,
        }
        let mut by_key: HashMap<(String, DeliveryStatus), Aggregate> = HashMap::new();

        for delivery in state
            .deliveries
            .values()
            .filter(|delivery| delivery.tenant == tenant)
        {
            if delivery.updated_at < query.since {
                continue;
            }
            if let Some(event_type) = &query.event_type {
                if &delivery.event_type != event_type {
                    continue;
                }
            }
            if let Some(status) = query.status {
                if delivery.status != status {
                    continue;
                }
            }
            let code = delivery.response_code.unwrap_or(0);
            if let Some(min) = query.code_min {
                if code < min {
                    continue;
                }
            }
            if let Some(max) = query.code_max {
                if code > max {
                    continue;
                }
            }

            let key = (delivery.event_type.clone(), delivery.status);
            let aggregate = by_key.entry(key).or_insert_with(|| Aggregate {
                count: 0,
                latency_sum: 0,
                bucket_counts: vec![0; buckets.len() + 1],
                code_classes: CodeClassCounts::default(),
            });
            aggregate.count += 1;
            let latency = delivery.latency_ms.unwrap_or(0);
            aggregate.latency_sum += latency;
            let mut bucket = buckets.len();
            for (i, edge) in buckets.iter().enumerate() {
                if latency < u64::from(*edge) {
                    bucket = i;
                    break;
                }
            }
            aggregate.bucket_counts[bucket] += 1;
            match code {
                200..=299 => aggregate.code_classes.c2xx += 1,
                300..=399 => aggregate.code_classes.c3xx += 1,
                400..=499 => aggregate.code_classes.c4xx += 1,
                500..=599 => aggregate.code_classes.c5xx += 1,
                _ => {}
            }
        }

        let mut rows: Vec<DeliveryMetricsRow> = by_key
            .into_iter()
            .map(|((event_type, status), aggregate)| DeliveryMetricsRow {
                event_type,
                status,
                count: aggregate.count,
                avg_latency_ms: if aggregate.count > 0 {
                    aggregate.latency_sum / aggregate.count
                } else {
                    0
                },
                latency_bucket_edges: buckets.clone(),
                latency_bucket_counts: aggregate.bucket_counts,
                code_classes: aggregate.code_classes,
            })
            .collect();
        rows.sort_by(|a, b| a.event_type.cmp(&b.event_type));
        Ok(rows)
    }

    async fn list_dlq(
        &self,
        tenant: &str,
        filter: DlqFilter,
    ) -> Result<Page<DlqEntry>, StoreError> {
        let state = self.lock()?;
        let items = state
            .dlq
            .values()
            .filter(|entry| entry.tenant == tenant)
            .filter(|entry| {
                filter
                    .event_type
                    .as_ref()
                    .map_or(true, |wanted| &entry.event_type == wanted)
            })
            .filter(|entry| {
                filter
                    .older_than
                    .map_or(true, |threshold| entry.created_at < threshold)
            })
            .filter(|entry| {
                filter
                    .code_min
                    .map_or(true, |min| entry.response_code.unwrap_or(0) >= min)
            })
            .filter(|entry| {
                filter
                    .code_max
                    .map_or(true, |max| entry.response_code.unwrap_or(0) <= max)
            })
            .filter(|entry| {
                filter.error_query.as_ref().map_or(true, |needle| {
                    entry
                        .last_error
                        .as_deref()
                        .is_some_and(|error| error.contains(needle.as_str()))
                })
            })
            .cloned();
        Ok(paged(
            items,
            |entry| entry.id.as_str(),
            filter.cursor.as_deref(),
            filter.limit,
        ))
    }

    async fn requeue_dlq(&self, tenant: &str, id: &str) -> Result<String, StoreError> {
        let mut state = self.lock()?;
        let entry = state
            .dlq
            .get(id)
            .filter(|entry| entry.tenant == tenant)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        let delivery_id = if let Some(delivery) = state.deliveries.get_mut(&entry.delivery_id) {
            delivery.status = DeliveryStatus::Pending;
            delivery.attempts = 0;
            delivery.next_attempt_at = now;
            delivery.updated_at = now;
            delivery.id.clone()
        } else {
            let delivery = WebhookDelivery {
                id: Uuid::new_v4().to_string(),
                tenant: entry.tenant.clone(),
                subscription_id: None,
                event_type: entry.event_type.clone(),
                url: entry.url.clone(),
                secret: entry.secret.clone(),
                payload: entry.payload.clone(),
                status: DeliveryStatus::Pending,
                attempts: 0,
                next_attempt_at: now,
                last_error: None,
                response_code: None,
                latency_ms: None,
                dedup_key: format!("requeue_{}", Uuid::new_v4().simple()),
                delivered_at: None,
                updated_at: now,
            };
            let id = delivery.id.clone();
            state.deliveries.insert(id.clone(), delivery);
            id
        };
        state.dlq.remove(id);
        Ok(delivery_id)
    }

    async fn requeue_dlq_bulk(&self, tenant: &str, ids: &[String]) -> Result<usize, StoreError> {
        let mut accepted = 0;
        for id in ids {
            if self.requeue_dlq(tenant, id).await.is_ok() {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    async fn delete_dlq(
        &self,
        tenant: &str,
        ids: &[String],
        older_than: Option<DateTime<Utc>>,
    ) -> Result<usize, StoreError> {
        let mut state = self.lock()?;
        let before = state.dlq.len();
        if !ids.is_empty() {
            for id in ids {
                let matches = state
                    .dlq
                    .get(id)
                    .is_some_and(|entry| entry.tenant == tenant);
                if matches {
                    state.dlq.remove(id);
                }
            }
        } else if let Some(threshold) = older_than {
            state
                .dlq
                .retain(|_, entry| !(entry.tenant == tenant && entry.created_at < threshold));
        }
        Ok(before - state.dlq.len())
    }

    async fn save_plan_metrics(
        &self,
        tenant: &str,
        plan_date: &str,
        metrics: PlanMetrics,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.plan_metrics.insert(
            (tenant.to_owned(), plan_date.to_owned(), metrics.algo),
            metrics,
        );
        Ok(())
    }

    async fn list_plan_metrics(
        &self,
        tenant: &str,
        plan_date: &str,
        algo: Option<Algorithm>,
    ) -> Result<Vec<PlanMetrics>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<PlanMetrics> = state
            .plan_metrics
            .iter()
            .filter(|((t, d, a), _)| {
                t == tenant && d == plan_date && algo.map_or(true, |wanted| *a == wanted)
            })
            .map(|(_, metrics)| metrics.clone())
            .collect();
        rows.sort_by_key(|metrics| metrics.algo.as_str());
        Ok(rows)
    }

    async fn save_weight_snapshots(
        &self,
        tenant: &str,
        plan_date: &str,
        algo: Algorithm,
        snapshots: Vec<WeightSnapshot>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state
            .weight_snapshots
            .insert((tenant.to_owned(), plan_date.to_owned(), algo), snapshots);
        Ok(())
    }

    async fn list_weight_snapshots(
        &self,
        tenant: &str,
        plan_date: &str,
        algo: Algorithm,
    ) -> Result<Vec<WeightSnapshot>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .weight_snapshots
            .get(&(tenant.to_owned(), plan_date.to_owned(), algo))
            .cloned()
            .unwrap_or_default())
    }

    async fn optimizer_config(&self, tenant: &str) -> Result<Option<OptimizerConfig>, StoreError> {
        let state = self.lock()?;
        Ok(state.optimizer_configs.get(tenant).cloned())
    }

    async fn save_optimizer_config(
        &self,
        tenant: &str,
        config: OptimizerConfig,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.optimizer_configs.insert(tenant.to_owned(), config);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

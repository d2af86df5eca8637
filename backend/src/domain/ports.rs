//! Persistence port: the single consolidated interface the core depends on.
//!
//! Adapters map their failures into [`StoreError`] variants instead of
//! leaking driver errors. Two conforming implementations are expected: the
//! in-memory adapter in `outbound::memory` (tests, dev) and a relational
//! adapter; both must serialise per-route mutations so concurrent advances
//! observe last-write-wins with a monotonic version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    Algorithm, Assignment, DeliveryDraft, DeliveryMetricsQuery, DeliveryMetricsRow,
    DeliveryStatus, DeliverySummary, DlqEntry, DlqFilter, DriverEvent, Geofence, GeofenceInput,
    HosState, HosUpdate, LegTransition, OptimizeRequest, OptimizerConfig, Order, OrderDraft,
    OrderImport, OrderStatus, Page, PlanMetrics, Pod, PodDraft, Route, RoutePatch, RouteStats,
    Stop, Subscription, SubscriptionDraft, Vehicle, WebhookDelivery, WeightSnapshot,
};

/// Failures surfaced by persistence adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed record does not exist for the tenant.
    #[error("record not found")]
    NotFound,
    /// A concurrent mutation won; the caller's expectation is stale.
    #[error("version conflict: {message}")]
    Conflict { message: String },
    /// Connectivity, transaction or invariant failures inside the adapter.
    #[error("store backend failure: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// Helper for backend-level failures.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Helper for optimistic-concurrency conflicts.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// Consolidated durable operations required by components A-G.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    // Orders and stops.
    async fn create_orders(
        &self,
        tenant: &str,
        orders: Vec<OrderDraft>,
    ) -> Result<OrderImport, StoreError>;
    async fn list_orders(
        &self,
        tenant: &str,
        status: Option<OrderStatus>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Order>, StoreError>;
    /// Pending stops with coordinates, ordered by id, capped at `limit`.
    async fn pending_stops(&self, tenant: &str, limit: usize) -> Result<Vec<Stop>, StoreError>;
    /// Mark stops as scheduled after the planner has placed them on a route.
    async fn mark_stops_scheduled(
        &self,
        tenant: &str,
        stop_ids: &[String],
    ) -> Result<(), StoreError>;

    // Vehicles.
    async fn vehicle(&self, tenant: &str, id: &str) -> Result<Option<Vehicle>, StoreError>;
    async fn upsert_vehicle(&self, vehicle: Vehicle) -> Result<(), StoreError>;

    // Routes and legs. Routes own their legs; deleting a route removes them.
    async fn insert_route(&self, route: Route) -> Result<(), StoreError>;
    async fn route(&self, tenant: &str, id: &str) -> Result<Route, StoreError>;
    async fn list_routes(
        &self,
        tenant: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Route>, StoreError>;
    async fn assign_route(
        &self,
        tenant: &str,
        id: &str,
        assignment: &Assignment,
    ) -> Result<Route, StoreError>;
    async fn patch_route(
        &self,
        tenant: &str,
        id: &str,
        patch: RoutePatch,
    ) -> Result<Route, StoreError>;
    /// Atomically mark the current leg visited and promote the next leg.
    /// Returns `None` when every leg is already visited.
    async fn advance_current_leg(
        &self,
        tenant: &str,
        route_id: &str,
    ) -> Result<Option<LegTransition>, StoreError>;
    async fn routes_for_stop(&self, tenant: &str, stop_id: &str)
        -> Result<Vec<String>, StoreError>;
    async fn active_routes_for_driver(
        &self,
        tenant: &str,
        driver_id: &str,
    ) -> Result<Vec<String>, StoreError>;
    async fn route_stats(&self, tenant: &str, plan_date: &str) -> Result<RouteStats, StoreError>;

    // Events and proof-of-delivery.
    async fn insert_driver_events(
        &self,
        tenant: &str,
        events: Vec<DriverEvent>,
    ) -> Result<usize, StoreError>;
    /// Record a system-emitted event row; returns the event id.
    async fn record_event(
        &self,
        tenant: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<String, StoreError>;
    /// Timestamp of the most recent event of `event_type` for the stop on
    /// this route, if any.
    async fn last_event_for_stop(
        &self,
        tenant: &str,
        route_id: &str,
        event_type: &str,
        stop_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
    /// Speed reported by the most recent `location` event for the route.
    async fn last_location_speed_kph(
        &self,
        tenant: &str,
        route_id: &str,
    ) -> Result<Option<f64>, StoreError>;
    /// Sum of `driveSec` over already-visited legs of the route.
    async fn visited_drive_sec(&self, tenant: &str, route_id: &str) -> Result<u64, StoreError>;
    async fn create_pod(&self, tenant: &str, draft: PodDraft) -> Result<Pod, StoreError>;

    // Driver hours-of-service.
    async fn driver_hos(
        &self,
        tenant: &str,
        driver_id: &str,
    ) -> Result<Option<HosState>, StoreError>;
    async fn update_hos(
        &self,
        tenant: &str,
        driver_id: &str,
        update: HosUpdate,
    ) -> Result<HosState, StoreError>;

    // Geofences.
    async fn create_geofence(
        &self,
        tenant: &str,
        input: GeofenceInput,
    ) -> Result<Geofence, StoreError>;
    async fn list_geofences(
        &self,
        tenant: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Geofence>, StoreError>;
    async fn geofence(&self, tenant: &str, id: &str) -> Result<Geofence, StoreError>;
    async fn patch_geofence(
        &self,
        tenant: &str,
        id: &str,
        input: GeofenceInput,
    ) -> Result<Geofence, StoreError>;
    async fn delete_geofence(&self, tenant: &str, id: &str) -> Result<(), StoreError>;
    /// Geofences of type `hub`, used as planner depots.
    async fn hub_geofences(&self, tenant: &str) -> Result<Vec<Geofence>, StoreError>;

    // Subscriptions.
    async fn create_subscription(
        &self,
        tenant: &str,
        draft: SubscriptionDraft,
    ) -> Result<Subscription, StoreError>;
    async fn list_subscriptions(
        &self,
        tenant: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Subscription>, StoreError>;
    async fn delete_subscription(&self, tenant: &str, id: &str) -> Result<(), StoreError>;
    async fn subscriptions_for_event(
        &self,
        tenant: &str,
        event_type: &str,
    ) -> Result<Vec<Subscription>, StoreError>;

    // Delivery queue.
    /// Enqueue a delivery. Returns `None` when the draft's dedup tuple is
    /// already present and the enqueue was absorbed.
    async fn enqueue_delivery(&self, draft: DeliveryDraft) -> Result<Option<String>, StoreError>;
    /// Deliveries in `pending`/`retry` whose `nextAttemptAt` has passed,
    /// ordered by `nextAttemptAt` ascending.
    async fn due_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError>;
    async fn mark_delivered(
        &self,
        id: &str,
        response_code: u16,
        latency_ms: u64,
    ) -> Result<(), StoreError>;
    async fn mark_retry(
        &self,
        id: &str,
        next_attempt_at: DateTime<Utc>,
        failure: crate::models::AttemptFailure,
    ) -> Result<(), StoreError>;
    /// Terminal failure: mark the row failed and archive it to the DLQ.
    async fn fail_delivery(
        &self,
        id: &str,
        failure: crate::models::AttemptFailure,
    ) -> Result<(), StoreError>;
    async fn delivery(&self, tenant: &str, id: &str) -> Result<WebhookDelivery, StoreError>;
    async fn list_deliveries(
        &self,
        tenant: &str,
        status: Option<DeliveryStatus>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<DeliverySummary>, StoreError>;
    async fn retry_delivery(&self, tenant: &str, id: &str) -> Result<(), StoreError>;
    async fn delivery_metrics(
        &self,
        tenant: &str,
        query: DeliveryMetricsQuery,
    ) -> Result<Vec<DeliveryMetricsRow>, StoreError>;

    // Dead-letter queue.
    async fn list_dlq(&self, tenant: &str, filter: DlqFilter) -> Result<Page<DlqEntry>, StoreError>;
    /// Restore one archived delivery to `pending`; returns the delivery id.
    async fn requeue_dlq(&self, tenant: &str, id: &str) -> Result<String, StoreError>;
    async fn requeue_dlq_bulk(&self, tenant: &str, ids: &[String]) -> Result<usize, StoreError>;
    async fn delete_dlq(
        &self,
        tenant: &str,
        ids: &[String],
        older_than: Option<DateTime<Utc>>,
    ) -> Result<usize, StoreError>;

    // Plan metrics.
    async fn save_plan_metrics(
        &self,
        tenant: &str,
        plan_date: &str,
        metrics: PlanMetrics,
    ) -> Result<(), StoreError>;
    async fn list_plan_metrics(
        &self,
        tenant: &str,
        plan_date: &str,
        algo: Option<Algorithm>,
    ) -> Result<Vec<PlanMetrics>, StoreError>;
    async fn save_weight_snapshots(
        &self,
        tenant: &str,
        plan_date: &str,
        algo: Algorithm,
        snapshots: Vec<WeightSnapshot>,
    ) -> Result<(), StoreError>;
    async fn list_weight_snapshots(
        &self,
        tenant: &str,
        plan_date: &str,
        algo: Algorithm,
    ) -> Result<Vec<WeightSnapshot>, StoreError>;

    // Optimizer configuration.
    async fn optimizer_config(&self, tenant: &str) -> Result<Option<OptimizerConfig>, StoreError>;
    async fn save_optimizer_config(
        &self,
        tenant: &str,
        config: OptimizerConfig,
    ) -> Result<(), StoreError>;

    /// Connectivity probe for the readiness endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Helper shared by planning entry points: the tenant named in the request
/// body wins over the ambient principal tenant.
pub fn effective_tenant<'a>(request: &'a OptimizeRequest, principal_tenant: &'a str) -> &'a str {
    request.tenant_id.as_deref().unwrap_or(principal_tenant)
}

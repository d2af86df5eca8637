//! Application state and route table.

pub mod config;

pub use self::config::ServerConfig;

use std::sync::Arc;

use actix_web::web;

use crate::api;
use crate::broker::EventBroker;
use crate::domain::execution::ExecutionEngine;
use crate::domain::ports::DispatchStore;
use crate::planner::{PlanMetricsRegistry, Planner};
use crate::webhooks::{EventFanout, Publisher};

/// Shared handles available to every handler.
pub struct AppState {
    pub store: Arc<dyn DispatchStore>,
    pub broker: Arc<dyn EventBroker>,
    pub publisher: Publisher,
    pub fanout: EventFanout,
    pub planner: Planner,
    pub engine: ExecutionEngine,
    pub registry: Arc<PlanMetricsRegistry>,
}

impl AppState {
    /// Wire the application services around a store, a broker and a metrics
    /// registry. Tests pass isolated instances of all three.
    pub fn new(
        store: Arc<dyn DispatchStore>,
        broker: Arc<dyn EventBroker>,
        registry: Arc<PlanMetricsRegistry>,
    ) -> Self {
        let publisher = Publisher::new(store.clone());
        let fanout = EventFanout::new(broker.clone(), publisher.clone());
        let planner = Planner::new(store.clone(), registry.clone());
        let engine = ExecutionEngine::new(store.clone());
        Self {
            store,
            broker,
            publisher,
            fanout,
            planner,
            engine,
            registry,
        }
    }
}

/// Register every endpoint: health probes at the root, the API under `/v1`.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.service(api::health::healthz)
        .service(api::health::readyz)
        .service(
            web::scope("/v1")
                .service(api::orders::create_orders)
                .service(api::orders::list_orders)
                .service(api::optimize::optimize)
                .service(api::optimize::optimizer_config)
                .service(api::optimize::admin_optimizer_config)
                .service(api::optimize::put_optimizer_config)
                .service(api::routes::list_routes)
                .service(api::routes::route_events_stream)
                .service(api::routes::route_events_ws)
                .service(api::routes::get_route)
                .service(api::routes::patch_route)
                .service(api::routes::assign_route)
                .service(api::routes::advance_route)
                .service(api::driver_events::ingest_driver_events)
                .service(api::driver_events::capture_pod)
                .service(api::drivers::update_hos)
                .service(api::geofences::list_geofences)
                .service(api::geofences::create_geofence)
                .service(api::geofences::get_geofence)
                .service(api::geofences::patch_geofence)
                .service(api::geofences::delete_geofence)
                .service(api::subscriptions::create_subscription)
                .service(api::subscriptions::list_subscriptions)
                .service(api::subscriptions::delete_subscription)
                .service(api::admin::list_deliveries)
                .service(api::admin::retry_delivery)
                .service(api::admin::list_dlq)
                .service(api::admin::requeue_dlq_bulk)
                .service(api::admin::delete_dlq)
                .service(api::admin::requeue_dlq)
                .service(api::admin::route_stats)
                .service(api::admin::plan_metrics)
                .service(api::admin::plan_metrics_weights)
                .service(api::admin::webhook_metrics),
        );
}

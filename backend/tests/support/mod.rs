//! Shared harness for the HTTP integration suites.

use std::sync::Arc;

use actix_web::web;
use serde_json::{json, Value};

use backend::broker::{EventBroker, InProcessBroker};
use backend::domain::ports::DispatchStore;
use backend::outbound::MemoryStore;
use backend::planner::PlanMetricsRegistry;
use backend::server::AppState;

pub const TENANT: &str = "t_test";

/// Isolated application state for one test.
pub struct Harness {
    pub state: web::Data<AppState>,
    pub store: Arc<dyn DispatchStore>,
    pub broker: Arc<InProcessBroker>,
}

pub fn harness() -> Harness {
    let store: Arc<dyn DispatchStore> = Arc::new(MemoryStore::new());
    let broker = Arc::new(InProcessBroker::new());
    let broker_dyn: Arc<dyn EventBroker> = broker.clone();
    let registry = Arc::new(PlanMetricsRegistry::new());
    let state = web::Data::new(AppState::new(store.clone(), broker_dyn, registry));
    Harness {
        state,
        store,
        broker,
    }
}

/// Order payload with `n` dropoff stops spread around central Berlin.
pub fn order_with_stops(n: usize) -> Value {
    let stops: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "kind": "dropoff",
                "location": { "lat": 52.50 + 0.01 * i as f64, "lng": 13.40 + 0.01 * i as f64 },
                "serviceSec": 60,
            })
        })
        .collect();
    json!({ "tenantId": TENANT, "orders": [{ "stops": stops }] })
}

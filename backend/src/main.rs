//! Backend entry-point: wires the store, broker, planner, webhook worker and
//! the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use backend::broker::{EventBroker, InProcessBroker};
use backend::domain::ports::DispatchStore;
use backend::outbound::MemoryStore;
use backend::planner::PlanMetricsRegistry;
use backend::server::{configure_app, AppState, ServerConfig};
use backend::webhooks::worker::ATTEMPT_TIMEOUT;
use backend::webhooks::{HttpTransport, WebhookWorker};
use backend::Trace;

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let config = ServerConfig::from_env();
    let store: Arc<dyn DispatchStore> = Arc::new(MemoryStore::new());
    let broker: Arc<dyn EventBroker> = Arc::new(InProcessBroker::new());
    let registry = Arc::new(PlanMetricsRegistry::new());
    let state = web::Data::new(AppState::new(store.clone(), broker, registry));

    let transport = HttpTransport::new(ATTEMPT_TIMEOUT).map_err(std::io::Error::other)?;
    let worker = WebhookWorker::new(store, Arc::new(transport), config.webhook_max_attempts);
    let shutdown = CancellationToken::new();
    tokio::spawn(worker.run(shutdown.clone()));

    info!(port = config.port, "API listening");
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Trace)
            .configure(configure_app)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await;

    shutdown.cancel();
    // Give the worker a beat to observe the cancellation before exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    server
}

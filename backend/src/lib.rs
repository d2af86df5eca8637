//! Multi-tenant dispatch backend: order ingestion, ALNS/greedy route
//! planning, live route execution with auto-advance policies, and webhook
//! fanout with at-least-once delivery.

pub mod api;
pub mod broker;
pub mod domain;
pub mod middleware;
pub mod models;
pub mod outbound;
pub mod planner;
pub mod server;
pub mod webhooks;

pub use middleware::Trace;

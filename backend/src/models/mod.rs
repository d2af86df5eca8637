//! Wire and domain record types.
//!
//! Purpose: strongly typed entities shared by the API adapters, the planner
//! and the persistence port. Wire fields are camelCase; enum variants are
//! snake_case. Keep types immutable where the domain requires it (stop
//! locations, vehicle capacities) and document serialisation contracts in
//! each type's Rustdoc.

pub mod event;
pub mod geo;
pub mod geofence;
pub mod order;
pub mod planning;
pub mod route;
pub mod subscription;
pub mod vehicle;
pub mod webhook;

pub use self::event::{
    DriverEvent, HosAction, HosState, HosStatus, HosUpdate, Pod, PodDraft, PodMedia,
};
pub use self::geo::{GeoPoint, TimeWindow};
pub use self::geofence::{Geofence, GeofenceInput};
pub use self::order::{
    Order, OrderDraft, OrderImport, OrderStatus, Stop, StopDraft, StopKind, StopStatus,
};
pub use self::planning::{
    Algorithm, ObjectiveWeights, OptimizeRequest, OptimizerConfig, PlanConstraints, PlanMetrics,
    PlanOutcome, RouteStats, WeightSnapshot,
};
pub use self::route::{
    AdvanceRequest, AdvanceResponse, AdvanceResult, AdvanceTrigger, Assignment, AutoAdvancePolicy,
    CostBreakdown, Leg, LegKind, LegStatus, LegTransition, PolicyAlert, Route, RoutePatch,
    RouteStatus,
};
pub use self::subscription::{Subscription, SubscriptionDraft};
pub use self::vehicle::{Capacity, Demand, Vehicle};
pub use self::webhook::{
    AttemptFailure, CodeClassCounts, DeliveryDraft, DeliveryMetricsQuery, DeliveryMetricsRow,
    DeliveryStatus, DeliverySummary, DlqEntry, DlqFilter, WebhookDelivery,
};

use serde::{Deserialize, Serialize};

/// One page of a cursor-paged listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Page with no follow-up cursor.
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

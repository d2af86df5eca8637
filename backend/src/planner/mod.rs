//! Planner orchestrator.
//!
//! Loads pending stops and hub depots, chooses vehicles, runs the ALNS
//! kernel or the greedy fallback, and materialises the winning plans into
//! persisted routes with ETAs and planned break legs. Metrics are recorded
//! to the store and to the in-process registry; planned breaks fan out as
//! `hos.break.planned` events.

pub mod alns;
pub mod greedy;
pub mod metrics;

pub use self::metrics::PlanMetricsRegistry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::geo::{haversine_m, speed_mps, DEFAULT_SPEED_KPH};
use crate::domain::ports::{DispatchStore, StoreError};
use crate::models::{
    Algorithm, CostBreakdown, GeoPoint, Leg, LegKind, LegStatus, ObjectiveWeights,
    OptimizeRequest, PlanConstraints, PlanMetrics, PlanOutcome, Route, RouteStatus, Stop, Vehicle,
};
use crate::webhooks::EventFanout;

use self::alns::{PlannerNode, PlannerVehicle, PlannerWindow, Problem};

/// Stops considered per planning run.
const MAX_STOPS_PER_RUN: usize = 500;
/// Default kernel wall-clock budget.
const DEFAULT_TIME_BUDGET_MS: u64 = 300;
/// Bounded 2-opt passes in the greedy path.
const GREEDY_TWO_OPT_PASSES: u32 = 2;

/// A materialised route plus its side artefacts.
struct MaterializedRoute {
    route: Route,
    stop_ids: Vec<String>,
    planned_breaks: Vec<PlannedBreak>,
}

/// One break leg planned into a route.
struct PlannedBreak {
    break_sec: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Orchestrates planning runs against the store.
pub struct Planner {
    store: Arc<dyn DispatchStore>,
    registry: Arc<PlanMetricsRegistry>,
}

impl Planner {
    pub fn new(store: Arc<dyn DispatchStore>, registry: Arc<PlanMetricsRegistry>) -> Self {
        Self { store, registry }
    }

    /// Plan routes for the request, persist them and fan out planned-break
    /// events. Fewer than two pending stops produce one empty route.
    pub async fn plan(
        &self,
        tenant: &str,
        request: &OptimizeRequest,
        fanout: &EventFanout,
    ) -> Result<PlanOutcome, StoreError> {
        let now = Utc::now();
        let batch_id = format!("opt_{}", Uuid::new_v4().simple());
        let stops = self.store.pending_stops(tenant, MAX_STOPS_PER_RUN).await?;

        if stops.len() < 2 {
            let route = empty_route(tenant, &request.plan_date);
            self.store.insert_route(route.clone()).await?;
            info!(tenant, batch_id, "planned an empty route: fewer than two stops");
            return Ok(PlanOutcome {
                batch_id,
                routes: vec![route],
            });
        }

        let constraints = request.constraints.unwrap_or_default();
        let objectives = match &request.objectives {
            Some(overrides) => ObjectiveWeights::default().overlaid(overrides),
            None => ObjectiveWeights::default(),
        };
        let depots: Vec<GeoPoint> = self
            .store
            .hub_geofences(tenant)
            .await?
            .into_iter()
            .filter_map(|fence| fence.center)
            .collect();

        let materialized = match request.algorithm {
            Algorithm::Alns => {
                self.plan_alns(tenant, request, &stops, &depots, &constraints, objectives, now)
                    .await?
            }
            Algorithm::Greedy => {
                self.plan_greedy(tenant, request, &stops, &depots, &constraints, objectives, now)
                    .await?
            }
        };

        let mut routes = Vec::with_capacity(materialized.len());
        for item in materialized {
            self.store.insert_route(item.route.clone()).await?;
            if !item.stop_ids.is_empty() {
                self.store
                    .mark_stops_scheduled(tenant, &item.stop_ids)
                    .await?;
            }
            for planned in &item.planned_breaks {
                let data = json!({
                    "routeId": item.route.id,
                    "breakSec": planned.break_sec,
                    "start": planned.start,
                    "end": planned.end,
                });
                if let Err(error) = self
                    .store
                    .record_event(tenant, "hos.break.planned", data.clone())
                    .await
                {
                    warn!(%error, route = %item.route.id, "break event record failed");
                }
                fanout
                    .broadcast(tenant, &item.route.id, "hos.break.planned", data)
                    .await;
            }
            routes.push(item.route);
        }

        info!(
            tenant,
            batch_id,
            algorithm = request.algorithm.as_str(),
            routes = routes.len(),
            "planning run complete"
        );
        Ok(PlanOutcome { batch_id, routes })
    }

    #[allow(clippy::too_many_arguments)]
    async fn plan_alns(
        &self,
        tenant: &str,
        request: &OptimizeRequest,
        stops: &[Stop],
        depots: &[GeoPoint],
        constraints: &PlanConstraints,
        objectives: ObjectiveWeights,
        now: DateTime<Utc>,
    ) -> Result<Vec<MaterializedRoute>, StoreError> {
        let vehicles = self.choose_vehicles(tenant, request, stops.len()).await?;
        let depot = depots.first().copied();

        let planner_vehicles: Vec<PlannerVehicle> = vehicles
            .iter()
            .map(|vehicle| PlannerVehicle {
                id: vehicle.id.clone(),
                cap_weight: vehicle.capacity.weight,
                cap_volume: vehicle.capacity.volume,
                skills: vehicle.skills.clone(),
                start: depot.map(|point| (point.lat, point.lng)),
                end: depot.map(|point| (point.lat, point.lng)),
            })
            .collect();

        let nodes: Vec<PlannerNode> = stops
            .iter()
            .map(|stop| PlannerNode {
                id: stop.id.clone(),
                lat: stop.location.lat,
                lng: stop.location.lng,
                service_sec: stop.service_sec,
                window: stop.time_window.map(|window| PlannerWindow {
                    start_sec: Some(seconds_from(now, window.start)),
                    end_sec: Some(seconds_from(now, window.end)),
                }),
                demand: stop.demand,
                skills: stop.required_skills.clone(),
            })
            .collect();

        let problem = Problem {
            nodes,
            vehicles: planner_vehicles,
            speed_kph: DEFAULT_SPEED_KPH,
            objectives,
            hos_max_drive_sec: constraints.hos_max_drive_sec,
            break_sec: constraints.break_sec,
            iterations_limit: request
                .max_iterations
                .filter(|limit| *limit > 0)
                .map(u64::from),
            initial_temp: request.init_temp.unwrap_or(0.0),
            cooling: request.cooling.unwrap_or(0.0),
            initial_removal_weights: request.removal_weights.unwrap_or([1.0, 1.0]),
            initial_insertion_weights: request.insertion_weights.unwrap_or([1.0, 1.0]),
        };
        let budget =
            StdDuration::from_millis(request.time_budget_ms.unwrap_or(DEFAULT_TIME_BUDGET_MS));

        let (solution, kernel) = alns::solve(&problem, None, budget);

        let metrics = PlanMetrics {
            algo: Algorithm::Alns,
            iterations: kernel.iterations,
            improvements: kernel.improvements,
            accepted_worse: kernel.accepted_worse,
            best_cost: kernel.best_cost,
            final_cost: kernel.final_cost,
            removal_selects: kernel.removal_selects,
            insert_selects: kernel.insert_selects,
            init_temp: problem.initial_temp,
            cooling: problem.cooling,
            init_removal_weights: problem.initial_removal_weights,
            init_insertion_weights: problem.initial_insertion_weights,
            final_removal_weights: kernel.final_removal_weights,
            final_insertion_weights: kernel.final_insertion_weights,
            objectives,
        };
        self.store
            .save_plan_metrics(tenant, &request.plan_date, metrics.clone())
            .await?;
        self.registry.record(tenant, &request.plan_date, metrics);
        if !kernel.snapshots.is_empty() {
            self.store
                .save_weight_snapshots(
                    tenant,
                    &request.plan_date,
                    Algorithm::Alns,
                    kernel.snapshots.clone(),
                )
                .await?;
        }

        let mut materialized = Vec::new();
        for plan in &solution.plans {
            if plan.order.is_empty() {
                continue;
            }
            let ordered: Vec<&Stop> = plan.order.iter().map(|&idx| &stops[idx]).collect();
            materialized.push(materialize_route(
                tenant,
                &request.plan_date,
                &ordered,
                depot,
                constraints,
                objectives,
                now,
            ));
        }
        Ok(materialized)
    }

    #[allow(clippy::too_many_arguments)]
    async fn plan_greedy(
        &self,
        tenant: &str,
        request: &OptimizeRequest,
        stops: &[Stop],
        depots: &[GeoPoint],
        constraints: &PlanConstraints,
        objectives: ObjectiveWeights,
        now: DateTime<Utc>,
    ) -> Result<Vec<MaterializedRoute>, StoreError> {
        let points: Vec<(f64, f64)> = stops
            .iter()
            .map(|stop| (stop.location.lat, stop.location.lng))
            .collect();
        let k = if request.vehicle_pool.is_empty() {
            default_vehicle_count(stops.len())
        } else {
            request.vehicle_pool.len()
        };
        let seeds = greedy::farthest_first_seeds(&points, k);
        let clusters = greedy::cluster_by_nearest_seed(&points, &seeds);

        let metrics = PlanMetrics {
            algo: Algorithm::Greedy,
            iterations: 1,
            improvements: 0,
            accepted_worse: 0,
            best_cost: 0.0,
            final_cost: 0.0,
            removal_selects: [0, 0],
            insert_selects: [0, 0],
            init_temp: 0.0,
            cooling: 0.0,
            init_removal_weights: [0.0, 0.0],
            init_insertion_weights: [0.0, 0.0],
            final_removal_weights: [0.0, 0.0],
            final_insertion_weights: [0.0, 0.0],
            objectives,
        };
        self.store
            .save_plan_metrics(tenant, &request.plan_date, metrics.clone())
            .await?;
        self.registry.record(tenant, &request.plan_date, metrics);

        let mut materialized = Vec::new();
        for (ci, members) in clusters.iter().enumerate() {
            if members.len() < 2 {
                materialized.push(MaterializedRoute {
                    route: empty_route(tenant, &request.plan_date),
                    stop_ids: Vec::new(),
                    planned_breaks: Vec::new(),
                });
                continue;
            }
            let order = greedy::nearest_neighbour_order(&points, members, seeds[ci]);
            let order = greedy::improve_order_two_opt(&points, &order, GREEDY_TWO_OPT_PASSES);
            let ordered: Vec<&Stop> = order.iter().map(|&idx| &stops[idx]).collect();
            let depot = nearest_depot(depots, ordered[0].location);
            materialized.push(materialize_route(
                tenant,
                &request.plan_date,
                &ordered,
                depot,
                constraints,
                objectives,
                now,
            ));
        }
        Ok(materialized)
    }

    /// Hydrate the requested vehicle pool, or synthesise anonymous vehicles.
    async fn choose_vehicles(
        &self,
        tenant: &str,
        request: &OptimizeRequest,
        stop_count: usize,
    ) -> Result<Vec<Vehicle>, StoreError> {
        if request.vehicle_pool.is_empty() {
            let k = default_vehicle_count(stop_count);
            return Ok((0..k)
                .map(|_| Vehicle::anonymous(tenant, Uuid::new_v4().to_string()))
                .collect());
        }
        let mut vehicles = Vec::with_capacity(request.vehicle_pool.len());
        for id in &request.vehicle_pool {
            let vehicle = self
                .store
                .vehicle(tenant, id)
                .await?
                .unwrap_or_else(|| Vehicle::anonymous(tenant, id.clone()));
            vehicles.push(vehicle);
        }
        Ok(vehicles)
    }
}

/// `min(3, ceil(n / 20))`, at least one.
fn default_vehicle_count(stop_count: usize) -> usize {
    let k = (stop_count + 19) / 20;
    k.clamp(1, 3)
}

fn seconds_from(base: DateTime<Utc>, instant: DateTime<Utc>) -> f64 {
    (instant - base).num_milliseconds() as f64 / 1000.0
}

fn nearest_depot(depots: &[GeoPoint], to: GeoPoint) -> Option<GeoPoint> {
    depots
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = haversine_m(a.lat, a.lng, to.lat, to.lng);
            let db = haversine_m(b.lat, b.lng, to.lat, to.lng);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn empty_route(tenant: &str, plan_date: &str) -> Route {
    Route {
        id: Uuid::new_v4().to_string(),
        tenant: tenant.to_owned(),
        plan_date: plan_date.to_owned(),
        version: 1,
        status: RouteStatus::Planned,
        driver_id: None,
        vehicle_id: None,
        legs: Vec::new(),
        auto_advance: None,
        cost_breakdown: None,
        breaks_count: 0,
        total_break_sec: 0,
    }
}

/// Build a persisted route from an ordered stop sequence.
///
/// Legs are materialised in order: an optional depot approach leg (already
/// `in_progress`), drive legs between consecutive stops with a planned break
/// leg wherever the continuous-drive budget would be exceeded, and an
/// optional return-to-depot leg. Arrival ETAs are clamped up to the window
/// start when early; the first leg of a depot-less route starts
/// `in_progress`.
fn materialize_route(
    tenant: &str,
    plan_date: &str,
    ordered: &[&Stop],
    depot: Option<GeoPoint>,
    constraints: &PlanConstraints,
    objectives: ObjectiveWeights,
    now: DateTime<Utc>,
) -> MaterializedRoute {
    let speed = speed_mps(DEFAULT_SPEED_KPH);
    let route_id = Uuid::new_v4().to_string();
    let mut legs: Vec<Leg> = Vec::new();
    let mut planned_breaks = Vec::new();
    let mut current = now;
    let mut seq = 1u32;
    let mut drive_cum = 0u32;
    let mut lateness_sec = 0.0f64;

    if let Some(depot_point) = depot {
        let first = ordered[0];
        let dist = haversine_m(
            depot_point.lat,
            depot_point.lng,
            first.location.lat,
            first.location.lng,
        )
        .round() as u32;
        let drive = (f64::from(dist) / speed).round() as u32;
        let mut eta_arrival = current + Duration::seconds(i64::from(drive));
        if let Some(window) = &first.time_window {
            if eta_arrival < window.start {
                eta_arrival = window.start;
            }
            if eta_arrival > window.end {
                lateness_sec += (eta_arrival - window.end).num_seconds() as f64;
            }
        }
        let eta_departure = eta_arrival + Duration::seconds(i64::from(first.service_sec));
        legs.push(Leg {
            id: Uuid::new_v4().to_string(),
            seq,
            kind: LegKind::Drive,
            from_stop_id: None,
            to_stop_id: Some(first.id.clone()),
            dist_m: dist,
            drive_sec: drive,
            break_sec: 0,
            eta_arrival,
            eta_departure,
            status: LegStatus::InProgress,
        });
        current = eta_departure;
        drive_cum += drive;
        seq += 1;
    }

    for pair in ordered.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let dist = haversine_m(
            from.location.lat,
            from.location.lng,
            to.location.lat,
            to.location.lng,
        )
        .round() as u32;
        let drive = (f64::from(dist) / speed).round() as u32;

        if constraints.hos_max_drive_sec > 0
            && drive_cum + drive > constraints.hos_max_drive_sec
            && seq > 1
        {
            let start = current;
            let end = current + Duration::seconds(i64::from(constraints.break_sec));
            legs.push(Leg {
                id: Uuid::new_v4().to_string(),
                seq,
                kind: LegKind::Break,
                from_stop_id: None,
                to_stop_id: None,
                dist_m: 0,
                drive_sec: 0,
                break_sec: constraints.break_sec,
                eta_arrival: start,
                eta_departure: end,
                status: LegStatus::Pending,
            });
            planned_breaks.push(PlannedBreak {
                break_sec: constraints.break_sec,
                start,
                end,
            });
            current = end;
            drive_cum = 0;
            seq += 1;
        }

        let mut eta_arrival = current + Duration::seconds(i64::from(drive));
        if let Some(window) = &to.time_window {
            if eta_arrival < window.start {
                eta_arrival = window.start;
            }
            if eta_arrival > window.end {
                lateness_sec += (eta_arrival - window.end).num_seconds() as f64;
            }
        }
        let eta_departure = eta_arrival + Duration::seconds(i64::from(to.service_sec));
        let status = if seq == 1 && depot.is_none() {
            LegStatus::InProgress
        } else {
            LegStatus::Pending
        };
        legs.push(Leg {
            id: Uuid::new_v4().to_string(),
            seq,
            kind: LegKind::Drive,
            from_stop_id: Some(from.id.clone()),
            to_stop_id: Some(to.id.clone()),
            dist_m: dist,
            drive_sec: drive,
            break_sec: 0,
            eta_arrival,
            eta_departure,
            status,
        });
        current = eta_departure;
        drive_cum += drive;
        seq += 1;
    }

    if let Some(depot_point) = depot {
        let last = ordered[ordered.len() - 1];
        let dist = haversine_m(
            last.location.lat,
            last.location.lng,
            depot_point.lat,
            depot_point.lng,
        )
        .round() as u32;
        let drive = (f64::from(dist) / speed).round() as u32;
        let eta_arrival = current + Duration::seconds(i64::from(drive));
        legs.push(Leg {
            id: Uuid::new_v4().to_string(),
            seq,
            kind: LegKind::Drive,
            from_stop_id: Some(last.id.clone()),
            to_stop_id: None,
            dist_m: dist,
            drive_sec: drive,
            break_sec: 0,
            eta_arrival,
            eta_departure: eta_arrival,
            status: LegStatus::Pending,
        });
    }

    let drive_total: f64 = legs.iter().map(|leg| f64::from(leg.drive_sec)).sum();
    let dist_total: f64 = legs.iter().map(|leg| f64::from(leg.dist_m)).sum();
    let breakdown = CostBreakdown {
        drive_sec: drive_total,
        dist_m: dist_total,
        lateness_sec,
        total: objectives.drive_time * drive_total
            + objectives.distance * dist_total
            + objectives.lateness * lateness_sec,
    };

    let mut route = Route {
        id: route_id,
        tenant: tenant.to_owned(),
        plan_date: plan_date.to_owned(),
        version: 1,
        status: RouteStatus::Planned,
        driver_id: None,
        vehicle_id: None,
        legs,
        auto_advance: None,
        cost_breakdown: Some(breakdown),
        breaks_count: 0,
        total_break_sec: 0,
    };
    route.refresh_break_summary();

    MaterializedRoute {
        stop_ids: ordered.iter().map(|stop| stop.id.clone()).collect(),
        planned_breaks,
        route,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StopKind, StopStatus, TimeWindow};
    use rstest::rstest;

    fn stop(id: &str, lat: f64, lng: f64) -> Stop {
        Stop {
            id: id.to_owned(),
            tenant: "t_test".to_owned(),
            order_id: "order-1".to_owned(),
            kind: StopKind::Dropoff,
            address: None,
            location: GeoPoint { lat, lng },
            time_window: None,
            service_sec: 0,
            required_skills: Vec::new(),
            demand: Default::default(),
            status: StopStatus::Pending,
        }
    }

    #[rstest]
    #[case(1, 1)]
    #[case(20, 1)]
    #[case(21, 2)]
    #[case(41, 3)]
    #[case(500, 3)]
    fn anonymous_vehicle_count(#[case] stops: usize, #[case] expected: usize) {
        assert_eq!(default_vehicle_count(stops), expected);
    }

    #[rstest]
    fn depotless_route_starts_in_progress() {
        let a = stop("a", 52.50, 13.40);
        let b = stop("b", 52.51, 13.41);
        let ordered = vec![&a, &b];
        let built = materialize_route(
            "t_test",
            "2024-01-01",
            &ordered,
            None,
            &PlanConstraints::default(),
            ObjectiveWeights::default(),
            Utc::now(),
        );
        assert_eq!(built.route.legs.len(), 1);
        let leg = &built.route.legs[0];
        assert_eq!(leg.status, LegStatus::InProgress);
        assert_eq!(leg.from_stop_id.as_deref(), Some("a"));
        assert_eq!(leg.to_stop_id.as_deref(), Some("b"));
        assert!(leg.dist_m > 0);
    }

    #[rstest]
    fn depot_route_opens_and_closes_at_the_depot() {
        let a = stop("a", 52.50, 13.40);
        let b = stop("b", 52.51, 13.41);
        let ordered = vec![&a, &b];
        let depot = GeoPoint {
            lat: 52.48,
            lng: 13.35,
        };
        let built = materialize_route(
            "t_test",
            "2024-01-01",
            &ordered,
            Some(depot),
            &PlanConstraints::default(),
            ObjectiveWeights::default(),
            Utc::now(),
        );
        let legs = &built.route.legs;
        assert_eq!(legs.len(), 3);
        assert_eq!(legs[0].status, LegStatus::InProgress);
        assert_eq!(legs[0].from_stop_id, None);
        assert_eq!(legs[2].to_stop_id, None);
        assert!(legs[1..].iter().all(|leg| leg.status == LegStatus::Pending));
    }

    #[rstest]
    fn break_leg_is_planned_when_drive_budget_runs_out() {
        let a = stop("a", 0.0, 0.0);
        let b = stop("b", 0.0, 0.5);
        let c = stop("c", 0.0, 1.0);
        let ordered = vec![&a, &b, &c];
        let constraints = PlanConstraints {
            hos_max_drive_sec: 3000,
            break_sec: 900,
        };
        let built = materialize_route(
            "t_test",
            "2024-01-01",
            &ordered,
            None,
            &constraints,
            ObjectiveWeights::default(),
            Utc::now(),
        );
        let break_legs: Vec<&Leg> = built
            .route
            .legs
            .iter()
            .filter(|leg| leg.kind == LegKind::Break)
            .collect();
        assert!(!break_legs.is_empty());
        assert!(break_legs.iter().all(|leg| leg.break_sec == 900));
        assert_eq!(built.planned_breaks.len(), break_legs.len());
        assert_eq!(built.route.breaks_count as usize, break_legs.len());
    }

    #[rstest]
    fn early_arrival_waits_for_the_window() {
        let now = Utc::now();
        let a = stop("a", 52.50, 13.40);
        let mut b = stop("b", 52.501, 13.401);
        let window_start = now + Duration::hours(2);
        b.time_window = Some(TimeWindow {
            start: window_start,
            end: now + Duration::hours(3),
        });
        let ordered = vec![&a, &b];
        let built = materialize_route(
            "t_test",
            "2024-01-01",
            &ordered,
            None,
            &PlanConstraints::default(),
            ObjectiveWeights::default(),
            now,
        );
        assert_eq!(built.route.legs[0].eta_arrival, window_start);
    }
}

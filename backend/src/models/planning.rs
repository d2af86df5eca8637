//! Planning requests, tenant optimizer configuration and planner metrics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Route;

/// Planner algorithm selection. Runtime dispatch is plain data on this enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Greedy,
    Alns,
}

impl Algorithm {
    /// Wire spelling of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greedy => "greedy",
            Self::Alns => "alns",
        }
    }
}

/// Objective weights for the planner cost function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectiveWeights {
    pub drive_time: f64,
    pub distance: f64,
    pub lateness: f64,
    pub failed: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            drive_time: 1.0,
            distance: 0.1,
            lateness: 4.0,
            failed: 50.0,
        }
    }
}

impl ObjectiveWeights {
    /// Overlay request-supplied weights (by wire key) onto the defaults.
    pub fn overlaid(mut self, overrides: &HashMap<String, f64>) -> Self {
        for (key, value) in overrides {
            match key.as_str() {
                "driveTime" => self.drive_time = *value,
                "distance" => self.distance = *value,
                "lateness" => self.lateness = *value,
                "failed" => self.failed = *value,
                _ => {}
            }
        }
        self
    }
}

/// Hard constraints forwarded to the planner.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanConstraints {
    pub hos_max_drive_sec: u32,
    pub break_sec: u32,
}

impl Default for PlanConstraints {
    fn default() -> Self {
        Self {
            hos_max_drive_sec: 0,
            break_sec: 1800,
        }
    }
}

/// Route planning request for a tenant and plan date.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub plan_date: String,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub init_temp: Option<f64>,
    #[serde(default)]
    pub cooling: Option<f64>,
    #[serde(default)]
    pub removal_weights: Option<[f64; 2]>,
    #[serde(default)]
    pub insertion_weights: Option<[f64; 2]>,
    #[serde(default)]
    pub vehicle_pool: Vec<String>,
    #[serde(default)]
    pub depots: Vec<String>,
    #[serde(default)]
    pub constraints: Option<PlanConstraints>,
    #[serde(default)]
    pub objectives: Option<HashMap<String, f64>>,
}

/// Per-tenant optimizer defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizerConfig {
    pub algorithm: Algorithm,
    pub time_budget_ms: u64,
    pub max_iterations: u32,
    pub init_temp: f64,
    pub cooling: f64,
    pub removal_weights: [f64; 2],
    pub insertion_weights: [f64; 2],
    pub objectives: ObjectiveWeights,
    pub latency_buckets: Vec<u32>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Alns,
            time_budget_ms: 300,
            max_iterations: 0,
            init_temp: 1.0,
            cooling: 0.995,
            removal_weights: [1.0, 1.0],
            insertion_weights: [1.0, 1.0],
            objectives: ObjectiveWeights::default(),
            latency_buckets: vec![100, 500, 1000],
        }
    }
}

/// Recorded planner run counters for one `(tenant, planDate, algo)` cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetrics {
    pub algo: Algorithm,
    pub iterations: u64,
    pub improvements: u64,
    pub accepted_worse: u64,
    pub best_cost: f64,
    pub final_cost: f64,
    pub removal_selects: [u64; 2],
    pub insert_selects: [u64; 2],
    pub init_temp: f64,
    pub cooling: f64,
    pub init_removal_weights: [f64; 2],
    pub init_insertion_weights: [f64; 2],
    pub final_removal_weights: [f64; 2],
    pub final_insertion_weights: [f64; 2],
    pub objectives: ObjectiveWeights,
}

/// Operator weight snapshot taken periodically during a kernel run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightSnapshot {
    pub iteration: u64,
    pub removal: [f64; 2],
    pub insertion: [f64; 2],
}

/// Aggregated per-plan-date route statistics for the admin surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    pub routes: u64,
    pub legs: u64,
    pub total_dist_m: u64,
    pub total_drive_sec: u64,
    pub avg_legs_per_route: f64,
    pub breaks: u64,
    pub break_sec: u64,
}

/// Result of one optimize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    pub batch_id: String,
    pub routes: Vec<Route>,
}

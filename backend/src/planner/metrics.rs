//! Process-wide plan-metrics registry.
//!
//! The one deliberate global of the planner, wrapped behind an explicit
//! handle so tests can substitute an isolated instance. The store remains
//! the durable record; this registry is the fallback the admin surface reads
//! when the store has nothing for a plan date.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{Algorithm, PlanMetrics};

type Key = (String, String, Algorithm);

/// In-memory `(tenant, planDate, algo) -> metrics` map.
#[derive(Default)]
pub struct PlanMetricsRegistry {
    inner: Mutex<HashMap<Key, PlanMetrics>>,
}

impl PlanMetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the metrics of one planner run, replacing any previous run for
    /// the same cell.
    pub fn record(&self, tenant: &str, plan_date: &str, metrics: PlanMetrics) {
        let key = (tenant.to_owned(), plan_date.to_owned(), metrics.algo);
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.insert(key, metrics);
    }

    /// All recorded metrics for a tenant and plan date.
    pub fn get(&self, tenant: &str, plan_date: &str) -> Vec<PlanMetrics> {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut rows: Vec<PlanMetrics> = inner
            .iter()
            .filter(|((t, d, _), _)| t == tenant && d == plan_date)
            .map(|(_, metrics)| metrics.clone())
            .collect();
        rows.sort_by_key(|metrics| metrics.algo.as_str());
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample(algo: Algorithm, iterations: u64) -> PlanMetrics {
        PlanMetrics {
            algo,
            iterations,
            improvements: 0,
            accepted_worse: 0,
            best_cost: 0.0,
            final_cost: 0.0,
            removal_selects: [0, 0],
            insert_selects: [0, 0],
            init_temp: 1.0,
            cooling: 0.995,
            init_removal_weights: [1.0, 1.0],
            init_insertion_weights: [1.0, 1.0],
            final_removal_weights: [1.0, 1.0],
            final_insertion_weights: [1.0, 1.0],
            objectives: Default::default(),
        }
    }

    #[rstest]
    fn records_are_scoped_by_tenant_and_date() {
        let registry = PlanMetricsRegistry::new();
        registry.record("t1", "2024-01-01", sample(Algorithm::Alns, 10));
        registry.record("t1", "2024-01-02", sample(Algorithm::Alns, 20));
        registry.record("t2", "2024-01-01", sample(Algorithm::Greedy, 30));

        let rows = registry.get("t1", "2024-01-01");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].iterations, 10);
    }

    #[rstest]
    fn latest_run_replaces_the_cell() {
        let registry = PlanMetricsRegistry::new();
        registry.record("t1", "2024-01-01", sample(Algorithm::Alns, 10));
        registry.record("t1", "2024-01-01", sample(Algorithm::Alns, 99));
        let rows = registry.get("t1", "2024-01-01");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].iterations, 99);
    }
}

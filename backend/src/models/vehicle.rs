//! Vehicle records used by the planner.

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Weight/volume demand contributed by a stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Vehicle carrying capacity. A zero component is treated as unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub volume: f64,
}

/// A vehicle available to the planner. Immutable per planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub tenant: String,
    #[serde(default)]
    pub capacity: Capacity,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depot_start: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depot_end: Option<GeoPoint>,
}

impl Vehicle {
    /// An anonymous, unconstrained vehicle synthesised when no pool is given.
    pub fn anonymous(tenant: &str, id: String) -> Self {
        Self {
            id,
            tenant: tenant.to_owned(),
            capacity: Capacity::default(),
            skills: Vec::new(),
            depot_start: None,
            depot_end: None,
        }
    }
}

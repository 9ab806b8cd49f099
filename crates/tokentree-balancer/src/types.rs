//! Allocation report types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokentree_core::UnitKind;

/// Point-in-time snapshot of one leaf's budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AllocationReport {
    pub allocated: u64,
    pub consumed: u64,
    /// `consumed / allocated` as a percentage; 0 when nothing is allocated.
    pub utilization: f64,
    pub remaining: u64,
}

impl AllocationReport {
    pub fn new(allocated: u64, consumed: u64) -> Self {
        let utilization = if allocated == 0 {
            0.0
        } else {
            (consumed as f64 * 100.0) / allocated as f64
        };
        Self {
            allocated,
            consumed,
            utilization,
            remaining: allocated.saturating_sub(consumed),
        }
    }
}

impl std::fmt::Display for AllocationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "allocated={} consumed={} utilization={:.1}% remaining={}",
            self.allocated, self.consumed, self.utilization, self.remaining
        )
    }
}

/// Leaf reports keyed by unit id.
pub type UtilizationReport = BTreeMap<String, AllocationReport>;

/// Allocation state of any unit, leaf or internal.
#[derive(Debug, Clone, Serialize)]
pub struct UnitAllocation {
    #[serde(rename = "unitId")]
    pub unit_id: String,
    pub kind: UnitKind,
    pub allocated: u64,
    pub consumed: u64,
    pub remaining: u64,
    pub weight: u64,
    #[serde(rename = "weightOverride", skip_serializing_if = "Option::is_none")]
    pub weight_override: Option<u64>,
}

/// Which part of the tree a rebalance re-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "unit")]
pub enum RebalanceScope {
    /// Ancestors of a re-weighted unit, top-down.
    Path(String),
    /// One unit's subtree under its current allocation.
    Subtree(String),
    Full,
}

/// Summary of a committed rebalance.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceOutcome {
    #[serde(flatten)]
    pub scope: RebalanceScope,
    /// Units visited by the weight model during this rebalance.
    #[serde(rename = "weightEvaluations")]
    pub weight_evaluations: u64,
    /// Internal units whose split was recomputed.
    #[serde(rename = "unitsResplit")]
    pub units_resplit: usize,
}

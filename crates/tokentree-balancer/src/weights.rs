//! Weight model: proportional shares used to split a parent's budget.
//!
//! Leaf weight is its override or 1. Internal weight is its override or the
//! sum of its children's weights, recomputed from scratch on every call.
//! Nothing is memoized, so a full rebalance is quadratic in the leaf count.

use std::cell::Cell;

use tokentree_core::{Error, Result};

use crate::topology::{Topology, UnitIdx};

pub const DEFAULT_LEAF_WEIGHT: u64 = 1;

/// Largest accepted override. Keeps any subtree sum well inside `u64`.
pub const MAX_WEIGHT: u64 = u32::MAX as u64;

/// Per-unit weight overrides plus a visit counter.
#[derive(Debug, Clone)]
pub struct WeightModel {
    overrides: Vec<Option<u64>>,
    visits: Cell<u64>,
}

impl WeightModel {
    pub fn new(topology: &Topology) -> Self {
        Self {
            overrides: vec![None; topology.len()],
            visits: Cell::new(0),
        }
    }

    /// Weight of `idx`, walking its subtree unless overridden.
    pub fn weight_of(&self, topology: &Topology, idx: UnitIdx) -> u64 {
        self.visits.set(self.visits.get() + 1);

        if let Some(weight) = self.overrides[idx.get()] {
            return weight;
        }
        match topology.children(idx) {
            None => DEFAULT_LEAF_WEIGHT,
            Some((l, r)) => self
                .weight_of(topology, l)
                .saturating_add(self.weight_of(topology, r)),
        }
    }

    /// Replace the stored weight of a single unit. Does not cascade.
    ///
    /// Weights outside `1..=MAX_WEIGHT` are rejected and nothing is stored.
    pub fn set_override(&mut self, topology: &Topology, idx: UnitIdx, weight: u64) -> Result<()> {
        if !(DEFAULT_LEAF_WEIGHT..=MAX_WEIGHT).contains(&weight) {
            return Err(Error::InvalidWeight {
                unit: topology.id(idx).to_string(),
                weight,
            });
        }
        self.overrides[idx.get()] = Some(weight);
        Ok(())
    }

    pub fn clear_override(&mut self, idx: UnitIdx) {
        self.overrides[idx.get()] = None;
    }

    pub fn override_of(&self, idx: UnitIdx) -> Option<u64> {
        self.overrides[idx.get()]
    }

    /// Restore a previously observed override state.
    pub(crate) fn restore(&mut self, idx: UnitIdx, previous: Option<u64>) {
        self.overrides[idx.get()] = previous;
    }

    /// Units visited by `weight_of` since the last reset.
    pub fn visits(&self) -> u64 {
        self.visits.get()
    }

    pub fn reset_visits(&self) {
        self.visits.set(0);
    }
}

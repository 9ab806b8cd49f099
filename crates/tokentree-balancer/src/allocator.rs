//! Token allocator. Splits the total budget down the hierarchy by weight
//! and tracks consumption.
//!
//! Complexity:
//! - `query`: O(1), hash lookup plus table index.
//! - `consume`: O(1).
//! - `initialize`: O(n) splits, each evaluating two child weights.
//! - `update_weight`: O(log n) ancestors re-split, each weight evaluation
//!   walking that ancestor's subtree.
//! - `full_rebalance`: every unit's weight recomputed independently, O(n²)
//!   in the worst case, then one top-down pass.
//! - `utilization_report`: O(leaves).
//!
//! Every split uses integer arithmetic; the remainder goes to the right
//! child so results are reproducible. Rebalances are staged on a copy of the
//! allocation table and committed only if no leaf would drop below what it
//! has already consumed.
//!
//! The allocator is plain owned state. Callers hold `&mut Allocator` for any
//! mutation, so a single writer is enforced by the borrow checker inside one
//! thread; across threads the owner must serialize access.

use std::sync::Arc;

use tokentree_core::{Error, Result};
use tracing::{debug, info};

use crate::topology::{Topology, UnitIdx};
use crate::types::*;
use crate::weights::WeightModel;

pub struct Allocator {
    topology: Arc<Topology>,
    weights: WeightModel,
    total_budget: u64,
    allocated: Vec<u64>,
    consumed: Vec<u64>,
}

impl Allocator {
    /// Create an allocator with nothing allocated yet.
    pub fn new(topology: Arc<Topology>) -> Self {
        let n = topology.len();
        Self {
            weights: WeightModel::new(&topology),
            topology,
            total_budget: 0,
            allocated: vec![0; n],
            consumed: vec![0; n],
        }
    }

    /// Create and initialize in one step.
    pub fn with_budget(topology: Arc<Topology>, total_budget: u64) -> Self {
        let mut allocator = Self::new(topology);
        allocator.initialize(total_budget);
        allocator
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn total_budget(&self) -> u64 {
        self.total_budget
    }

    pub fn weights(&self) -> &WeightModel {
        &self.weights
    }

    /// Give the root `total_budget` and split it down the whole tree.
    /// Consumption counters start over.
    pub fn initialize(&mut self, total_budget: u64) {
        let root = self.topology.root();
        let mut next = vec![0; self.topology.len()];
        next[root.get()] = total_budget;
        let resplit = self.split_down(root, &mut next, &|idx| self.current_weight(idx));

        self.total_budget = total_budget;
        self.allocated = next;
        self.consumed.iter_mut().for_each(|c| *c = 0);

        info!(
            "Allocator initialized: budget={}, units={}, splits={}",
            total_budget,
            self.topology.len(),
            resplit
        );
    }

    /// Current allocation of a unit by id.
    pub fn query(&self, unit_id: &str) -> Result<u64> {
        let idx = self.topology.lookup(unit_id)?;
        Ok(self.allocated[idx.get()])
    }

    pub fn allocated(&self, idx: UnitIdx) -> u64 {
        self.allocated[idx.get()]
    }

    pub fn consumed(&self, idx: UnitIdx) -> u64 {
        self.consumed[idx.get()]
    }

    pub fn remaining(&self, idx: UnitIdx) -> u64 {
        self.allocated[idx.get()].saturating_sub(self.consumed[idx.get()])
    }

    pub fn weight_of(&self, idx: UnitIdx) -> u64 {
        self.current_weight(idx)
    }

    /// Draw `amount` from a leaf's budget by id.
    pub fn consume(&mut self, unit_id: &str, amount: u64) -> Result<()> {
        let idx = self.topology.lookup(unit_id)?;
        self.consume_at(idx, amount).map(|_| ())
    }

    /// Draw `amount` from a leaf's budget. Returns what is left.
    ///
    /// Fails with `BudgetExhausted` and changes nothing when `amount`
    /// exceeds the remaining budget.
    pub fn consume_at(&mut self, idx: UnitIdx, amount: u64) -> Result<u64> {
        let unit = self.topology.unit(idx);
        if !unit.is_leaf() {
            return Err(Error::NotALeaf(unit.id.clone()));
        }

        let remaining = self.remaining(idx);
        if amount > remaining {
            return Err(Error::BudgetExhausted {
                unit: unit.id.clone(),
                requested: amount,
                remaining,
            });
        }

        self.consumed[idx.get()] += amount;
        debug!(
            "{} consumed {} tokens, {} remaining",
            unit.id,
            amount,
            remaining - amount
        );
        Ok(remaining - amount)
    }

    /// Book an internal unit's per-call overhead. Reporting only; internal
    /// units have no budget check of their own.
    pub fn record_overhead(&mut self, idx: UnitIdx, amount: u64) {
        let slot = &mut self.consumed[idx.get()];
        *slot = slot.saturating_add(amount);
    }

    /// Zero every consumption counter, keeping allocations.
    pub fn reset_consumption(&mut self) {
        self.consumed.iter_mut().for_each(|c| *c = 0);
        info!("Consumption counters reset");
    }

    /// Override a unit's weight and re-split every ancestor from the root
    /// down to it.
    ///
    /// Each re-split evaluates two child weights (a walk of each child's
    /// subtree) and the sibling subtree that is not on the path is re-derived
    /// under its new total. If the result would leave any leaf below its
    /// consumption the override is reverted and nothing changes.
    pub fn update_weight(&mut self, unit_id: &str, weight: u64) -> Result<RebalanceOutcome> {
        let idx = self.topology.lookup(unit_id)?;
        let previous = self.weights.override_of(idx);
        self.weights.set_override(&self.topology, idx, weight)?;
        self.weights.reset_visits();

        let mut next = self.allocated.clone();
        let path = self.topology.path_from_root(idx);
        let mut resplit = 0;

        for window in path.windows(2) {
            let (ancestor, on_path) = (window[0], window[1]);
            resplit += self.split_node(ancestor, &mut next, &|i| self.current_weight(i));
            if let Some((l, r)) = self.topology.children(ancestor) {
                let off_path = if l == on_path { r } else { l };
                resplit += self.split_down(off_path, &mut next, &|i| self.current_weight(i));
            }
        }
        resplit += self.split_down(idx, &mut next, &|i| self.current_weight(i));

        let outcome = RebalanceOutcome {
            scope: RebalanceScope::Path(unit_id.to_string()),
            weight_evaluations: self.weights.visits(),
            units_resplit: resplit,
        };

        if let Err(e) = self.commit(next) {
            self.weights.restore(idx, previous);
            return Err(e);
        }

        info!(
            "Weight of {} set to {}; path rebalance re-split {} units ({} weight evaluations)",
            unit_id, weight, outcome.units_resplit, outcome.weight_evaluations
        );
        Ok(outcome)
    }

    /// Remove a weight override, then run a full rebalance.
    pub fn clear_weight(&mut self, unit_id: &str) -> Result<RebalanceOutcome> {
        let idx = self.topology.lookup(unit_id)?;
        let previous = self.weights.override_of(idx);
        self.weights.clear_override(idx);
        match self.full_rebalance() {
            Ok(mut outcome) => {
                outcome.scope = RebalanceScope::Path(unit_id.to_string());
                Ok(outcome)
            }
            Err(e) => {
                self.weights.restore(idx, previous);
                Err(e)
            }
        }
    }

    /// Re-split one unit's current allocation down its subtree.
    pub fn rebalance_subtree(&mut self, unit_id: &str) -> Result<RebalanceOutcome> {
        let idx = self.topology.lookup(unit_id)?;
        self.weights.reset_visits();

        let mut next = self.allocated.clone();
        let resplit = self.split_down(idx, &mut next, &|i| self.current_weight(i));
        let outcome = RebalanceOutcome {
            scope: RebalanceScope::Subtree(unit_id.to_string()),
            weight_evaluations: self.weights.visits(),
            units_resplit: resplit,
        };
        self.commit(next)?;

        info!(
            "Subtree rebalance at {}: {} units re-split",
            unit_id, outcome.units_resplit
        );
        Ok(outcome)
    }

    /// Recompute every unit's weight, then re-split the whole tree.
    ///
    /// Each unit's weight is derived independently by walking its subtree,
    /// so this is quadratic in the worst case. It is meant to run rarely.
    pub fn full_rebalance(&mut self) -> Result<RebalanceOutcome> {
        self.weights.reset_visits();

        let table: Vec<u64> = self
            .topology
            .units()
            .map(|(idx, _)| self.weights.weight_of(&self.topology, idx))
            .collect();

        let root = self.topology.root();
        let mut next = vec![0; self.topology.len()];
        next[root.get()] = self.total_budget;
        let resplit = self.split_down(root, &mut next, &|i| table[i.get()]);

        let outcome = RebalanceOutcome {
            scope: RebalanceScope::Full,
            weight_evaluations: self.weights.visits(),
            units_resplit: resplit,
        };
        self.commit(next)?;

        info!(
            "Full rebalance: {} units re-split, {} weight evaluations",
            outcome.units_resplit, outcome.weight_evaluations
        );
        Ok(outcome)
    }

    /// Snapshot of every leaf, keyed by unit id.
    pub fn utilization_report(&self) -> UtilizationReport {
        self.topology
            .leaves()
            .iter()
            .map(|&leaf| {
                (
                    self.topology.id(leaf).to_string(),
                    AllocationReport::new(self.allocated(leaf), self.consumed(leaf)),
                )
            })
            .collect()
    }

    /// Allocation state of one unit.
    pub fn unit_allocation(&self, unit_id: &str) -> Result<UnitAllocation> {
        let idx = self.topology.lookup(unit_id)?;
        let unit = self.topology.unit(idx);
        Ok(UnitAllocation {
            unit_id: unit.id.clone(),
            kind: unit.kind,
            allocated: self.allocated(idx),
            consumed: self.consumed(idx),
            remaining: self.remaining(idx),
            weight: self.current_weight(idx),
            weight_override: self.weights.override_of(idx),
        })
    }

    fn current_weight(&self, idx: UnitIdx) -> u64 {
        self.weights.weight_of(&self.topology, idx)
    }

    /// Split `alloc[idx]` between its two children. Returns 1 if a split
    /// happened, 0 for a leaf.
    fn split_node(&self, idx: UnitIdx, alloc: &mut [u64], weight: &dyn Fn(UnitIdx) -> u64) -> usize {
        let Some((l, r)) = self.topology.children(idx) else {
            return 0;
        };
        let (wl, wr) = (weight(l), weight(r));
        let budget = alloc[idx.get()];
        let left = split_left(budget, wl, wr);
        alloc[l.get()] = left;
        alloc[r.get()] = budget - left;
        1
    }

    /// Split `alloc[idx]` recursively through its whole subtree.
    fn split_down(&self, idx: UnitIdx, alloc: &mut [u64], weight: &dyn Fn(UnitIdx) -> u64) -> usize {
        let Some((l, r)) = self.topology.children(idx) else {
            return 0;
        };
        let mut resplit = self.split_node(idx, alloc, weight);
        resplit += self.split_down(l, alloc, weight);
        resplit += self.split_down(r, alloc, weight);
        resplit
    }

    /// Install a staged allocation table unless a leaf would drop below its
    /// consumption.
    fn commit(&mut self, next: Vec<u64>) -> Result<()> {
        for &leaf in self.topology.leaves() {
            let consumed = self.consumed[leaf.get()];
            if next[leaf.get()] < consumed {
                return Err(Error::AllocationBelowConsumption {
                    unit: self.topology.id(leaf).to_string(),
                    allocated: next[leaf.get()],
                    consumed,
                });
            }
        }
        self.allocated = next;
        Ok(())
    }
}

/// Left child's share: `floor(budget * wl / (wl + wr))`.
fn split_left(budget: u64, wl: u64, wr: u64) -> u64 {
    let total = wl as u128 + wr as u128;
    if total == 0 {
        return 0;
    }
    (budget as u128 * wl as u128 / total) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokentree_core::Manifest;

    fn synthetic(depth: usize, budget: u64) -> Allocator {
        let topo = Arc::new(Topology::build(&Manifest::complete(depth)).unwrap());
        Allocator::with_budget(topo, budget)
    }

    fn assert_split_invariant(a: &Allocator) {
        let topo = a.topology().clone();
        for (idx, unit) in topo.units() {
            if let Some((l, r)) = unit.children {
                assert_eq!(
                    a.allocated(l) + a.allocated(r),
                    a.allocated(idx),
                    "split invariant broken at {}",
                    unit.id
                );
            }
        }
        assert_eq!(a.allocated(topo.root()), a.total_budget());
    }

    #[test]
    fn test_initialize_even_split() {
        let a = synthetic(3, 100_000);
        for i in 1..=8 {
            assert_eq!(a.query(&format!("L{}", i)).unwrap(), 12_500);
        }
        assert_eq!(a.query("R").unwrap(), 100_000);
        assert_split_invariant(&a);
    }

    #[test]
    fn test_remainder_goes_right() {
        let a = synthetic(1, 101);
        assert_eq!(a.query("L1").unwrap(), 50);
        assert_eq!(a.query("L2").unwrap(), 51);

        let a = synthetic(3, 7);
        assert_split_invariant(&a);
        let total: u64 = a.utilization_report().values().map(|r| r.allocated).sum();
        assert_eq!(total, 7);
        // Leftmost leaf never gets the remainder
        assert_eq!(a.query("L1").unwrap(), 0);
        assert_eq!(a.query("L8").unwrap(), 1);
    }

    #[test]
    fn test_update_weight_favours_leaf() {
        let mut a = synthetic(3, 100_000);
        a.update_weight("L1", 16).unwrap();
        assert_split_invariant(&a);

        let l1 = a.query("L1").unwrap();
        let l2 = a.query("L2").unwrap();
        for i in 2..=8 {
            assert!(l1 > a.query(&format!("L{}", i)).unwrap());
        }
        // Siblings under the same handler split 16:1
        let handler = a.query("N2-0").unwrap();
        assert_eq!(l1, handler * 16 / 17);
        assert_eq!(l2, handler - l1);
        // Root split follows subtree weights 19:4
        assert_eq!(a.query("N1-0").unwrap(), 100_000 * 19 / 23);
    }

    #[test]
    fn test_update_weight_matches_full_rebalance() {
        let mut a = synthetic(4, 1_000_003);
        a.update_weight("L5", 9).unwrap();
        let after_path = a.utilization_report();
        a.full_rebalance().unwrap();
        assert_eq!(after_path, a.utilization_report());
    }

    #[test]
    fn test_update_weight_unknown_and_invalid() {
        let mut a = synthetic(3, 1_000);
        assert!(matches!(a.update_weight("nope", 2), Err(Error::UnknownUnit(_))));
        assert!(matches!(
            a.update_weight("L1", 0),
            Err(Error::InvalidWeight { .. })
        ));
        assert_eq!(a.query("L1").unwrap(), 125);
    }

    #[test]
    fn test_oversized_weight_leaves_state_untouched() {
        let mut a = synthetic(3, 100_000);
        let before = a.utilization_report();
        let l1 = a.topology().lookup("L1").unwrap();

        let result = a.update_weight("L1", u64::MAX);
        assert!(matches!(result, Err(Error::InvalidWeight { .. })));
        assert_eq!(a.weights().override_of(l1), None);
        assert_eq!(a.utilization_report(), before);

        a.full_rebalance().unwrap();
        assert_eq!(a.unit_allocation("L1").unwrap().weight, 1);
        assert_split_invariant(&a);
    }

    #[test]
    fn test_consume_and_exhaust() {
        let mut a = synthetic(3, 100_000);
        a.consume("L3", 9_000).unwrap();
        let l3 = a.topology().lookup("L3").unwrap();
        assert_eq!(a.remaining(l3), 3_500);

        let err = a.consume("L3", 4_000).unwrap_err();
        assert!(matches!(
            err,
            Error::BudgetExhausted { requested: 4_000, remaining: 3_500, .. }
        ));
        assert_eq!(a.remaining(l3), 3_500);
        assert_eq!(a.consumed(l3), 9_000);

        // Exactly the remainder is fine
        assert_eq!(a.consume_at(l3, 3_500).unwrap(), 0);
        assert!(a.consume("L3", 1).is_err());
    }

    #[test]
    fn test_consume_internal_rejected() {
        let mut a = synthetic(3, 100_000);
        assert!(matches!(a.consume("N1-0", 1), Err(Error::NotALeaf(_))));
    }

    #[test]
    fn test_utilization_report() {
        let mut a = synthetic(3, 100_000);
        a.consume("L1", 9_000).unwrap();
        let report = a.utilization_report();
        assert_eq!(report.len(), 8);
        let l1 = report["L1"];
        assert_eq!(l1.allocated, 12_500);
        assert_eq!(l1.consumed, 9_000);
        assert_eq!(l1.utilization, 72.0);
        assert_eq!(l1.remaining, 3_500);
        assert_eq!(report["L2"].consumed, 0);
    }

    #[test]
    fn test_rebalance_rejected_below_consumption() {
        let mut a = synthetic(3, 100_000);
        a.consume("L2", 12_000).unwrap();
        let before = a.utilization_report();

        // Starving L2's sibling-weighted share would drop it under 12_000
        let err = a.update_weight("L1", 50).unwrap_err();
        assert!(matches!(err, Error::AllocationBelowConsumption { .. }));
        assert_eq!(before, a.utilization_report());
        let l1 = a.topology().lookup("L1").unwrap();
        assert_eq!(a.weights().override_of(l1), None);
    }

    #[test]
    fn test_subtree_rebalance_keeps_total() {
        let mut a = synthetic(3, 100_000);
        a.update_weight("L1", 3).unwrap();
        let n = a.topology().lookup("N1-0").unwrap();
        let before = a.allocated(n);
        let report = a.utilization_report();

        let outcome = a.rebalance_subtree("N1-0").unwrap();
        assert_eq!(outcome.units_resplit, 3);
        assert_eq!(outcome.scope, RebalanceScope::Subtree("N1-0".into()));
        assert_eq!(a.allocated(n), before);
        assert_eq!(report, a.utilization_report());
        assert_split_invariant(&a);
    }

    #[test]
    fn test_full_rebalance_cost_grows_superlinearly() {
        let mut small = synthetic(3, 1_000);
        let mut large = synthetic(7, 1_000);
        let small_cost = small.full_rebalance().unwrap().weight_evaluations;
        let large_cost = large.full_rebalance().unwrap().weight_evaluations;
        // 17x more units, far more than 17x the weight work
        assert!(large_cost > small_cost * 17);
        assert_split_invariant(&large);
    }

    #[test]
    fn test_query_cost_independent_of_size() {
        let small = synthetic(3, 1 << 20);
        let large = synthetic(7, 1 << 20);
        assert_eq!(small.topology().len(), 15);
        assert_eq!(large.topology().len(), 255);

        for (a, leaves) in [(&small, 8u64), (&large, 128)] {
            a.weights().reset_visits();
            let last = format!("L{}", leaves);
            for _ in 0..100 {
                assert_eq!(a.query("L1").unwrap(), (1 << 20) / leaves);
                assert_eq!(a.query(&last).unwrap(), (1 << 20) / leaves);
            }
            // Lookups read the allocation table; no weight is ever derived
            assert_eq!(a.weights().visits(), 0);
        }
        assert!(small.query("L9").is_err());
        assert!(large.query("L129").is_err());
    }

    #[test]
    fn test_overhead_and_reset() {
        let mut a = synthetic(3, 1_000);
        let root = a.topology().root();
        a.record_overhead(root, 30);
        a.consume("L1", 10).unwrap();
        assert_eq!(a.consumed(root), 30);
        a.reset_consumption();
        assert_eq!(a.consumed(root), 0);
        assert_eq!(a.utilization_report()["L1"].consumed, 0);
    }

    #[test]
    fn test_clear_weight_restores_even_split() {
        let mut a = synthetic(3, 100_000);
        a.update_weight("L1", 16).unwrap();
        a.clear_weight("L1").unwrap();
        assert_eq!(a.query("L1").unwrap(), 12_500);
    }

    #[test]
    fn test_unit_allocation() {
        let mut a = synthetic(3, 100_000);
        a.update_weight("L4", 2).unwrap();
        let u = a.unit_allocation("L4").unwrap();
        assert_eq!(u.weight, 2);
        assert_eq!(u.weight_override, Some(2));
        let h = a.unit_allocation("N2-1").unwrap();
        assert_eq!(h.weight, 3);
        assert_eq!(h.weight_override, None);
    }
}

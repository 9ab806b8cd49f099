//! Dispatcher: walks a request from the root to its leaves and folds the
//! results back up.
//!
//! A unit with one required child forwards: the child's result comes back
//! unchanged apart from this unit being prepended to `path` and its overhead
//! added to `tokensUsed`. A unit with both children required aggregates the
//! two results into one keyed by child id. The unit directly above a leaf
//! applies the retry policy to every leaf call.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokentree_balancer::{Allocator, Topology, UnitIdx};
use tokentree_core::{Error, ErrorCode, Result};
use tokentree_external::{Collaborator, CollaboratorSet};
use tracing::{debug, error, info, warn};

use crate::leaf;
use crate::retry::RetryPolicy;
use crate::routing::{ResolvedTarget, RoutingTable};
use crate::state::StateTracker;
use crate::types::{Request, RequestState, UnitResult};

pub struct Dispatcher {
    topology: Arc<Topology>,
    routes: RoutingTable,
    collaborators: CollaboratorSet,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(topology: Arc<Topology>, collaborators: CollaboratorSet, retry: RetryPolicy) -> Self {
        let routes = RoutingTable::build(&topology);
        info!(
            "Dispatcher initialized: leaves={}, collaborators={}, max_retries={}",
            topology.leaves().len(),
            collaborators.len(),
            retry.max_retries
        );
        Self {
            topology,
            routes,
            collaborators,
            retry,
        }
    }

    /// Dispatcher with a fresh mock bound to every leaf.
    pub fn with_mocks(topology: Arc<Topology>, retry: RetryPolicy) -> Self {
        let collaborators = CollaboratorSet::mocks(topology.leaves().iter().filter_map(|&leaf| {
            let unit = topology.unit(leaf);
            unit.interface.map(|kind| (unit.id.as_str(), kind))
        }));
        Self::new(topology, collaborators, retry)
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Replace the collaborator behind a leaf.
    pub fn bind(&mut self, unit_id: &str, collaborator: Arc<dyn Collaborator>) -> Result<()> {
        let idx = self.topology.lookup(unit_id)?;
        let kind = self
            .topology
            .unit(idx)
            .interface
            .ok_or_else(|| Error::NotALeaf(unit_id.to_string()))?;
        self.collaborators.bind(unit_id, kind, collaborator)?;
        info!("Collaborator rebound: unit={} kind={}", unit_id, kind);
        Ok(())
    }

    pub fn dispatch(&self, allocator: &mut Allocator, request: &Request) -> UnitResult {
        self.dispatch_traced(allocator, request).0
    }

    /// Dispatch and also return every state the request passed through.
    pub fn dispatch_traced(
        &self,
        allocator: &mut Allocator,
        request: &Request,
    ) -> (UnitResult, Vec<RequestState>) {
        let mut tracker = StateTracker::new(request.id);
        let root = self.topology.root();

        let route = match self.routes.resolve(request.action) {
            Ok(route) => route,
            Err(e) => {
                warn!("Request {} not routed: {}", request.id, e);
                tracker.finish(false);
                let result = UnitResult::failed(self.topology.id(root), ErrorCode::RoutingError, 0);
                return (result, tracker.into_transitions());
            }
        };
        tracker.enter(RequestState::Routed);

        let payload = request.payload();
        let targets: Vec<&ResolvedTarget> = route.targets.iter().collect();
        let result = self.run_unit(allocator, root, 0, &targets, &payload, &mut tracker);

        debug!(
            "Request {} ({}) finished: success={} tokens={}",
            request.id, request.action, result.success, result.tokens_used
        );
        tracker.finish(result.success);
        (result, tracker.into_transitions())
    }

    /// Run the part of a request that passes through internal unit `idx`,
    /// which sits at `level` on every target's path.
    fn run_unit(
        &self,
        allocator: &mut Allocator,
        idx: UnitIdx,
        level: usize,
        targets: &[&ResolvedTarget],
        payload: &Map<String, Value>,
        tracker: &mut StateTracker,
    ) -> UnitResult {
        let topology = Arc::clone(&self.topology);
        let unit = topology.unit(idx);

        let Some((left, right)) = topology.children(idx) else {
            error!("{} reached as an internal unit but has no children", unit.id);
            return UnitResult::failed(&unit.id, ErrorCode::Internal, 0);
        };

        let mut results: Vec<(UnitIdx, UnitResult)> = Vec::with_capacity(2);
        for child in [left, right] {
            let via_child: Vec<&ResolvedTarget> = targets
                .iter()
                .copied()
                .filter(|t| t.path.get(level + 1) == Some(&child))
                .collect();
            let Some(first) = via_child.first() else {
                continue;
            };

            let result = if topology.unit(child).is_leaf() {
                let op = first.target.operation;
                self.retry.run(&unit.id, |attempt| {
                    if attempt > 0 {
                        debug!("{} retry {} on {}", unit.id, attempt, topology.id(child));
                    }
                    tracker.enter(RequestState::Executing);
                    leaf::execute(allocator, &self.collaborators, child, op, payload)
                })
            } else {
                self.run_unit(allocator, child, level + 1, &via_child, payload, tracker)
            };
            results.push((child, result));
        }

        allocator.record_overhead(idx, unit.overhead);

        match results.len() {
            1 => {
                let (_, mut result) = results.remove(0);
                result.path.insert(0, unit.id.clone());
                result.tokens_used += unit.overhead;
                result
            }
            2 => {
                tracker.enter(RequestState::Aggregating);
                let (right_idx, right) = results.remove(1);
                let (left_idx, left) = results.remove(0);
                self.aggregate(idx, (left_idx, left), (right_idx, right))
            }
            n => {
                error!("{} resolved {} child routes", unit.id, n);
                UnitResult::failed(&unit.id, ErrorCode::Internal, 0)
            }
        }
    }

    fn aggregate(
        &self,
        idx: UnitIdx,
        (left_idx, left): (UnitIdx, UnitResult),
        (right_idx, right): (UnitIdx, UnitResult),
    ) -> UnitResult {
        let unit = self.topology.unit(idx);

        let error = if !left.success {
            left.error.clone()
        } else if !right.success {
            right.error.clone()
        } else {
            None
        };

        let mut data = Map::new();
        data.insert(self.topology.id(left_idx).to_string(), Value::Object(left.data));
        data.insert(self.topology.id(right_idx).to_string(), Value::Object(right.data));

        let mut path = Vec::with_capacity(1 + left.path.len() + right.path.len());
        path.push(unit.id.clone());
        path.extend(left.path);
        path.extend(right.path);

        UnitResult {
            success: left.success && right.success,
            data,
            error,
            tokens_used: left.tokens_used + right.tokens_used + unit.overhead,
            unit_id: unit.id.clone(),
            path,
        }
    }
}

//! Runtime: owns the topology, the allocator, the dispatcher and the
//! dispatch history for one process.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokentree_balancer::{
    Allocator, RebalanceOutcome, RebalanceScope, Topology, UnitAllocation, UtilizationReport,
};
use tokentree_core::{Error, ErrorCode, Manifest, Result, RuntimeConfig};
use tokentree_external::Collaborator;
use tracing::{info, warn};

use crate::action::Action;
use crate::dispatcher::Dispatcher;
use crate::retry::RetryPolicy;
use crate::types::*;
use crate::workflow::{StepOutcome, Workflow, WorkflowResult};

pub struct Runtime {
    config: RuntimeConfig,
    topology: Arc<Topology>,
    allocator: Allocator,
    dispatcher: Dispatcher,
    history: VecDeque<HistoryEntry>,
    dispatches: u64,
    workflows: u64,
}

impl Runtime {
    /// Build from a config, loading its manifest (or the standard tree).
    pub fn from_config(config: RuntimeConfig) -> Result<Self> {
        let manifest = config.manifest()?;
        Self::new(config, &manifest)
    }

    pub fn new(config: RuntimeConfig, manifest: &Manifest) -> Result<Self> {
        let topology = Arc::new(Topology::build(manifest)?);
        let allocator = Allocator::with_budget(Arc::clone(&topology), config.total_budget);
        let dispatcher =
            Dispatcher::with_mocks(Arc::clone(&topology), RetryPolicy::new(config.max_retries));

        info!(
            "Runtime initialized: units={}, depth={}, budget={}",
            topology.len(),
            topology.depth(),
            config.total_budget
        );

        Ok(Self {
            history: VecDeque::with_capacity(config.history_limit.min(1024)),
            config,
            topology,
            allocator,
            dispatcher,
            dispatches: 0,
            workflows: 0,
        })
    }

    /// Standard 15-unit tree with default settings.
    pub fn standard() -> Result<Self> {
        Self::new(RuntimeConfig::default(), &Manifest::standard())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn dispatch(&mut self, action: Action, params: Map<String, Value>) -> UnitResult {
        self.dispatch_within(action, params, None)
    }

    fn dispatch_within(
        &mut self,
        action: Action,
        params: Map<String, Value>,
        workflow_id: Option<&str>,
    ) -> UnitResult {
        let request = Request::new(action, params);
        let (result, transitions) = self.dispatcher.dispatch_traced(&mut self.allocator, &request);
        let final_state = transitions
            .last()
            .copied()
            .unwrap_or(RequestState::Failed);
        self.dispatches += 1;
        let mut entry = HistoryEntry::from_result(request.id, action.as_str(), final_state, &result);
        entry.workflow_id = workflow_id.map(str::to_string);
        self.push_history(entry);
        result
    }

    /// Run every step of `workflow` in order, feeding each step the data of
    /// the ones before it. Stops at the first failing step.
    ///
    /// Each step is recorded in the history under the workflow id, followed
    /// by one summary entry for the whole run.
    pub fn run_workflow(&mut self, workflow: Workflow, input: Map<String, Value>) -> WorkflowResult {
        self.workflows += 1;
        let workflow_id = format!("WF-{:04}", self.workflows);
        info!("Workflow {} ({}) started", workflow_id, workflow);

        let mut outputs = Map::new();
        let mut steps = Vec::with_capacity(workflow.steps().len());
        let mut error = None;
        let mut tokens_used = 0u64;

        for step in workflow.steps() {
            let params = workflow.step_params(step.name, &input, &outputs);
            let result = self.dispatch_within(step.action, params, Some(&workflow_id));
            tokens_used = tokens_used.saturating_add(result.tokens_used);
            steps.push(StepOutcome {
                name: step.name.to_string(),
                action: step.action,
                success: result.success,
                tokens_used: result.tokens_used,
                unit_id: result.unit_id.clone(),
            });
            if !result.success {
                warn!("Workflow {} stopped at step {}", workflow_id, step.name);
                error = result.error;
                break;
            }
            outputs.insert(step.name.to_string(), Value::Object(result.data));
        }

        let success = error.is_none();
        self.push_history(HistoryEntry {
            request_id: uuid::Uuid::new_v4(),
            action: workflow.as_str().to_string(),
            final_state: if success {
                RequestState::Completed
            } else {
                RequestState::Failed
            },
            success,
            tokens_used,
            error: error.as_ref().map(|e| e.code),
            timestamp: Utc::now(),
            workflow_id: Some(workflow_id.clone()),
            steps: steps.clone(),
        });
        info!(
            "Workflow {} ({}) finished: success={} steps={} tokens={}",
            workflow_id,
            workflow,
            success,
            steps.len(),
            tokens_used
        );

        WorkflowResult {
            workflow_id,
            workflow,
            success,
            steps,
            data: outputs,
            error,
            tokens_used,
        }
    }

    /// Run a workflow from untyped input. Unknown names and non-object
    /// input fail validation without running anything.
    pub fn run_workflow_raw(&mut self, name: &str, input: Value) -> Result<WorkflowResult> {
        let workflow = name.parse::<Workflow>()?;
        let input = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::Validation(format!(
                    "input for workflow {} is not an object: {}",
                    workflow, other
                )))
            }
        };
        Ok(self.run_workflow(workflow, input))
    }

    /// Dispatch from untyped input, as received over HTTP or the CLI.
    ///
    /// Unknown actions fail with a routing error; a non-object payload fails
    /// validation. Neither touches the tree.
    pub fn dispatch_raw(&mut self, action: &str, params: Value) -> UnitResult {
        let root_id = self.topology.id(self.topology.root()).to_string();

        let action = match action.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                warn!("Dispatch rejected: {}", e);
                return self.reject(action, &root_id, ErrorCode::RoutingError);
            }
        };
        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                warn!("Dispatch rejected: params for {} is not an object: {}", action, other);
                return self.reject(action.as_str(), &root_id, ErrorCode::ValidationError);
            }
        };
        self.dispatch(action, params)
    }

    fn reject(&mut self, action: &str, root_id: &str, code: ErrorCode) -> UnitResult {
        let result = UnitResult::failed(root_id, code, 0);
        self.dispatches += 1;
        self.push_history(HistoryEntry::from_result(
            uuid::Uuid::new_v4(),
            action,
            RequestState::Failed,
            &result,
        ));
        result
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        if self.config.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.config.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }

    /// Finished requests, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn report(&self) -> UtilizationReport {
        self.allocator.utilization_report()
    }

    pub fn query(&self, unit_id: &str) -> Result<u64> {
        self.allocator.query(unit_id)
    }

    pub fn allocation(&self, unit_id: &str) -> Result<UnitAllocation> {
        self.allocator.unit_allocation(unit_id)
    }

    /// Allocation state of every unit.
    pub fn allocations(&self) -> Vec<UnitAllocation> {
        self.topology
            .units()
            .filter_map(|(_, unit)| self.allocator.unit_allocation(&unit.id).ok())
            .collect()
    }

    pub fn consume(&mut self, unit_id: &str, amount: u64) -> Result<()> {
        self.allocator.consume(unit_id, amount)
    }

    pub fn update_weight(&mut self, unit_id: &str, weight: u64) -> Result<RebalanceOutcome> {
        self.allocator.update_weight(unit_id, weight)
    }

    pub fn clear_weight(&mut self, unit_id: &str) -> Result<RebalanceOutcome> {
        self.allocator.clear_weight(unit_id)
    }

    pub fn rebalance(&mut self, scope: RebalanceScope) -> Result<RebalanceOutcome> {
        match scope {
            RebalanceScope::Full => self.allocator.full_rebalance(),
            RebalanceScope::Subtree(unit_id) => self.allocator.rebalance_subtree(&unit_id),
            RebalanceScope::Path(unit_id) => Err(Error::Validation(format!(
                "path rebalance of {} needs a weight; use update_weight",
                unit_id
            ))),
        }
    }

    /// Re-split the total budget from scratch and zero consumption.
    pub fn reinitialize(&mut self, total_budget: u64) {
        self.config.total_budget = total_budget;
        self.allocator.initialize(total_budget);
    }

    pub fn reset_consumption(&mut self) {
        self.allocator.reset_consumption();
    }

    /// Swap the collaborator behind a leaf.
    pub fn bind_collaborator(&mut self, unit_id: &str, collaborator: Arc<dyn Collaborator>) -> Result<()> {
        self.dispatcher.bind(unit_id, collaborator)
    }

    pub fn topology_view(&self) -> Vec<UnitView> {
        self.topology
            .units()
            .map(|(idx, unit)| UnitView {
                unit_id: unit.id.clone(),
                name: unit.name.clone(),
                kind: unit.kind,
                level: unit.level,
                parent_id: unit.parent.map(|p| self.topology.id(p).to_string()),
                child_ids: self
                    .topology
                    .children(idx)
                    .map(|(l, r)| vec![self.topology.id(l).to_string(), self.topology.id(r).to_string()])
                    .unwrap_or_default(),
                interface: unit.interface,
                overhead: unit.overhead,
                nominal_budget: unit.nominal_budget,
            })
            .collect()
    }

    /// Every action with the leaves and fork unit that serve it here.
    pub fn actions(&self) -> Vec<ActionInfo> {
        Action::ALL
            .iter()
            .map(|&action| {
                let route = self.dispatcher.routes().resolve(action).ok();
                ActionInfo {
                    action,
                    targets: action.targets(),
                    aggregate: action.is_aggregate(),
                    routable: route.is_some(),
                    leaves: route
                        .map(|r| {
                            r.targets
                                .iter()
                                .map(|t| self.topology.id(t.leaf()).to_string())
                                .collect()
                        })
                        .unwrap_or_default(),
                    fork: route
                        .and_then(|r| r.fork())
                        .map(|idx| self.topology.id(idx).to_string()),
                }
            })
            .collect()
    }

    pub fn status(&self) -> RuntimeStatus {
        let total_consumed = self
            .topology
            .leaves()
            .iter()
            .map(|&leaf| self.allocator.consumed(leaf))
            .sum();
        RuntimeStatus {
            units: self.topology.len(),
            leaves: self.topology.leaves().len(),
            depth: self.topology.depth(),
            total_budget: self.allocator.total_budget(),
            total_consumed,
            max_retries: self.dispatcher.retry_policy().max_retries,
            dispatches: self.dispatches,
            workflows: self.workflows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_raw_unknown_action() {
        let mut rt = Runtime::standard().unwrap();
        let result = rt.dispatch_raw("launch_rockets", json!({}));
        assert_eq!(result.error_code(), Some(ErrorCode::RoutingError));
        assert_eq!(result.unit_id, "M000");
        let last = rt.history().last().unwrap();
        assert_eq!(last.final_state, RequestState::Failed);
        assert_eq!(last.action, "launch_rockets");
    }

    #[test]
    fn test_dispatch_raw_non_object_params() {
        let mut rt = Runtime::standard().unwrap();
        let result = rt.dispatch_raw("read_config", json!([1, 2]));
        assert_eq!(result.error_code(), Some(ErrorCode::ValidationError));
    }

    #[test]
    fn test_history_is_bounded() {
        let config = RuntimeConfig {
            history_limit: 3,
            ..RuntimeConfig::default()
        };
        let mut rt = Runtime::new(config, &Manifest::standard()).unwrap();
        for _ in 0..5 {
            rt.dispatch_raw("list_tools", Value::Null);
        }
        assert_eq!(rt.history().count(), 3);
        assert_eq!(rt.status().dispatches, 5);
        assert!(rt.history().all(|h| h.final_state == RequestState::Completed));
    }

    #[test]
    fn test_status_counts_leaf_consumption() {
        let mut rt = Runtime::standard().unwrap();
        rt.dispatch_raw("read_config", json!({"path": "a"}));
        let status = rt.status();
        assert_eq!(status.units, 15);
        assert_eq!(status.leaves, 8);
        assert_eq!(status.total_consumed, 10);
        assert_eq!(status.total_budget, 100_000);
    }

    #[test]
    fn test_path_scope_rejected() {
        let mut rt = Runtime::standard().unwrap();
        let result = rt.rebalance(RebalanceScope::Path("M111".into()));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(rt.rebalance(RebalanceScope::Full).is_ok());
    }

    #[test]
    fn test_topology_view() {
        let rt = Runtime::standard().unwrap();
        let view = rt.topology_view();
        assert_eq!(view.len(), 15);
        let root = view.iter().find(|u| u.unit_id == "M000").unwrap();
        assert_eq!(root.child_ids, vec!["M100", "M200"]);
        assert!(root.parent_id.is_none());
    }

    #[test]
    fn test_topology_view_carries_nominal_budget() {
        let rt = Runtime::standard().unwrap();
        let view = rt.topology_view();
        let root = view.iter().find(|u| u.unit_id == "M000").unwrap();
        assert_eq!(root.nominal_budget, 100_000);
        let leaf = view.iter().find(|u| u.unit_id == "M222").unwrap();
        assert_eq!(leaf.nominal_budget, 10_000);
    }

    #[test]
    fn test_action_catalogue() {
        let rt = Runtime::standard().unwrap();
        let actions = rt.actions();
        assert_eq!(actions.len(), Action::ALL.len());
        assert!(actions.iter().all(|a| a.routable));

        let sync = actions.iter().find(|a| a.action == Action::SyncData).unwrap();
        assert!(sync.aggregate);
        assert_eq!(sync.leaves, vec!["M121", "M122"]);
        assert_eq!(sync.fork.as_deref(), Some("M120"));

        let read = actions.iter().find(|a| a.action == Action::ReadConfig).unwrap();
        assert_eq!(read.leaves, vec!["M111"]);
        assert_eq!(read.fork.as_deref(), Some("M111"));
    }

    #[test]
    fn test_workflow_raw_rejects_bad_input() {
        let mut rt = Runtime::standard().unwrap();
        assert!(matches!(
            rt.run_workflow_raw("nightly_backup", Value::Null),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            rt.run_workflow_raw("tenant_report", json!("acme")),
            Err(Error::Validation(_))
        ));
        assert_eq!(rt.history().count(), 0);
        assert_eq!(rt.status().workflows, 0);
    }

    #[test]
    fn test_allocations_cover_every_unit() {
        let rt = Runtime::standard().unwrap();
        let all = rt.allocations();
        assert_eq!(all.len(), 15);
        assert_eq!(all.iter().find(|a| a.unit_id == "M000").unwrap().allocated, 100_000);
    }
}

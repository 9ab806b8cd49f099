//! Runtime types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokentree_core::{ErrorCode, InterfaceKind, UnitKind};
use uuid::Uuid;

use crate::action::{Action, Target};
use crate::workflow::StepOutcome;

/// A dispatch request. `params` is the payload every target leaf receives.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: Uuid,
    pub action: Action,
    pub params: Map<String, Value>,
}

impl Request {
    pub fn new(action: Action, params: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            params,
        }
    }

    /// Payload with the action's defaults filled in under caller-supplied fields.
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = self.params.clone();
        for (key, value) in self.action.default_params() {
            payload
                .entry(key.to_string())
                .or_insert_with(|| Value::String(value.to_string()));
        }
        payload
    }
}

/// User-visible error: a stable code and a generic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<ErrorCode> for ResultError {
    fn from(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.public_message().to_string(),
        }
    }
}

/// Outcome of running a request through one unit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitResult {
    pub success: bool,
    pub data: Map<String, Value>,
    pub error: Option<ResultError>,
    pub tokens_used: u64,
    /// Unit that produced this result. Forwarding units keep the child's id.
    pub unit_id: String,
    /// Units traversed, root first.
    pub path: Vec<String>,
}

impl UnitResult {
    pub fn ok(unit_id: &str, data: Map<String, Value>, tokens_used: u64) -> Self {
        Self {
            success: true,
            data,
            error: None,
            tokens_used,
            unit_id: unit_id.to_string(),
            path: vec![unit_id.to_string()],
        }
    }

    pub fn failed(unit_id: &str, code: ErrorCode, tokens_used: u64) -> Self {
        Self {
            success: false,
            data: Map::new(),
            error: Some(code.into()),
            tokens_used,
            unit_id: unit_id.to_string(),
            path: vec![unit_id.to_string()],
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Lifecycle of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Routed,
    /// Entered again for every retry.
    Executing,
    Aggregating,
    Completed,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One finished request, kept in the bounded dispatch history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub request_id: Uuid,
    pub action: String,
    pub final_state: RequestState,
    pub success: bool,
    pub tokens_used: u64,
    pub error: Option<ErrorCode>,
    pub timestamp: DateTime<Utc>,
    /// Workflow this dispatch ran under, or the id of the workflow itself on
    /// its summary entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Per-step outcome; only set on a workflow's summary entry.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepOutcome>,
}

impl HistoryEntry {
    pub fn from_result(
        request_id: Uuid,
        action: &str,
        final_state: RequestState,
        result: &UnitResult,
    ) -> Self {
        Self {
            request_id,
            action: action.to_string(),
            final_state,
            success: result.success,
            tokens_used: result.tokens_used,
            error: result.error_code(),
            timestamp: Utc::now(),
            workflow_id: None,
            steps: Vec::new(),
        }
    }
}

/// Static view of one unit for topology listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    pub unit_id: String,
    pub name: String,
    pub kind: UnitKind,
    pub level: usize,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    pub interface: Option<InterfaceKind>,
    pub overhead: u64,
    pub nominal_budget: u64,
}

/// One action as the running topology serves it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInfo {
    pub action: Action,
    pub targets: &'static [Target],
    pub aggregate: bool,
    pub routable: bool,
    /// Leaf serving each target, in target order. Empty when unroutable.
    pub leaves: Vec<String>,
    /// Deepest unit on every target path: the aggregating unit, or the leaf
    /// itself for a single-target action.
    pub fork: Option<String>,
}

/// Runtime status information.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub units: usize,
    pub leaves: usize,
    pub depth: usize,
    pub total_budget: u64,
    pub total_consumed: u64,
    pub max_retries: u32,
    pub dispatches: u64,
    pub workflows: u64,
}

//! Multi-step workflows started at the root.
//!
//! Each step is an ordinary dispatch. Steps run in order, later steps build
//! their payload from what earlier steps returned, and the first failing step
//! ends the run.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokentree_core::Error;

use crate::action::Action;
use crate::types::ResultError;

/// One dispatch inside a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Step {
    pub name: &'static str,
    pub action: Action,
}

const TENANT_REPORT: &[Step] = &[
    Step { name: "config_load", action: Action::ReadConfig },
    Step { name: "tenant_query", action: Action::QueryTenant },
    Step { name: "tool_process", action: Action::CallTool },
    Step { name: "report_generate", action: Action::GeneratePdf },
];

const DATA_SYNC: &[Step] = &[Step { name: "sync", action: Action::SyncData }];

const FULL_PIPELINE: &[Step] = &[
    Step { name: "system_init", action: Action::InitSystem },
    Step { name: "tenant_query", action: Action::QueryTenant },
    Step { name: "payment_analysis", action: Action::CallTool },
    Step { name: "report_generate", action: Action::GeneratePdf },
    Step { name: "report_export", action: Action::ExportPdf },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    /// Config, one tenant's record, tool processing, a summary document.
    TenantReport,
    /// Tabular and relational reads side by side.
    DataSync,
    /// System init, tenant listing, payment totals, report and export.
    FullPipeline,
}

impl Workflow {
    pub const ALL: &'static [Workflow] = &[Self::TenantReport, Self::DataSync, Self::FullPipeline];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TenantReport => "tenant_report",
            Self::DataSync => "data_sync",
            Self::FullPipeline => "full_pipeline",
        }
    }

    pub fn steps(self) -> &'static [Step] {
        match self {
            Self::TenantReport => TENANT_REPORT,
            Self::DataSync => DATA_SYNC,
            Self::FullPipeline => FULL_PIPELINE,
        }
    }

    /// Payload for `step`, built from the workflow input and the data of
    /// the steps that already succeeded (keyed by step name).
    pub fn step_params(
        self,
        step: &str,
        input: &Map<String, Value>,
        outputs: &Map<String, Value>,
    ) -> Map<String, Value> {
        let tenant_id = input.get("tenant_id").and_then(Value::as_u64).unwrap_or(1);
        let rows = || {
            outputs
                .get("tenant_query")
                .and_then(|q| q.get("rows"))
                .cloned()
                .unwrap_or_else(|| json!([]))
        };

        let params = match (self, step) {
            (Self::TenantReport, "config_load") => json!({
                "path": input.get("config_path").and_then(Value::as_str).unwrap_or("tenants/config.json"),
            }),
            (Self::TenantReport, "tenant_query") => json!({ "filter": { "id": tenant_id } }),
            (Self::TenantReport, "tool_process") => {
                let tenant = rows()
                    .get(0)
                    .cloned()
                    .unwrap_or_else(|| json!({ "id": tenant_id }));
                json!({ "tool": "echo", "args": tenant })
            }
            (Self::TenantReport, "report_generate") => json!({
                "report_type": "summary",
                "rows": rows(),
                "tenant": outputs.get("tool_process").and_then(|t| t.get("output")),
            }),
            (Self::DataSync, "sync") => json!({
                "sheet": input.get("sheet").and_then(Value::as_str).unwrap_or("inventory"),
            }),
            (Self::FullPipeline, "system_init") => json!({
                "path": input.get("config_path").and_then(Value::as_str).unwrap_or("pipeline.json"),
                "message": format!("pipeline started for tenant {}", tenant_id),
            }),
            (Self::FullPipeline, "tenant_query") => json!({}),
            (Self::FullPipeline, "payment_analysis") => json!({
                "tool": "sum",
                "args": {
                    "values": input.get("payments").cloned().unwrap_or_else(|| json!([1500])),
                },
            }),
            (Self::FullPipeline, "report_generate") => json!({
                "report_type": "utilization",
                "rows": rows(),
                "analysis": outputs.get("payment_analysis").and_then(|a| a.get("output")),
            }),
            (Self::FullPipeline, "report_export") => {
                let mut params = json!({ "format": "pdf" });
                if let Some(id) = outputs
                    .get("report_generate")
                    .and_then(|r| r.get("documentId"))
                {
                    params["document_id"] = id.clone();
                }
                params
            }
            _ => json!({}),
        };
        match params {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Workflow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown workflow '{}'", s)))
    }
}

/// How one step of a workflow went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub name: String,
    pub action: Action,
    pub success: bool,
    pub tokens_used: u64,
    pub unit_id: String,
}

/// Result of a whole workflow run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    /// `WF-0001`, `WF-0002`, ... in start order.
    pub workflow_id: String,
    pub workflow: Workflow,
    pub success: bool,
    /// Steps that ran, in order. A failed step is always the last one.
    pub steps: Vec<StepOutcome>,
    /// Data of every successful step, keyed by step name.
    pub data: Map<String, Value>,
    pub error: Option<ResultError>,
    pub tokens_used: u64,
}

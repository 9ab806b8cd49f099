//! Workflow routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokentree_runtime::Workflow;

use super::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/workflows", get(list_workflows).post(run_workflow))
}

/// GET /api/workflows: workflow names and their steps.
async fn list_workflows() -> Json<serde_json::Value> {
    let workflows: Vec<_> = Workflow::ALL
        .iter()
        .map(|w| serde_json::json!({ "workflow": w, "steps": w.steps() }))
        .collect();
    Json(serde_json::json!({ "workflows": workflows }))
}

#[derive(Deserialize)]
struct WorkflowBody {
    workflow: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// POST /api/workflows: run one workflow to completion.
///
/// A run that fails partway still answers 200 with the failed step in the
/// result; only an unknown workflow or malformed params is a 400.
async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WorkflowBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state
        .runtime
        .lock()
        .run_workflow_raw(&body.workflow, body.params)
    {
        Ok(result) => (StatusCode::OK, Json(serde_json::json!(result))),
        Err(e) => error_response(&e),
    }
}

//! Status, topology and action catalogue routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_status))
        .route("/topology", get(get_topology))
        .route("/actions", get(list_actions))
}

/// GET /api/status
async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.runtime.lock().status();
    Json(serde_json::json!({
        "status": status,
        "port": state.config.port,
        "historyLimit": state.config.history_limit,
    }))
}

/// GET /api/topology: every unit with its kind, parent and children.
async fn get_topology(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let runtime = state.runtime.lock();
    Json(serde_json::json!({
        "depth": runtime.topology().depth(),
        "units": runtime.topology_view(),
    }))
}

/// GET /api/actions: dispatchable actions, their leaf calls and the units
/// that serve them.
async fn list_actions(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let actions = state.runtime.lock().actions();
    Json(serde_json::json!({ "actions": actions }))
}

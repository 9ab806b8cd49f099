//! Allocation, weight and rebalance routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tokentree_balancer::RebalanceScope;

use super::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/allocations", get(list_allocations))
        .route("/allocations/{unit}", get(get_allocation))
        .route("/weights/{unit}", put(set_weight).delete(clear_weight))
        .route("/rebalance", post(rebalance))
        .route("/consumption/reset", post(reset_consumption))
}

/// GET /api/allocations: leaf utilization plus every unit's allocation.
async fn list_allocations(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let runtime = state.runtime.lock();
    Json(serde_json::json!({
        "totalBudget": runtime.allocator().total_budget(),
        "leaves": runtime.report(),
        "units": runtime.allocations(),
    }))
}

/// GET /api/allocations/{unit}
async fn get_allocation(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.runtime.lock().allocation(&unit) {
        Ok(allocation) => (StatusCode::OK, Json(serde_json::json!(allocation))),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct WeightBody {
    weight: u64,
}

/// PUT /api/weights/{unit}: override a weight and rebalance its path.
async fn set_weight(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
    Json(body): Json<WeightBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut runtime = state.runtime.lock();
    let outcome = match runtime.update_weight(&unit, body.weight) {
        Ok(outcome) => outcome,
        Err(e) => return error_response(&e),
    };
    match runtime.allocation(&unit) {
        Ok(allocation) => (
            StatusCode::OK,
            Json(serde_json::json!({ "outcome": outcome, "allocation": allocation })),
        ),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/weights/{unit}: drop an override and rebalance fully.
async fn clear_weight(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.runtime.lock().clear_weight(&unit) {
        Ok(outcome) => (StatusCode::OK, Json(serde_json::json!(outcome))),
        Err(e) => error_response(&e),
    }
}

/// POST /api/rebalance: `{"scope": "full"}` or `{"scope": "subtree", "unit": id}`.
async fn rebalance(
    State(state): State<Arc<AppState>>,
    Json(scope): Json<RebalanceScope>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.runtime.lock().rebalance(scope) {
        Ok(outcome) => (StatusCode::OK, Json(serde_json::json!(outcome))),
        Err(e) => error_response(&e),
    }
}

/// POST /api/consumption/reset
async fn reset_consumption(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.runtime.lock().reset_consumption();
    Json(serde_json::json!({ "reset": true }))
}

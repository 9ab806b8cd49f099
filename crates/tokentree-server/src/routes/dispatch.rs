//! Dispatch and history routes.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dispatch", post(dispatch))
        .route("/history", get(history))
}

#[derive(Deserialize)]
struct DispatchBody {
    action: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// POST /api/dispatch: run one action through the tree.
///
/// Always 200: failures are reported inside the result.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DispatchBody>,
) -> Json<serde_json::Value> {
    let result = state.runtime.lock().dispatch_raw(&body.action, body.params);
    Json(serde_json::json!(result))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

/// GET /api/history: most recent dispatches, newest last.
async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let runtime = state.runtime.lock();
    let entries: Vec<_> = runtime.history().collect();
    let skip = query
        .limit
        .map_or(0, |limit| entries.len().saturating_sub(limit));
    Json(serde_json::json!({
        "total": entries.len(),
        "entries": &entries[skip..],
    }))
}

//! HTTP route handlers.

pub mod allocations;
pub mod dispatch;
pub mod status;
pub mod workflows;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use tokentree_core::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(dispatch::routes())
        .merge(allocations::routes())
        .merge(status::routes())
        .merge(workflows::routes())
}

/// Map a runtime error to a status and a body carrying only the public code
/// and message. The detail goes to the log.
pub(crate) fn error_response(e: &Error) -> (StatusCode, Json<serde_json::Value>) {
    warn!("Request failed: {}", e);
    let status = match e {
        Error::UnknownUnit(_) | Error::Routing(_) => StatusCode::NOT_FOUND,
        Error::Validation(_) | Error::InvalidWeight { .. } | Error::NotALeaf(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::AllocationBelowConsumption { .. } => StatusCode::CONFLICT,
        Error::BudgetExhausted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let code = e.code();
    (
        status,
        Json(serde_json::json!({
            "error": { "code": code, "message": code.public_message() }
        })),
    )
}

//! Leaf execution: validate, estimate, consume, call out.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokentree_balancer::{Allocator, UnitIdx};
use tokentree_core::{document_pages, Error, ErrorCode, InterfaceKind, Operation, Result};
use tokentree_external::{CollaboratorSet, ExternalCall};
use tracing::{debug, error, warn};

use crate::types::UnitResult;

/// Tokens charged per generated document page.
pub const PAGE_COST: u64 = 10;

/// Tokens a leaf call is charged before it runs.
///
/// Base cost for the interface plus one token per 100 payload bytes. Tool
/// calls add one per 50 bytes of `args`; document generation adds 10 per
/// page, counted the same way the document store counts them.
///
/// Fails validation when the page count is not a positive integer or the
/// total does not fit in a `u64`.
pub fn estimate_cost(kind: InterfaceKind, op: Operation, payload: &Map<String, Value>) -> Result<u64> {
    let payload_bytes = serde_json::to_string(payload).map_or(0, |s| s.len()) as u64;
    let extra = match (kind, op) {
        (InterfaceKind::ToolApi, Operation::Call) => {
            payload.get("args").map_or(0, |a| a.to_string().len()) as u64 / 50
        }
        (InterfaceKind::DocumentStore, Operation::Generate) => {
            let pages = document_pages(payload)
                .ok_or_else(|| Error::Validation("pages must be a positive integer".into()))?;
            pages
                .checked_mul(PAGE_COST)
                .ok_or_else(|| Error::Validation(format!("{} pages overflow the cost estimate", pages)))?
        }
        _ => 0,
    };
    (kind.base_cost() + payload_bytes / 100)
        .checked_add(extra)
        .ok_or_else(|| Error::Validation("cost estimate overflows".into()))
}

/// Run one call against the collaborator bound to `leaf`.
///
/// Budget is drawn before the collaborator is called. A call that fails
/// validation or cannot be paid for never reaches the collaborator.
pub fn execute(
    allocator: &mut Allocator,
    collaborators: &CollaboratorSet,
    leaf: UnitIdx,
    op: Operation,
    payload: &Map<String, Value>,
) -> UnitResult {
    let topology = Arc::clone(allocator.topology());
    let unit = topology.unit(leaf);
    let id = unit.id.as_str();

    let Some(kind) = unit.interface else {
        error!("{} is not a leaf, cannot execute '{}'", id, op);
        return UnitResult::failed(id, ErrorCode::Internal, 0);
    };

    if !kind.supports(op) {
        warn!("{} rejected '{}': not supported by {}", id, op, kind);
        return UnitResult::failed(id, ErrorCode::ValidationError, 0);
    }
    let missing: Vec<&str> = kind
        .required_params(op)
        .iter()
        .copied()
        .filter(|p| !payload.contains_key(*p))
        .collect();
    if !missing.is_empty() {
        warn!("{} rejected '{}': missing {:?}", id, op, missing);
        return UnitResult::failed(id, ErrorCode::ValidationError, 0);
    }

    let cost = match estimate_cost(kind, op, payload) {
        Ok(cost) => cost,
        Err(e) => {
            warn!("{} rejected '{}': {}", id, op, e);
            return UnitResult::failed(id, e.code(), 0);
        }
    };
    if let Err(e) = allocator.consume_at(leaf, cost) {
        warn!("{} '{}' not executed: {}", id, op, e);
        return UnitResult::failed(id, e.code(), 0);
    }

    let Some(collaborator) = collaborators.get(id) else {
        let e = Error::ExternalIo(format!("{} has no collaborator bound", id));
        error!("{}", e);
        return UnitResult::failed(id, e.code(), cost);
    };

    match collaborator.invoke(&ExternalCall::new(op, payload.clone())) {
        Ok(response) => {
            let mut data = response.data;
            data.insert("externalTokens".into(), json!(response.tokens_used));
            debug!("{} '{}' ok: cost={}", id, op, cost);
            UnitResult::ok(id, data, cost)
        }
        Err(failure) => {
            let e = Error::ExternalIo(format!("{} '{}' failed: {}", id, op, failure));
            warn!("{}", e);
            UnitResult::failed(id, e.code(), cost)
        }
    }
}

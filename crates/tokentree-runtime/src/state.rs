//! Per-request state tracking.

use tracing::debug;
use uuid::Uuid;

use crate::types::RequestState;

/// Records the transitions one request goes through.
#[derive(Debug)]
pub struct StateTracker {
    request_id: Uuid,
    transitions: Vec<RequestState>,
}

impl StateTracker {
    pub fn new(request_id: Uuid) -> Self {
        debug!("request {} -> {:?}", request_id, RequestState::Received);
        Self {
            request_id,
            transitions: vec![RequestState::Received],
        }
    }

    pub fn current(&self) -> RequestState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(RequestState::Received)
    }

    pub fn enter(&mut self, next: RequestState) {
        if self.current().is_terminal() {
            return;
        }
        debug!("request {} -> {:?}", self.request_id, next);
        self.transitions.push(next);
    }

    pub fn finish(&mut self, success: bool) {
        self.enter(if success {
            RequestState::Completed
        } else {
            RequestState::Failed
        });
    }

    pub fn into_transitions(self) -> Vec<RequestState> {
        self.transitions
    }
}

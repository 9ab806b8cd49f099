//! Failure-injecting wrapper around another collaborator.

use std::sync::Arc;

use parking_lot::Mutex;
use tokentree_core::InterfaceKind;
use tracing::debug;

use crate::collaborator::{Collaborator, ExternalCall, ExternalFailure, ExternalResult};

/// Fails the first `n` calls (or every call), then delegates to `inner`.
pub struct Flaky {
    inner: Arc<dyn Collaborator>,
    state: Mutex<FlakyState>,
}

struct FlakyState {
    /// `None` means fail forever.
    failures_left: Option<u64>,
    calls: u64,
}

impl Flaky {
    pub fn failing(inner: Arc<dyn Collaborator>, n: u64) -> Self {
        Self {
            inner,
            state: Mutex::new(FlakyState {
                failures_left: Some(n),
                calls: 0,
            }),
        }
    }

    pub fn always(inner: Arc<dyn Collaborator>) -> Self {
        Self {
            inner,
            state: Mutex::new(FlakyState {
                failures_left: None,
                calls: 0,
            }),
        }
    }

    /// Total invocations seen, failed or not.
    pub fn calls(&self) -> u64 {
        self.state.lock().calls
    }
}

impl Collaborator for Flaky {
    fn kind(&self) -> InterfaceKind {
        self.inner.kind()
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        let fail = {
            let mut state = self.state.lock();
            state.calls += 1;
            match state.failures_left.as_mut() {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            }
        };
        if fail {
            debug!("injected failure: kind={} op={}", self.kind(), call.operation);
            return Err(ExternalFailure::new(format!("{} unavailable", self.kind())));
        }
        self.inner.invoke(call)
    }
}

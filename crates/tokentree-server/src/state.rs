//! Shared application state.

use parking_lot::Mutex;
use tokentree_core::RuntimeConfig;
use tokentree_runtime::Runtime;

/// Shared application state accessible from all route handlers.
///
/// Dispatch and rebalancing both mutate the allocator, so the runtime sits
/// behind one mutex. Handlers lock, work, and release without awaiting.
pub struct AppState {
    pub config: RuntimeConfig,
    pub runtime: Mutex<Runtime>,
}

impl AppState {
    pub fn new(config: RuntimeConfig, runtime: Runtime) -> Self {
        Self {
            config,
            runtime: Mutex::new(runtime),
        }
    }
}

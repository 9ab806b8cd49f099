//! TokenTree Runtime: action routing, leaf execution, retries and
//! aggregation over the unit tree.

pub mod action;
pub mod dispatcher;
pub mod leaf;
pub mod retry;
pub mod routing;
pub mod runtime;
pub mod state;
pub mod types;
pub mod workflow;

pub use action::{Action, Target};
pub use dispatcher::Dispatcher;
pub use retry::RetryPolicy;
pub use routing::RoutingTable;
pub use runtime::Runtime;
pub use types::*;
pub use workflow::{StepOutcome, Workflow, WorkflowResult};

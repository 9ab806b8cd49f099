//! TokenTree Balancer: unit topology, weight model, token allocator.
//!
//! The topology is an immutable arena of units. The allocator owns all
//! mutable budget state (allocations, consumption, weight overrides) in
//! tables indexed by the same arena index.

pub mod allocator;
pub mod topology;
pub mod types;
pub mod weights;

pub use allocator::Allocator;
pub use topology::{Topology, Unit, UnitIdx};
pub use types::*;
pub use weights::WeightModel;

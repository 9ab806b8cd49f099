//! External collaborators reached from leaf interfaces.
//!
//! Every leaf talks to exactly one collaborator through the [`Collaborator`]
//! trait. The in-memory mocks stand in for configuration files, logs,
//! spreadsheets, a tenant database, tool and resource APIs, an HTTP
//! endpoint, and a document generator.

pub mod collaborator;
pub mod mock;
pub mod registry;

pub use collaborator::{Collaborator, ExternalCall, ExternalFailure, ExternalResponse, ExternalResult};
pub use mock::{create_mock, Flaky};
pub use registry::CollaboratorSet;

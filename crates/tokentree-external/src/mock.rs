//! In-memory collaborators, one per leaf interface kind.

pub mod append_log;
pub mod config_store;
pub mod document;
pub mod flaky;
pub mod http;
pub mod relational;
pub mod resource_api;
pub mod tabular;
pub mod tool_api;

use std::sync::Arc;

use tokentree_core::InterfaceKind;

use crate::collaborator::Collaborator;

pub use append_log::MockAppendLog;
pub use config_store::MockConfigStore;
pub use document::MockDocumentStore;
pub use flaky::Flaky;
pub use http::MockHttpEndpoint;
pub use relational::MockRelationalStore;
pub use resource_api::MockResourceApi;
pub use tabular::MockTabularStore;
pub use tool_api::MockToolApi;

/// Create the default mock for an interface kind.
pub fn create_mock(kind: InterfaceKind) -> Arc<dyn Collaborator> {
    match kind {
        InterfaceKind::ConfigStore => Arc::new(MockConfigStore::new()),
        InterfaceKind::AppendLog => Arc::new(MockAppendLog::new()),
        InterfaceKind::TabularStore => Arc::new(MockTabularStore::new()),
        InterfaceKind::RelationalStore => Arc::new(MockRelationalStore::new()),
        InterfaceKind::ToolApi => Arc::new(MockToolApi::new()),
        InterfaceKind::ResourceApi => Arc::new(MockResourceApi::new()),
        InterfaceKind::HttpEndpoint => Arc::new(MockHttpEndpoint::new()),
        InterfaceKind::DocumentStore => Arc::new(MockDocumentStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_kind_matches() {
        for kind in InterfaceKind::ALL {
            assert_eq!(create_mock(kind).kind(), kind);
        }
    }
}

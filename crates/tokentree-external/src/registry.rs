//! Leaf-to-collaborator bindings.

use std::collections::HashMap;
use std::sync::Arc;

use tokentree_core::{Error, InterfaceKind, Result};
use tracing::info;

use crate::collaborator::Collaborator;
use crate::mock::create_mock;

/// Collaborators keyed by the id of the leaf that owns them.
#[derive(Default, Clone)]
pub struct CollaboratorSet {
    by_unit: HashMap<String, Arc<dyn Collaborator>>,
}

impl CollaboratorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a fresh mock to every `(leaf id, kind)` pair.
    pub fn mocks<'a>(leaves: impl IntoIterator<Item = (&'a str, InterfaceKind)>) -> Self {
        let by_unit: HashMap<_, _> = leaves
            .into_iter()
            .map(|(id, kind)| (id.to_string(), create_mock(kind)))
            .collect();
        info!("Collaborators bound: {} leaves", by_unit.len());
        Self { by_unit }
    }

    /// Bind `collaborator` to `unit_id`, checking it serves the expected kind.
    pub fn bind(
        &mut self,
        unit_id: &str,
        expected: InterfaceKind,
        collaborator: Arc<dyn Collaborator>,
    ) -> Result<Option<Arc<dyn Collaborator>>> {
        if collaborator.kind() != expected {
            return Err(Error::Validation(format!(
                "collaborator for {} serves {}, expected {}",
                unit_id,
                collaborator.kind(),
                expected
            )));
        }
        Ok(self.by_unit.insert(unit_id.to_string(), collaborator))
    }

    pub fn get(&self, unit_id: &str) -> Option<&Arc<dyn Collaborator>> {
        self.by_unit.get(unit_id)
    }

    pub fn len(&self) -> usize {
        self.by_unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_unit.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Flaky, MockToolApi};

    #[test]
    fn test_mocks_per_leaf() {
        let set = CollaboratorSet::mocks([
            ("M111", InterfaceKind::ConfigStore),
            ("M112", InterfaceKind::AppendLog),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("M112").unwrap().kind(), InterfaceKind::AppendLog);
        assert!(set.get("M999").is_none());
    }

    #[test]
    fn test_bind_replaces() {
        let mut set = CollaboratorSet::mocks([("M212", InterfaceKind::ToolApi)]);
        let flaky = Arc::new(Flaky::always(Arc::new(MockToolApi::new())));
        let previous = set.bind("M212", InterfaceKind::ToolApi, flaky).unwrap();
        assert!(previous.is_some());
    }

    #[test]
    fn test_bind_rejects_kind_mismatch() {
        let mut set = CollaboratorSet::new();
        let result = set.bind("M111", InterfaceKind::ConfigStore, Arc::new(MockToolApi::new()));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(set.is_empty());
    }
}

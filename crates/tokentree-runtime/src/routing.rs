//! Action routing table, resolved once against a topology.

use std::collections::HashMap;

use tokentree_balancer::{Topology, UnitIdx};
use tokentree_core::{Error, InterfaceKind, Result};
use tracing::{info, warn};

use crate::action::{Action, Target};

/// A target bound to the leaf that serves it.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub target: Target,
    /// Root to leaf, inclusive.
    pub path: Vec<UnitIdx>,
}

impl ResolvedTarget {
    pub fn leaf(&self) -> UnitIdx {
        self.path[self.path.len() - 1]
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub targets: Vec<ResolvedTarget>,
}

impl Route {
    /// Deepest unit shared by every target path: where an aggregate splits.
    pub fn fork(&self) -> Option<UnitIdx> {
        let first = self.targets.first()?;
        let mut fork = None;
        for (level, &idx) in first.path.iter().enumerate() {
            if self.targets.iter().all(|t| t.path.get(level) == Some(&idx)) {
                fork = Some(idx);
            } else {
                break;
            }
        }
        fork
    }
}

/// Every action mapped to its resolved leaf paths, or to the interface kind
/// the topology has no leaf for.
pub struct RoutingTable {
    routes: HashMap<Action, std::result::Result<Route, InterfaceKind>>,
}

impl RoutingTable {
    pub fn build(topology: &Topology) -> Self {
        let mut routes = HashMap::with_capacity(Action::ALL.len());
        let mut unroutable = 0;

        for &action in Action::ALL {
            let resolved: std::result::Result<Vec<_>, InterfaceKind> = action
                .targets()
                .iter()
                .map(|&target| {
                    topology
                        .find_leaf(target.kind)
                        .map(|leaf| ResolvedTarget {
                            target,
                            path: topology.path_from_root(leaf),
                        })
                        .ok_or(target.kind)
                })
                .collect();
            if let Err(kind) = &resolved {
                warn!("Action {} has no {} leaf in this topology", action, kind);
                unroutable += 1;
            }
            routes.insert(action, resolved.map(|targets| Route { targets }));
        }

        info!(
            "Routing table built: {} actions, {} unroutable",
            routes.len(),
            unroutable
        );
        Self { routes }
    }

    pub fn resolve(&self, action: Action) -> Result<&Route> {
        match self.routes.get(&action) {
            Some(Ok(route)) => Ok(route),
            Some(Err(kind)) => Err(Error::Routing(format!(
                "no {} leaf for action '{}'",
                kind, action
            ))),
            None => Err(Error::Routing(format!("action '{}' not in table", action))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokentree_core::{Manifest, UnitConfig};

    fn standard() -> Topology {
        Topology::build(&Manifest::standard()).unwrap()
    }

    #[test]
    fn test_single_leaf_route() {
        let topo = standard();
        let table = RoutingTable::build(&topo);
        let route = table.resolve(Action::QueryTenant).unwrap();
        assert_eq!(route.targets.len(), 1);
        let ids: Vec<&str> = route.targets[0].path.iter().map(|&i| topo.id(i)).collect();
        assert_eq!(ids, vec!["M000", "M100", "M120", "M122"]);
        assert_eq!(topo.id(route.targets[0].leaf()), "M122");
    }

    #[test]
    fn test_aggregate_forks() {
        let topo = standard();
        let table = RoutingTable::build(&topo);
        let expected = [
            (Action::InitSystem, "M110"),
            (Action::SyncData, "M120"),
            (Action::InfrastructureStatus, "M100"),
            (Action::PromptedToolCall, "M210"),
            (Action::MultiOutput, "M220"),
        ];
        for (action, fork) in expected {
            let route = table.resolve(action).unwrap();
            assert_eq!(topo.id(route.fork().unwrap()), fork, "{}", action);
        }
    }

    #[test]
    fn test_missing_kind_is_routing_error() {
        // Depth 1: only config and log leaves exist.
        let manifest = Manifest {
            depth: 1,
            units: vec![
                UnitConfig {
                    unit_id: "R".into(),
                    name: "root".into(),
                    parent_id: None,
                    child_ids: vec!["A".into(), "B".into()],
                    token_budget: 0,
                    interface_kind: None,
                    overhead: None,
                },
                UnitConfig {
                    unit_id: "A".into(),
                    name: "config".into(),
                    parent_id: Some("R".into()),
                    child_ids: vec![],
                    token_budget: 0,
                    interface_kind: Some(InterfaceKind::ConfigStore),
                    overhead: None,
                },
                UnitConfig {
                    unit_id: "B".into(),
                    name: "log".into(),
                    parent_id: Some("R".into()),
                    child_ids: vec![],
                    token_budget: 0,
                    interface_kind: Some(InterfaceKind::AppendLog),
                    overhead: None,
                },
            ],
        };
        let topo = Topology::build(&manifest).unwrap();
        let table = RoutingTable::build(&topo);
        assert!(table.resolve(Action::InitSystem).is_ok());
        assert!(matches!(
            table.resolve(Action::CallTool),
            Err(Error::Routing(_))
        ));
    }
}

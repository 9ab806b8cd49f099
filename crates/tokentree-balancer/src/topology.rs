//! Immutable unit hierarchy stored as a flat arena.
//!
//! Units are addressed by [`UnitIdx`]. Children are owned top-down through
//! the arena; the parent index is a lookup aid only. The arena is built once
//! from a [`Manifest`] and never restructured.

use std::collections::{HashMap, VecDeque};

use tokentree_core::{Error, InterfaceKind, Manifest, Result, UnitKind};
use tracing::info;

/// Index of a unit in the topology arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitIdx(usize);

impl UnitIdx {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Immutable part of a unit.
#[derive(Debug, Clone)]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub kind: UnitKind,
    pub level: usize,
    pub parent: Option<UnitIdx>,
    /// `(left, right)`; `None` exactly for leaves.
    pub children: Option<(UnitIdx, UnitIdx)>,
    /// Set exactly for leaves.
    pub interface: Option<InterfaceKind>,
    /// Per-call overhead charged when a request passes through.
    pub overhead: u64,
    /// `tokenBudget` from the manifest. Shown in listings; allocation is
    /// driven by weights only.
    pub nominal_budget: u64,
}

impl Unit {
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Fixed-shape complete binary hierarchy of units.
#[derive(Debug, Clone)]
pub struct Topology {
    units: Vec<Unit>,
    index: HashMap<String, UnitIdx>,
    root: UnitIdx,
    /// Leaves in left-to-right order.
    leaves: Vec<UnitIdx>,
    depth: usize,
}

impl Topology {
    /// Validate a manifest and build the arena.
    pub fn build(manifest: &Manifest) -> Result<Self> {
        let depth = manifest.depth;
        let configs = &manifest.units;

        if configs.is_empty() {
            return Err(malformed("manifest has no units"));
        }
        if depth == 0 {
            return Err(malformed("depth must be at least 1"));
        }

        let mut index = HashMap::with_capacity(configs.len());
        for (i, cfg) in configs.iter().enumerate() {
            if index.insert(cfg.unit_id.clone(), UnitIdx(i)).is_some() {
                return Err(malformed(format!("duplicate unit id {}", cfg.unit_id)));
            }
        }

        let roots: Vec<usize> = configs
            .iter()
            .enumerate()
            .filter(|(_, c)| c.parent_id.is_none())
            .map(|(i, _)| i)
            .collect();
        let root = match roots.as_slice() {
            [r] => UnitIdx(*r),
            [] => return Err(malformed("no root unit (every unit has a parent)")),
            _ => return Err(malformed(format!("{} units have no parent", roots.len()))),
        };

        // Resolve child links and cross-check declared parents.
        let mut children: Vec<Option<(UnitIdx, UnitIdx)>> = Vec::with_capacity(configs.len());
        for cfg in configs {
            let pair = match cfg.child_ids.as_slice() {
                [] => None,
                [l, r] => {
                    let l = lookup_child(&index, &cfg.unit_id, l)?;
                    let r = lookup_child(&index, &cfg.unit_id, r)?;
                    for child in [l, r] {
                        let declared = configs[child.0].parent_id.as_deref();
                        if declared != Some(cfg.unit_id.as_str()) {
                            return Err(malformed(format!(
                                "{} lists {} as a child but its parent is {:?}",
                                cfg.unit_id, configs[child.0].unit_id, declared
                            )));
                        }
                    }
                    Some((l, r))
                }
                other => {
                    return Err(malformed(format!(
                        "{} has {} children, expected 0 or 2",
                        cfg.unit_id,
                        other.len()
                    )))
                }
            };
            children.push(pair);
        }
        for cfg in configs {
            if let Some(parent) = &cfg.parent_id {
                if !index.contains_key(parent) {
                    return Err(malformed(format!(
                        "{} references missing parent {}",
                        cfg.unit_id, parent
                    )));
                }
            }
        }

        // Breadth-first level assignment; a second visit means a shared child.
        let mut levels: Vec<Option<usize>> = vec![None; configs.len()];
        let mut parents: Vec<Option<UnitIdx>> = vec![None; configs.len()];
        let mut queue = VecDeque::from([(root, 0usize)]);
        levels[root.0] = Some(0);
        while let Some((idx, level)) = queue.pop_front() {
            if let Some((l, r)) = children[idx.0] {
                for child in [l, r] {
                    if levels[child.0].is_some() {
                        return Err(malformed(format!(
                            "{} is reachable more than once",
                            configs[child.0].unit_id
                        )));
                    }
                    levels[child.0] = Some(level + 1);
                    parents[child.0] = Some(idx);
                    queue.push_back((child, level + 1));
                }
            }
        }

        let mut units = Vec::with_capacity(configs.len());
        for (i, cfg) in configs.iter().enumerate() {
            let level = levels[i]
                .ok_or_else(|| malformed(format!("{} is not reachable from the root", cfg.unit_id)))?;
            let is_leaf = children[i].is_none();

            if is_leaf && level != depth {
                return Err(malformed(format!(
                    "leaf {} sits at level {}, expected {}",
                    cfg.unit_id, level, depth
                )));
            }
            if !is_leaf && level >= depth {
                return Err(malformed(format!(
                    "{} has children below the configured depth {}",
                    cfg.unit_id, depth
                )));
            }
            match (is_leaf, cfg.interface_kind) {
                (true, None) => {
                    return Err(malformed(format!("leaf {} has no interface kind", cfg.unit_id)))
                }
                (false, Some(kind)) => {
                    return Err(malformed(format!(
                        "internal unit {} declares interface {}",
                        cfg.unit_id, kind
                    )))
                }
                _ => {}
            }

            let kind = UnitKind::for_level(level, depth);
            units.push(Unit {
                id: cfg.unit_id.clone(),
                name: if cfg.name.is_empty() {
                    cfg.unit_id.clone()
                } else {
                    cfg.name.clone()
                },
                kind,
                level,
                parent: parents[i],
                children: children[i],
                interface: cfg.interface_kind,
                overhead: cfg.overhead.unwrap_or_else(|| kind.default_overhead()),
                nominal_budget: cfg.token_budget,
            });
        }

        let mut topology = Self {
            units,
            index,
            root,
            leaves: Vec::new(),
            depth,
        };
        topology.leaves = topology.collect_leaves(root);

        info!(
            "Topology built: {} units, {} leaves, depth {}",
            topology.len(),
            topology.leaves.len(),
            depth
        );

        Ok(topology)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn root(&self) -> UnitIdx {
        self.root
    }

    /// Resolve a unit id to its arena index.
    pub fn lookup(&self, id: &str) -> Result<UnitIdx> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownUnit(id.to_string()))
    }

    pub fn unit(&self, idx: UnitIdx) -> &Unit {
        &self.units[idx.0]
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitIdx, &Unit)> {
        self.units.iter().enumerate().map(|(i, u)| (UnitIdx(i), u))
    }

    pub fn children(&self, idx: UnitIdx) -> Option<(UnitIdx, UnitIdx)> {
        self.units[idx.0].children
    }

    pub fn parent(&self, idx: UnitIdx) -> Option<UnitIdx> {
        self.units[idx.0].parent
    }

    /// Leaves in left-to-right order.
    pub fn leaves(&self) -> &[UnitIdx] {
        &self.leaves
    }

    /// Units from the root down to `idx`, both inclusive.
    pub fn path_from_root(&self, idx: UnitIdx) -> Vec<UnitIdx> {
        let mut path = vec![idx];
        let mut current = idx;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// First leaf, left to right, that talks to `kind`.
    pub fn find_leaf(&self, kind: InterfaceKind) -> Option<UnitIdx> {
        self.leaves
            .iter()
            .copied()
            .find(|&leaf| self.units[leaf.0].interface == Some(kind))
    }

    pub fn id(&self, idx: UnitIdx) -> &str {
        &self.units[idx.0].id
    }

    fn collect_leaves(&self, idx: UnitIdx) -> Vec<UnitIdx> {
        match self.children(idx) {
            None => vec![idx],
            Some((l, r)) => {
                let mut leaves = self.collect_leaves(l);
                leaves.extend(self.collect_leaves(r));
                leaves
            }
        }
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedTopology(msg.into())
}

fn lookup_child(index: &HashMap<String, UnitIdx>, parent: &str, child: &str) -> Result<UnitIdx> {
    index
        .get(child)
        .copied()
        .ok_or_else(|| malformed(format!("{} references missing child {}", parent, child)))
}

//! Static unit manifests, the startup description of the hierarchy.
//!
//! A manifest is read once and handed to the topology builder, which does
//! all structural validation. Nothing here checks shape.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::unit::InterfaceKind;

/// Per-unit configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitConfig {
    pub unit_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Left child first, then right.
    #[serde(default)]
    pub child_ids: Vec<String>,
    /// Nominal budget from the deployment description. The allocator
    /// derives real allocations from weights; this is informational.
    #[serde(default)]
    pub token_budget: u64,
    #[serde(default, rename = "externalInterfaceKind")]
    pub interface_kind: Option<InterfaceKind>,
    /// Per-call overhead; falls back to the kind's default.
    #[serde(default)]
    pub overhead: Option<u64>,
}

/// Complete startup description of the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Level of the leaves (root is level 0).
    pub depth: usize,
    pub units: Vec<UnitConfig>,
}

impl Manifest {
    /// Load a manifest from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&data)?;
        info!(
            "Loaded manifest from {}: {} units, depth {}",
            path.display(),
            manifest.units.len(),
            manifest.depth
        );
        Ok(manifest)
    }

    /// The 15-unit deployment: infrastructure on the left, application on the right.
    pub fn standard() -> Self {
        use InterfaceKind::*;

        let units = vec![
            internal("M000", "Root Orchestrator", None, ["M100", "M200"], 100_000),
            internal("M100", "Infrastructure Manager", Some("M000"), ["M110", "M120"], 35_000),
            internal("M200", "Application Manager", Some("M000"), ["M210", "M220"], 55_000),
            internal("M110", "Config Handler", Some("M100"), ["M111", "M112"], 10_000),
            internal("M120", "Data Handler", Some("M100"), ["M121", "M122"], 20_000),
            internal("M210", "Tool Protocol Handler", Some("M200"), ["M211", "M212"], 25_000),
            internal("M220", "Output Handler", Some("M200"), ["M221", "M222"], 25_000),
            leaf("M111", "Config Store", "M110", ConfigStore, 5_000),
            leaf("M112", "Log Writer", "M110", AppendLog, 3_000),
            leaf("M121", "Sheet Store", "M120", TabularStore, 8_000),
            leaf("M122", "Relational Store", "M120", RelationalStore, 10_000),
            leaf("M211", "Tool API", "M210", ToolApi, 15_000),
            leaf("M212", "Resource API", "M210", ResourceApi, 8_000),
            leaf("M221", "HTTP Endpoint", "M220", HttpEndpoint, 12_000),
            leaf("M222", "Document Store", "M220", DocumentStore, 10_000),
        ];

        Self { depth: 3, units }
    }

    /// A synthetic complete tree with `2^depth` leaves named `L1..`.
    ///
    /// Internal units are named `R` (root) and `N{level}-{position}`; leaf
    /// interface kinds cycle through every kind left to right.
    pub fn complete(depth: usize) -> Self {
        let mut units = Vec::with_capacity((1usize << (depth + 1)) - 1);

        for level in 0..=depth {
            let width = 1usize << level;
            for pos in 0..width {
                let id = synthetic_id(level, pos, depth);
                let parent_id = (level > 0).then(|| synthetic_id(level - 1, pos / 2, depth));
                let child_ids = if level < depth {
                    vec![
                        synthetic_id(level + 1, pos * 2, depth),
                        synthetic_id(level + 1, pos * 2 + 1, depth),
                    ]
                } else {
                    Vec::new()
                };
                let interface_kind =
                    (level == depth).then(|| InterfaceKind::ALL[pos % InterfaceKind::ALL.len()]);

                units.push(UnitConfig {
                    name: id.clone(),
                    unit_id: id,
                    parent_id,
                    child_ids,
                    token_budget: 0,
                    interface_kind,
                    overhead: None,
                });
            }
        }

        Self { depth, units }
    }
}

fn synthetic_id(level: usize, pos: usize, depth: usize) -> String {
    if level == 0 {
        "R".to_string()
    } else if level == depth {
        format!("L{}", pos + 1)
    } else {
        format!("N{}-{}", level, pos)
    }
}

fn internal(
    id: &str,
    name: &str,
    parent: Option<&str>,
    children: [&str; 2],
    budget: u64,
) -> UnitConfig {
    UnitConfig {
        unit_id: id.into(),
        name: name.into(),
        parent_id: parent.map(Into::into),
        child_ids: children.iter().map(|c| c.to_string()).collect(),
        token_budget: budget,
        interface_kind: None,
        overhead: None,
    }
}

fn leaf(id: &str, name: &str, parent: &str, kind: InterfaceKind, budget: u64) -> UnitConfig {
    UnitConfig {
        unit_id: id.into(),
        name: name.into(),
        parent_id: Some(parent.into()),
        child_ids: Vec::new(),
        token_budget: budget,
        interface_kind: Some(kind),
        overhead: None,
    }
}

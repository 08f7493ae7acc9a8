use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strata_spec::{ArchSpec, DepTypes, SpecSnapshot, VariantValue, Version};

use super::cost::CostVector;

/// Stable identifier of a node within one assignment.
pub type NodeId = u32;

/// One resolved node: every attribute concrete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFact {
    pub id: NodeId,
    pub name: String,
    pub namespace: String,
    pub version: Version,
    pub variants: BTreeMap<String, VariantValue>,
    pub arch: ArchSpec,
    /// Install prefix when the node resolved to a configured external.
    pub external: Option<PathBuf>,
    /// The node was substituted from the reuse pool rather than planned as
    /// a fresh build.
    pub reused: bool,
    /// The reused candidate's subgraph hash, when `reused`.
    pub reuse_hash: Option<String>,
    /// The chosen version is marked deprecated in the package facts.
    pub deprecated: bool,
}

impl NodeFact {
    pub fn snapshot(&self) -> SpecSnapshot {
        SpecSnapshot {
            name: self.name.clone(),
            version: Some(self.version.clone()),
            variants: self.variants.clone(),
            arch: self.arch.clone(),
        }
    }
}

/// One resolved dependency edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFact {
    pub parent: NodeId,
    pub child: NodeId,
    pub deptypes: DepTypes,
    /// Virtual capabilities this edge satisfies for the parent.
    pub virtuals: BTreeSet<String>,
    /// The edge was explicitly pinned by the user request.
    pub pinned: bool,
}

/// A successful solve: a flat, self-contained fact set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Assignment {
    pub nodes: Vec<NodeFact>,
    pub edges: Vec<EdgeFact>,
    /// Node ids of the solved roots, in request order.
    pub roots: Vec<NodeId>,
}

impl Assignment {
    pub fn node(&self, id: NodeId) -> Option<&NodeFact> {
        self.nodes.get(id as usize)
    }

    pub fn edges_from(&self, parent: NodeId) -> impl Iterator<Item = &EdgeFact> {
        self.edges.iter().filter(move |e| e.parent == parent)
    }

    pub fn find_node(&self, name: &str) -> Option<&NodeFact> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Canonical serialized form; bit-identical across repeated solves of
    /// the same problem.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Statistics reported with every solve and stored alongside cached results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveStats {
    pub cost: CostVector,
    /// Candidate attempts consumed by the search.
    pub attempts: u64,
    pub reused_nodes: usize,
    pub fresh_nodes: usize,
    /// The result was served from the concretization cache.
    pub cache_hit: bool,
}

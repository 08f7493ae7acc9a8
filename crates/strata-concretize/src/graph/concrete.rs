use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_spec::{ArchSpec, DepTypes, SpecSnapshot, VariantValue, Version};

use crate::solve::NodeId;

/// One fully concretized package: every attribute fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteSpec {
    pub id: NodeId,
    pub name: String,
    pub namespace: String,
    pub version: Version,
    pub variants: BTreeMap<String, VariantValue>,
    pub arch: ArchSpec,
    /// Install prefix for externals; `None` means the node is planned for
    /// building.
    pub external: Option<PathBuf>,
    pub reused: bool,
    pub deprecated: bool,
}

impl ConcreteSpec {
    pub fn snapshot(&self) -> SpecSnapshot {
        SpecSnapshot {
            name: self.name.clone(),
            version: Some(self.version.clone()),
            variants: self.variants.clone(),
            arch: self.arch.clone(),
        }
    }
}

impl fmt::Display for ConcreteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)?;
        for (name, value) in &self.variants {
            match value {
                VariantValue::Bool(true) => write!(f, "+{name}")?,
                VariantValue::Bool(false) => write!(f, "~{name}")?,
                other => write!(f, " {name}={other}")?,
            }
        }
        if !self.arch.is_empty() {
            write!(f, " arch={}", self.arch)?;
        }
        Ok(())
    }
}

/// One edge in the concrete graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub parent: NodeId,
    pub child: NodeId,
    pub deptypes: DepTypes,
    pub virtuals: BTreeSet<String>,
}

/// An arena-backed concrete dependency graph.
///
/// Nodes live in an arena indexed by `NodeId`; edges live in a separate
/// table so shared nodes carry no duplicated state. Link and run edges are
/// guaranteed acyclic by construction; build-only edges may close cycles.
#[derive(Debug, Default)]
pub struct SpecGraph {
    nodes: Vec<ConcreteSpec>,
    edges: Vec<GraphEdge>,
    roots: Vec<NodeId>,
    hashes: OnceLock<Vec<String>>,
}

impl SpecGraph {
    pub fn new(nodes: Vec<ConcreteSpec>, edges: Vec<GraphEdge>, roots: Vec<NodeId>) -> Self {
        Self {
            nodes,
            edges,
            roots,
            hashes: OnceLock::new(),
        }
    }

    pub fn nodes(&self) -> &[ConcreteSpec] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&ConcreteSpec> {
        self.nodes.get(id as usize)
    }

    pub fn roots(&self) -> impl Iterator<Item = &ConcreteSpec> {
        self.roots.iter().filter_map(|id| self.node(*id))
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn find(&self, name: &str) -> Option<&ConcreteSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn dependencies_of(&self, id: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.parent == id)
    }

    pub fn dependents_of(&self, id: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.child == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The content hash identifying a node's binding subgraph.
    ///
    /// Covers the node's own attributes plus the hashes of its link and run
    /// children; build-only edges are excluded so cyclic build edges cannot
    /// recurse. Computed once for the whole graph and cached.
    pub fn dag_hash(&self, id: NodeId) -> Option<&str> {
        let hashes = self.hashes.get_or_init(|| self.compute_hashes());
        hashes.get(id as usize).map(String::as_str)
    }

    fn compute_hashes(&self) -> Vec<String> {
        let mut memo: Vec<Option<String>> = vec![None; self.nodes.len()];
        for id in 0..self.nodes.len() {
            self.hash_node(id, &mut memo);
        }
        memo.into_iter().map(Option::unwrap_or_default).collect()
    }

    fn hash_node(&self, id: usize, memo: &mut Vec<Option<String>>) -> String {
        if let Some(hash) = &memo[id] {
            return hash.clone();
        }

        let mut children: Vec<(String, String)> = self
            .dependencies_of(id as NodeId)
            .filter(|e| e.deptypes.is_binding())
            .map(|e| {
                (
                    self.hash_node(e.child as usize, memo),
                    e.deptypes.to_string(),
                )
            })
            .collect();
        children.sort();

        let node = &self.nodes[id];
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(node).unwrap_or_default());
        for (child_hash, deptypes) in children {
            hasher.update(child_hash.as_bytes());
            hasher.update(deptypes.as_bytes());
        }
        let hash = hex::encode(hasher.finalize());
        memo[id] = Some(hash.clone());
        hash
    }

    /// Node ids in a deterministic build order: every binding dependency
    /// precedes its dependents. Build-only back edges are ignored, matching
    /// the acyclicity guarantee.
    pub fn build_order(&self) -> Vec<NodeId> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        for edge in &self.edges {
            if edge.deptypes.is_binding() {
                indegree[edge.parent as usize] += 1;
            }
        }

        let mut order = Vec::with_capacity(n);
        let mut ready: Vec<usize> = (0..n).filter(|i| indegree[*i] == 0).collect();
        while let Some(at) = ready.iter().enumerate().min_by_key(|(_, i)| **i).map(|(p, _)| p) {
            let id = ready.swap_remove(at);
            order.push(id as NodeId);
            for edge in self.dependents_of(id as NodeId) {
                if !edge.deptypes.is_binding() {
                    continue;
                }
                let parent = edge.parent as usize;
                indegree[parent] -= 1;
                if indegree[parent] == 0 {
                    ready.push(parent);
                }
            }
        }
        order
    }
}

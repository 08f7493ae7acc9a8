use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use strata_spec::AbstractSpec;

use crate::config::ConcretizerConfig;
use crate::facts::PackageFacts;
use crate::reuse::ReusableSpec;

/// An edge combination the solver must not reproduce with binding (link or
/// run) dependency types. Produced by the cycle-breaking fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForbiddenEdgeSet {
    /// (parent, child) package name pairs forming the cycle.
    pub edges: Vec<(String, String)>,
}

/// A compiled, normalized constraint problem.
///
/// Everything the solver consults lives here: the root requests, the pruned
/// fact tables for every reachable package, the virtual provider map, the
/// reuse pool, and the configuration. The content key hashes all of it so a
/// cached result can never be served for a different encoding.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    pub roots: Vec<AbstractSpec>,
    /// Reachable packages in deterministic closure order, dead conditional
    /// definitions already eliminated.
    pub packages: IndexMap<String, Arc<PackageFacts>>,
    /// Virtual name -> provider package names, sorted.
    pub virtual_providers: IndexMap<String, Vec<String>>,
    /// Reuse candidates in deterministic merge order.
    pub reusable: Vec<ReusableSpec>,
    pub config: ConcretizerConfig,
    /// Cyclic edge combinations forbidden by the fallback pass.
    pub forbidden: Vec<ForbiddenEdgeSet>,
}

impl Problem {
    pub fn facts(&self, name: &str) -> Option<&Arc<PackageFacts>> {
        self.packages.get(name)
    }

    pub fn is_virtual(&self, name: &str) -> bool {
        self.virtual_providers.contains_key(name)
    }

    pub fn providers_of(&self, virtual_name: &str) -> &[String] {
        self.virtual_providers
            .get(virtual_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reuse candidates for one package, in pool order.
    pub fn reusable_for(&self, name: &str) -> Vec<&ReusableSpec> {
        self.reusable.iter().filter(|r| r.name() == name).collect()
    }

    /// Restrict the problem to a subset of its roots, keeping the shared
    /// encoding. Used by round-based solving.
    pub fn with_roots(&self, roots: Vec<AbstractSpec>) -> Problem {
        Problem {
            roots,
            ..self.clone()
        }
    }

    pub fn with_forbidden(&self, forbidden: Vec<ForbiddenEdgeSet>) -> Problem {
        Problem {
            forbidden,
            ..self.clone()
        }
    }

    /// Extend the reuse pool with solved nodes from a previous round, ahead
    /// of existing candidates.
    pub fn with_extra_reusable(&self, extra: Vec<ReusableSpec>) -> Problem {
        let mut problem = self.clone();
        let mut pool = extra;
        pool.extend(problem.reusable);
        problem.reusable = pool;
        problem
    }

    /// Deterministic content hash over the full encoding, including every
    /// contributing package fact table. Changing any package definition,
    /// config knob, or pool entry changes the key.
    pub fn content_key(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        hex::encode(hasher.finalize())
    }
}

use serde::{Deserialize, Serialize};

use crate::compile::Problem;
use crate::facts::VersionDecl;

use super::assignment::Assignment;

/// The lexicographic soft-cost vector, in descending priority order:
///
/// 1. nodes with unsatisfied requests (zero on any success)
/// 2. deprecated versions used
/// 3. fresh (non-reused, non-external) installations
/// 4. provider mismatches across a node's immediate neighborhood
/// 5. non-default variant values chosen
/// 6. configured preference rank of chosen versions and providers
/// 7. reserved stable tie-break component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct CostVector(pub [u64; 7]);

impl CostVector {
    /// Compute the cost of a complete assignment against its problem.
    pub fn of(assignment: &Assignment, problem: &Problem) -> CostVector {
        let deprecated = assignment.nodes.iter().filter(|n| n.deprecated).count() as u64;

        let fresh = assignment
            .nodes
            .iter()
            .filter(|n| !n.reused && n.external.is_none())
            .count() as u64;

        let mismatches = neighborhood_mismatches(assignment);

        let non_default = non_default_variants(assignment, problem);

        let preference_rank = preference_rank(assignment, problem);

        CostVector([
            0,
            deprecated,
            fresh,
            mismatches,
            non_default,
            preference_rank,
            0,
        ])
    }
}

/// Count edges where a node and one of its dependencies satisfied the same
/// virtual through different providers. Toolchain virtuals resolved
/// inconsistently across a neighborhood are what this penalizes.
fn neighborhood_mismatches(assignment: &Assignment) -> u64 {
    let mut mismatches = 0;
    for edge in &assignment.edges {
        for inner in assignment.edges_from(edge.child) {
            for virtual_name in &inner.virtuals {
                // The parent's own provider for the same virtual, if any.
                let parent_choice = assignment
                    .edges_from(edge.parent)
                    .find(|e| e.virtuals.contains(virtual_name))
                    .map(|e| e.child);
                if let Some(parent_provider) = parent_choice {
                    if parent_provider != inner.child {
                        mismatches += 1;
                    }
                }
            }
        }
    }
    mismatches
}

fn non_default_variants(assignment: &Assignment, problem: &Problem) -> u64 {
    let mut count = 0;
    for node in &assignment.nodes {
        let facts = match problem.facts(&node.name) {
            Some(f) => f,
            None => continue,
        };
        let snap = node.snapshot();
        for (name, def) in facts.applicable_variants(&snap) {
            if let Some(value) = node.variants.get(name) {
                if value != &def.default {
                    count += 1;
                }
            }
        }
    }
    count
}

fn preference_rank(assignment: &Assignment, problem: &Problem) -> u64 {
    let mut rank = 0u64;

    for node in &assignment.nodes {
        // Version rank within the package's effective candidate order,
        // configured preferences applied the same way the solver orders
        // its branches.
        if let Some(facts) = problem.facts(&node.name) {
            let mut order = facts.version_candidates();
            if let Some(settings) = problem.config.package(&node.name) {
                if !settings.prefer.is_empty() {
                    let preference = |decl: &VersionDecl| -> usize {
                        settings
                            .prefer
                            .iter()
                            .position(|p| {
                                p.version_range()
                                    .map(|r| r.satisfies(&decl.version))
                                    .unwrap_or(false)
                            })
                            .unwrap_or(settings.prefer.len())
                    };
                    order.sort_by_key(|decl| preference(*decl));
                }
            }
            if let Some(at) = order.iter().position(|v| v.version == node.version) {
                rank += at as u64;
            }
        }
    }

    // Provider rank from configuration for every virtual edge.
    for edge in &assignment.edges {
        if let Some(child) = assignment.node(edge.child) {
            for virtual_name in &edge.virtuals {
                let provider_rank = problem.config.provider_rank(virtual_name, &child.name);
                if provider_rank != usize::MAX {
                    rank += provider_rank as u64;
                }
            }
        }
    }

    rank
}

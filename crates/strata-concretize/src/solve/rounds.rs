use log::{debug, warn};
use sha2::{Digest, Sha256};
use strata_spec::AbstractSpec;

use crate::compile::Problem;
use crate::config::SourceKind;
use crate::error::{ConcretizeError, Result};
use crate::reuse::ReusableSpec;

use super::assignment::{Assignment, SolveStats};
use super::solver::Solver;

/// One root solved during round-based concretization.
#[derive(Debug, Clone)]
pub struct SolvedRoot {
    pub root: AbstractSpec,
    pub assignment: Assignment,
    pub stats: SolveStats,
}

/// The result of a complete round-based solve.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// Solved roots in completion order.
    pub solved: Vec<SolvedRoot>,
    pub rounds: usize,
}

/// Solve each root as its own subproblem, in rounds.
///
/// Nodes from every solved root are injected into later subproblems as
/// preferred reuse candidates, so independently solved graphs still
/// coalesce on shared dependencies where constraints allow. Roots that
/// fail stay pending for the next round; a round that solves nothing
/// ends the loop with an `OutputDoesNotSatisfyInput` error naming the
/// survivors.
pub fn solve_in_rounds(problem: &Problem, budget: u64) -> Result<RoundOutcome> {
    let mut pending: Vec<AbstractSpec> = problem.roots.clone();
    let mut solved_pool: Vec<ReusableSpec> = Vec::new();
    let mut solved = Vec::new();
    let mut rounds = 0;

    while !pending.is_empty() {
        rounds += 1;
        let mut next = Vec::new();
        let mut progressed = false;

        for root in pending {
            let sub = problem
                .with_roots(vec![root.clone()])
                .with_extra_reusable(solved_pool.clone());
            match Solver::new(&sub).with_budget(budget).solve() {
                Ok((assignment, stats)) => {
                    absorb_solved_nodes(&mut solved_pool, &assignment);
                    debug!("round {rounds}: solved `{root}`");
                    solved.push(SolvedRoot {
                        root,
                        assignment,
                        stats,
                    });
                    progressed = true;
                }
                Err(ConcretizeError::Unsatisfiable {
                    spec,
                    message,
                    conflicts,
                }) => {
                    warn!("round {rounds}: `{spec}` unsatisfied: {message}");
                    next.push((
                        root,
                        ConcretizeError::Unsatisfiable {
                            spec,
                            message,
                            conflicts,
                        },
                    ));
                }
                Err(err) => return Err(err),
            }
        }

        if !progressed {
            // Nothing changed between rounds, so retrying cannot help. The
            // per-root causes ride along so callers can tell stagnation
            // apart from a plain unsatisfiable solve.
            return Err(ConcretizeError::OutputDoesNotSatisfyInput {
                unsolved: next
                    .iter()
                    .map(|(root, err)| format!("{root}: {err}"))
                    .collect(),
            });
        }
        pending = next.into_iter().map(|(root, _)| root).collect();
    }

    Ok(RoundOutcome { solved, rounds })
}

/// Turn every node of a solved assignment into a reuse candidate for later
/// rounds, deduplicated by hash.
fn absorb_solved_nodes(pool: &mut Vec<ReusableSpec>, assignment: &Assignment) {
    for node in &assignment.nodes {
        let snapshot = node.snapshot();
        let hash = node
            .reuse_hash
            .clone()
            .unwrap_or_else(|| snapshot_hash(&snapshot));
        if pool.iter().any(|r| r.hash == hash) {
            continue;
        }
        pool.push(ReusableSpec {
            snapshot,
            hash,
            provenance: SourceKind::Local,
            external: node.external.is_some(),
            prefix: node.external.clone(),
            modules: Vec::new(),
            libc: None,
        });
    }
}

fn snapshot_hash(snapshot: &strata_spec::SpecSnapshot) -> String {
    let encoded = serde_json::to_vec(snapshot).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    hex::encode(hasher.finalize())
}

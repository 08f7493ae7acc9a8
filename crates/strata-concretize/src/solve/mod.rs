//! The solver core: searches the space of valid (version, variant,
//! provider) assignments for every required node and edge.
//!
//! The search enumerates complete assignments branch-and-bound style,
//! keeping the one with the smallest lexicographic cost vector and pruning
//! partial states against the incumbent. Branch ordering at every choice
//! point mirrors the cost vector, so the first assignment found is already
//! a strong bound and wins cost ties. Results are flat fact sets consumed
//! by the graph reconstructor.

mod assignment;
mod cache;
mod cost;
mod rounds;
mod solver;

#[cfg(test)]
mod tests;

pub use assignment::{Assignment, EdgeFact, NodeFact, NodeId, SolveStats};
pub use cache::SolveCache;
pub use cost::CostVector;
pub use rounds::{solve_in_rounds, RoundOutcome, SolvedRoot};
pub use solver::Solver;

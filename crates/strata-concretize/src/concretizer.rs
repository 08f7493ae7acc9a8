use std::sync::Arc;

use log::{debug, info, warn};
use strata_spec::AbstractSpec;

use crate::compile::{Compiler, Problem};
use crate::config::{ConcretizerConfig, Unify};
use crate::error::{ConcretizeError, Result};
use crate::facts::FactProvider;
use crate::graph::{binding_cycles, reconstruct, SpecGraph};
use crate::reuse::{ReuseSelector, ReuseSource};
use crate::solve::{solve_in_rounds, Assignment, SolveCache, SolveStats, Solver};

/// How many times a solve is retried with newly forbidden cyclic edge
/// combinations before giving up.
const CYCLE_RETRY_LIMIT: usize = 3;

const DEFAULT_BUDGET: u64 = 50_000;

/// The concretization engine.
///
/// Owns the fact provider, the configuration, the reuse sources, and a
/// shared solve cache. `concretize` is the whole pipeline: gather reuse,
/// compile the problem, solve (with the cycle-breaking fallback), and
/// reconstruct concrete graphs.
pub struct Concretizer {
    provider: FactProvider,
    config: ConcretizerConfig,
    selector: ReuseSelector,
    cache: Arc<SolveCache>,
    budget: u64,
}

impl Concretizer {
    pub fn new(provider: FactProvider, config: ConcretizerConfig) -> Self {
        Self {
            provider,
            config,
            selector: ReuseSelector::new(Vec::new()),
            cache: Arc::new(SolveCache::new()),
            budget: DEFAULT_BUDGET,
        }
    }

    pub fn with_reuse_sources(mut self, sources: Vec<Box<dyn ReuseSource>>) -> Self {
        self.selector = ReuseSelector::new(sources);
        self
    }

    /// Share a solve cache across engine instances.
    pub fn with_cache(mut self, cache: Arc<SolveCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    pub fn config(&self) -> &ConcretizerConfig {
        &self.config
    }

    /// Concretize one root request into a concrete graph.
    pub fn concretize_one(&self, root: AbstractSpec) -> Result<SpecGraph> {
        let mut graphs = self.concretize(&[root])?;
        graphs.pop().ok_or_else(|| {
            ConcretizeError::OutputDoesNotSatisfyInput {
                unsolved: Vec::new(),
            }
        })
    }

    /// Concretize a set of root requests, honoring the configured
    /// unification mode.
    pub fn concretize(&self, roots: &[AbstractSpec]) -> Result<Vec<SpecGraph>> {
        Ok(self
            .concretize_with_stats(roots)?
            .into_iter()
            .map(|(graph, _)| graph)
            .collect())
    }

    /// As `concretize`, reporting the solve statistics alongside every
    /// graph.
    pub fn concretize_with_stats(
        &self,
        roots: &[AbstractSpec],
    ) -> Result<Vec<(SpecGraph, SolveStats)>> {
        if roots.is_empty() {
            return Ok(Vec::new());
        }

        let reusable = match self.config.reuse.policy() {
            Some(policy) => self.selector.reusable_specs(roots, &policy, &self.config),
            None => Vec::new(),
        };
        let problem = Compiler::new(&self.provider, &self.config).compile(roots, reusable)?;

        match self.config.unify {
            // One solve over all roots; every shared package unifies to a
            // single node.
            Unify::True => Ok(vec![self.solve_with_fallback(&problem)?]),

            // Every root gets its own independent solve and graph.
            Unify::False => {
                let mut out = Vec::with_capacity(roots.len());
                for root in roots {
                    let sub = problem.with_roots(vec![root.clone()]);
                    out.push(self.solve_with_fallback(&sub)?);
                }
                Ok(out)
            }

            // Try the unified solve; if the roots cannot coexist, fall back
            // to per-root rounds that still share nodes where they can.
            Unify::WhenPossible => match self.solve_with_fallback(&problem) {
                Ok(solved) => Ok(vec![solved]),
                Err(ConcretizeError::Unsatisfiable { spec, message, .. }) => {
                    debug!("unified solve of `{spec}` failed ({message}); splitting per root");
                    self.concretize_in_rounds(&problem)
                }
                Err(err) => Err(err),
            },
        }
    }

    /// Solve each root of a compiled problem separately, injecting earlier
    /// solutions as preferred reuse so graphs still coalesce where
    /// constraints allow.
    pub fn concretize_in_rounds(&self, problem: &Problem) -> Result<Vec<(SpecGraph, SolveStats)>> {
        let outcome = solve_in_rounds(problem, self.budget)?;
        info!(
            "solved {} root(s) in {} round(s)",
            outcome.solved.len(),
            outcome.rounds
        );

        let mut out = Vec::with_capacity(outcome.solved.len());
        for solved in outcome.solved {
            let sub = problem.with_roots(vec![solved.root.clone()]);
            let graph = reconstruct(&solved.assignment, &sub)?;
            let cycles = binding_cycles(&graph);
            if cycles.is_empty() {
                out.push((graph, solved.stats));
            } else {
                let retry = sub.with_forbidden(cycles);
                out.push(self.solve_with_fallback(&retry)?);
            }
        }
        Ok(out)
    }

    /// One cache-aware solve plus the cycle-breaking fallback loop: when
    /// the minimal solution closes a link/run cycle, the cyclic edge
    /// combination is forbidden and the solve repeated, a bounded number
    /// of times.
    fn solve_with_fallback(&self, problem: &Problem) -> Result<(SpecGraph, SolveStats)> {
        let mut current = problem.clone();
        let mut forbidden = current.forbidden.clone();

        for attempt in 0..=CYCLE_RETRY_LIMIT {
            let (assignment, stats) = self.solve_cached(&current)?;
            let graph = reconstruct(&assignment, &current)?;
            let cycles = binding_cycles(&graph);
            if cycles.is_empty() {
                return Ok((graph, stats));
            }
            if attempt == CYCLE_RETRY_LIMIT {
                break;
            }
            warn!(
                "solution closes {} binding cycle(s); re-solving with them forbidden",
                cycles.len()
            );
            forbidden.extend(cycles);
            current = current.with_forbidden(forbidden.clone());
        }

        let conflicts: Vec<String> = forbidden
            .iter()
            .flat_map(|set| set.edges.iter())
            .map(|(a, b)| format!("{a} -> {b}"))
            .collect();
        Err(ConcretizeError::unsatisfiable(
            current
                .roots
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "every candidate solution closes a link or run cycle".to_string(),
        )
        .with_conflicts(conflicts))
    }

    fn solve_cached(&self, problem: &Problem) -> Result<(Assignment, SolveStats)> {
        let key = problem.content_key();
        if let Some((assignment, mut stats)) = self.cache.fetch(&key) {
            stats.cache_hit = true;
            debug!("solve cache hit ({})", &key[..12.min(key.len())]);
            return Ok((assignment, stats));
        }

        let solved = Solver::new(problem).with_budget(self.budget).solve()?;
        self.cache.store(&key, solved.0.clone(), solved.1.clone());
        Ok(solved)
    }
}

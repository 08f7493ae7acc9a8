use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use indexmap::IndexMap;
use log::{debug, trace};
use strata_spec::{
    AbstractSpec, ArchSpec, DepRequest, DepTypes, SpecSnapshot, VariantConstraint, VariantValue,
    Version,
};

use crate::compile::Problem;
use crate::error::{ConcretizeError, Result};
use crate::facts::{PackageFacts, VariantDef, VersionDecl};

use super::assignment::{Assignment, EdgeFact, NodeFact, SolveStats};
use super::cost::CostVector;

const DEFAULT_BUDGET: u64 = 50_000;

/// All dependency types; roots are treated as serving every phase so that
/// incompatible root requests can never split into separate nodes.
const ALL_DEPTYPES: DepTypes = DepTypes {
    build: true,
    link: true,
    run: true,
    test: true,
};

/// Branch-and-bound constraint solver over candidate (version, variant,
/// provider) assignments.
///
/// The search enumerates complete assignments and keeps the one with the
/// smallest lexicographic cost vector. Every cost component can only grow
/// as nodes and edges are added, so a partial assignment already at or
/// above the incumbent's cost is pruned. Candidates at every branch point
/// are ordered to mirror the cost vector (reused before external before
/// fresh, preferred versions first, default variant values first,
/// configured provider order), which makes the first assignment found a
/// strong incumbent and resolves cost ties in its favor. All iteration
/// orders are deterministic; solving the same problem twice yields
/// bit-identical assignments.
pub struct Solver<'a> {
    problem: &'a Problem,
    budget: u64,
}

impl<'a> Solver<'a> {
    pub fn new(problem: &'a Problem) -> Self {
        Self {
            problem,
            budget: DEFAULT_BUDGET,
        }
    }

    /// Cap the number of candidate attempts before the solve surfaces a
    /// timeout.
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    pub fn solve(&self) -> Result<(Assignment, SolveStats)> {
        let mut state = SolveState::default();
        let mut budget = Budget {
            attempts: 0,
            limit: self.budget,
        };
        let mut search = Search { best: None };

        // The last pushed request is expanded first, so roots go in in
        // reverse to keep depth-first, declaration-order expansion.
        for root in self.problem.roots.iter().rev() {
            state.pending.push(Request {
                spec: root.clone(),
                deptypes: ALL_DEPTYPES,
                deptype_pinned: false,
                virtuals: BTreeSet::new(),
                propagated: Vec::new(),
                parent: None,
                pinned: true,
            });
        }

        let outcome = self.explore(state, &mut budget, &mut search);
        let (assignment, cost) = match search.best {
            // A budget exhausted mid-enumeration still returns the best
            // assignment found so far; a timeout is only fatal when the
            // search produced nothing.
            Some(best) => best,
            None => {
                return Err(match outcome {
                    Err(err) => err,
                    Ok(()) => ConcretizeError::unsatisfiable(
                        self.problem
                            .roots
                            .iter()
                            .map(|r| r.to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                        "no assignment satisfies the request".to_string(),
                    ),
                })
            }
        };

        let stats = SolveStats {
            cost,
            attempts: budget.attempts,
            reused_nodes: assignment.nodes.iter().filter(|n| n.reused).count(),
            fresh_nodes: assignment
                .nodes
                .iter()
                .filter(|n| !n.reused && n.external.is_none())
                .count(),
            cache_hit: false,
        };
        debug!(
            "solved {} roots: {} nodes, {} edges, {} attempts",
            assignment.roots.len(),
            assignment.nodes.len(),
            assignment.edges.len(),
            budget.attempts
        );
        Ok((assignment, stats))
    }

    /// Advance one search branch: prune against the incumbent, finish the
    /// branch when no requests remain, otherwise expand the next request.
    fn explore(&self, mut state: SolveState, budget: &mut Budget, search: &mut Search) -> Result<()> {
        if let Some((_, bound)) = &search.best {
            let partial = self.cost_of(state.clone());
            if partial >= *bound {
                return Ok(());
            }
        }

        let request = match state.pending.pop() {
            Some(request) => request,
            None => {
                let assignment = state.into_assignment();
                let cost = self.assignment_cost(&assignment);
                let better = search.best.as_ref().map_or(true, |(_, b)| cost < *b);
                if better {
                    trace!("incumbent assignment: {} nodes, cost {cost:?}", assignment.nodes.len());
                    search.best = Some((assignment, cost));
                }
                return Ok(());
            }
        };
        self.resolve(state, budget, search, request)
    }

    fn cost_of(&self, state: SolveState) -> CostVector {
        self.assignment_cost(&state.into_assignment())
    }

    fn assignment_cost(&self, assignment: &Assignment) -> CostVector {
        CostVector::of(assignment, self.problem)
    }

    /// Expand one node request, branching over every way to satisfy it.
    fn resolve(
        &self,
        state: SolveState,
        budget: &mut Budget,
        search: &mut Search,
        request: Request,
    ) -> Result<()> {
        budget.spend()?;

        let name = match &request.spec.name {
            Some(n) => n.clone(),
            None => {
                return Err(ConcretizeError::SpecSyntax {
                    spec: request.spec.to_string(),
                    message: "dependency request has no package name".to_string(),
                })
            }
        };

        if self.problem.is_virtual(&name) {
            return self.resolve_virtual(state, budget, search, request, &name);
        }
        self.resolve_package(state, budget, search, request, &name)
    }

    /// Branch over the concrete providers of a virtual request.
    fn resolve_virtual(
        &self,
        state: SolveState,
        budget: &mut Budget,
        search: &mut Search,
        request: Request,
        virtual_name: &str,
    ) -> Result<()> {
        let mut providers: Vec<&String> = self.problem.providers_of(virtual_name).iter().collect();
        providers.sort_by(|a, b| {
            let rank_a = self.problem.config.provider_rank(virtual_name, a);
            let rank_b = self.problem.config.provider_rank(virtual_name, b);
            rank_a.cmp(&rank_b).then_with(|| a.cmp(b))
        });

        let mut satisfied = false;
        let mut last_err: Option<ConcretizeError> = None;
        for provider in providers {
            let mut attempt = request.clone();
            attempt.spec.name = Some(provider.clone());
            attempt.virtuals.insert(virtual_name.to_string());
            trace!("virtual {virtual_name}: trying provider {provider}");

            // The provides check runs against the provider's final snapshot
            // when its node is inserted or unified, via the request's
            // virtuals set.
            match self.resolve_package(state.clone(), budget, search, attempt, provider) {
                Ok(()) => satisfied = true,
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => last_err = Some(err),
            }
        }

        if satisfied {
            return Ok(());
        }
        Err(last_err.unwrap_or_else(|| {
            ConcretizeError::unsatisfiable(
                request.spec.to_string(),
                format!("no configured package provides {virtual_name}"),
            )
        }))
    }

    fn resolve_package(
        &self,
        state: SolveState,
        budget: &mut Budget,
        search: &mut Search,
        request: Request,
        name: &str,
    ) -> Result<()> {
        let facts = self
            .problem
            .facts(name)
            .cloned()
            .ok_or_else(|| ConcretizeError::UnknownPackage {
                name: name.to_string(),
            })?;

        let merged = self.merge_constraints(&request, name, &facts)?;
        let variant_constraints =
            merged
                .variant_map()
                .map_err(|variant| ConcretizeError::unsatisfiable(
                    merged.to_string(),
                    format!("variant `{variant}` constrained to two different values"),
                ))?;
        let range = merged.version_range().ok_or_else(|| {
            ConcretizeError::unsatisfiable(
                merged.to_string(),
                "empty version range intersection".to_string(),
            )
            .with_conflicts(merged.versions.iter().map(|c| c.to_string()).collect())
        })?;

        let mut satisfied = false;
        let mut last_err: Option<ConcretizeError> = None;
        let existing: Vec<usize> = state.nodes_named(name);

        // Unification: attaching to an existing node adds no node cost, so
        // these branches come first.
        for idx in &existing {
            if !self.node_satisfies(&state, *idx, &merged, &variant_constraints, &request) {
                continue;
            }
            let mut attempt = state.clone();
            match self.attach_edge(&mut attempt, *idx, &request) {
                Ok(()) => match self.explore(attempt, budget, search) {
                    Ok(()) => satisfied = true,
                    Err(err) if is_fatal(&err) => return Err(err),
                    Err(err) => last_err = Some(err),
                },
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => last_err = Some(err),
            }
        }

        // Reuse candidates next: substituting a pre-built spec is the
        // cheapest way to satisfy a node fresh.
        for candidate in self.problem.reusable_for(name) {
            if !snapshot_satisfies(&candidate.snapshot, &range, &variant_constraints, &merged.arch)
            {
                continue;
            }
            let version = match &candidate.snapshot.version {
                Some(v) => v.clone(),
                None => continue,
            };
            budget.spend()?;
            let node = DraftNode {
                name: name.to_string(),
                namespace: facts.namespace.clone(),
                version,
                variants: candidate.snapshot.variants.clone(),
                arch: candidate.snapshot.arch.clone(),
                external: candidate.prefix.clone(),
                reused: true,
                reuse_hash: Some(candidate.hash.clone()),
                deprecated: false,
                served: DepTypes::NONE,
            };
            let mut attempt = state.clone();
            match self.insert_node(&mut attempt, &request, node, &existing) {
                Ok(_) => match self.explore(attempt, budget, search) {
                    Ok(()) => satisfied = true,
                    Err(err) if is_fatal(&err) => return Err(err),
                    Err(err) => last_err = Some(err),
                },
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => last_err = Some(err),
            }
        }

        // Configured externals: already installed, nothing to build.
        for entry in self.problem.config.externals_for(name) {
            let exact = entry
                .spec
                .version_range()
                .and_then(|r| r.exact_version().cloned());
            let version = match exact {
                Some(v) if range.satisfies(&v) => v,
                _ => continue,
            };
            let mut variants = BTreeMap::new();
            if let Ok(map) = entry.spec.variant_map() {
                for (vname, vc) in map {
                    variants.insert(vname, vc.value.clone());
                }
            }
            budget.spend()?;
            let node = DraftNode {
                name: name.to_string(),
                namespace: facts.namespace.clone(),
                version,
                variants,
                arch: merged.arch.concretized_against(&self.problem.config.host_arch),
                external: Some(entry.prefix.clone()),
                reused: false,
                reuse_hash: None,
                deprecated: false,
                served: DepTypes::NONE,
            };
            let mut attempt = state.clone();
            match self.insert_node(&mut attempt, &request, node, &existing) {
                Ok(_) => match self.explore(attempt, budget, search) {
                    Ok(()) => satisfied = true,
                    Err(err) if is_fatal(&err) => return Err(err),
                    Err(err) => last_err = Some(err),
                },
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => last_err = Some(err),
            }
        }

        // Fresh builds last, unless the package is pinned unbuildable.
        if self.problem.config.is_buildable(name) {
            let candidates = self.version_candidates(name, &facts, &range);
            for decl in candidates {
                match self.try_version(
                    &state,
                    budget,
                    search,
                    &request,
                    &merged,
                    &variant_constraints,
                    &facts,
                    decl,
                ) {
                    Ok(()) => satisfied = true,
                    Err(err) if is_fatal(&err) => return Err(err),
                    Err(err) => last_err = Some(err),
                }
            }
        } else if !satisfied && last_err.is_none() {
            last_err = Some(ConcretizeError::unsatisfiable(
                merged.to_string(),
                format!("{name} is not buildable and no external or reusable spec matches"),
            ));
        }

        if satisfied {
            return Ok(());
        }
        Err(last_err.unwrap_or_else(|| {
            ConcretizeError::unsatisfiable(
                merged.to_string(),
                format!("no version of {name} satisfies the request"),
            )
        }))
    }

    /// Merge the request with configured hard requirements and applicable
    /// propagated variants.
    fn merge_constraints(
        &self,
        request: &Request,
        name: &str,
        facts: &PackageFacts,
    ) -> Result<AbstractSpec> {
        let mut merged = request.spec.clone();

        if let Some(settings) = self.problem.config.package(name) {
            for require in &settings.require {
                merged = merged.merged(require).ok_or_else(|| {
                    ConcretizeError::unsatisfiable(
                        request.spec.to_string(),
                        format!("conflicts with configured requirement `{require}`"),
                    )
                    .with_conflicts(vec![request.spec.to_string(), require.to_string()])
                })?;
            }
        }

        // Propagated variant constraints apply only to packages that
        // declare the variant; they keep propagating either way.
        for vc in &request.propagated {
            if facts.variants.iter().any(|d| d.name == vc.name)
                && !merged.variants.iter().any(|c| c.name == vc.name)
            {
                merged.variants.push(vc.clone());
            }
        }

        Ok(merged)
    }

    /// Declared versions satisfying the range, in candidate order, with
    /// configured preferences applied as a stable reordering.
    fn version_candidates<'f>(
        &self,
        name: &str,
        facts: &'f PackageFacts,
        range: &strata_spec::VersionConstraint,
    ) -> Vec<&'f VersionDecl> {
        let checksum_required = self.problem.config.checksum;
        let mut candidates: Vec<&VersionDecl> = facts
            .version_candidates()
            .into_iter()
            .filter(|decl| range.satisfies(&decl.version))
            .filter(|decl| !checksum_required || decl.sha256.is_some() || decl.git_based)
            .collect();

        if let Some(settings) = self.problem.config.package(name) {
            if !settings.prefer.is_empty() {
                let rank = |decl: &VersionDecl| -> usize {
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
                candidates.sort_by_key(|decl| rank(*decl));
            }
        }

        candidates
    }

    /// Try one declared version: enumerate variant assignments, check
    /// conflicts, then queue dependency expansion.
    #[allow(clippy::too_many_arguments)]
    fn try_version(
        &self,
        state: &SolveState,
        budget: &mut Budget,
        search: &mut Search,
        request: &Request,
        merged: &AbstractSpec,
        variant_constraints: &IndexMap<String, VariantConstraint>,
        facts: &PackageFacts,
        decl: &VersionDecl,
    ) -> Result<()> {
        budget.spend()?;

        let arch = merged
            .arch
            .concretized_against(&self.problem.config.host_arch);
        let base_snap = SpecSnapshot {
            name: facts.name.clone(),
            version: Some(decl.version.clone()),
            variants: BTreeMap::new(),
            arch: arch.clone(),
        };

        // Variant applicability is conditioned on version and architecture.
        let applicable: Vec<&VariantDef> = facts
            .applicable_variants(&base_snap)
            .into_iter()
            .map(|(_, def)| def)
            .collect();

        // Every constrained variant must exist at this version and take an
        // admitted value.
        for (vname, vc) in variant_constraints {
            match applicable.iter().find(|d| &d.name == vname) {
                Some(def) if def.domain.admits(&vc.value) => {}
                Some(_) => {
                    return Err(ConcretizeError::unsatisfiable(
                        merged.to_string(),
                        format!("value `{}` not allowed for variant `{vname}`", vc.value),
                    ))
                }
                None => {
                    return Err(ConcretizeError::unsatisfiable(
                        merged.to_string(),
                        format!(
                            "{}@{} has no variant `{vname}`",
                            facts.name, decl.version
                        ),
                    ))
                }
            }
        }

        // Constrained variants take the requested value; the rest keep their
        // declared default. Defaults are never flipped to shed dependency
        // nodes, so only explicit constraints move a variant off its default.
        let mut assigned: BTreeMap<String, VariantValue> = BTreeMap::new();
        for def in &applicable {
            let value = match variant_constraints.get(&def.name) {
                Some(vc) => vc.value.clone(),
                None => def.default.clone(),
            };
            assigned.insert(def.name.clone(), value);
        }

        let mut attempt = state.clone();
        self.commit_build(&mut attempt, request, merged, facts, decl, &arch, assigned)?;
        self.explore(attempt, budget, search)
    }

    /// Materialize a fresh-build node and queue its dependency requests.
    #[allow(clippy::too_many_arguments)]
    fn commit_build(
        &self,
        state: &mut SolveState,
        request: &Request,
        merged: &AbstractSpec,
        facts: &PackageFacts,
        decl: &VersionDecl,
        arch: &ArchSpec,
        variants: BTreeMap<String, VariantValue>,
    ) -> Result<usize> {
        let snap = SpecSnapshot {
            name: facts.name.clone(),
            version: Some(decl.version.clone()),
            variants: variants.clone(),
            arch: arch.clone(),
        };

        for rule in &facts.conflicts {
            if rule.trigger.matches(&snap) && rule.forbidden.matches(&snap) {
                let message = rule
                    .message
                    .clone()
                    .unwrap_or_else(|| "declared conflict".to_string());
                return Err(ConcretizeError::unsatisfiable(
                    format!("{}@{}", facts.name, decl.version),
                    message,
                )
                .with_conflicts(vec![
                    rule.trigger.to_string(),
                    rule.forbidden.to_string(),
                ]));
            }
        }

        let existing = state.nodes_named(&facts.name);
        let node = DraftNode {
            name: facts.name.clone(),
            namespace: facts.namespace.clone(),
            version: decl.version.clone(),
            variants,
            arch: arch.clone(),
            external: None,
            reused: false,
            reuse_hash: None,
            deprecated: decl.deprecated,
            served: DepTypes::NONE,
        };
        let idx = self.insert_node(state, request, node, &existing)?;

        // User-pinned dependency requests become hints merged into the
        // condition-driven child requests of the same name (or the
        // providers of the same virtual).
        let mut hints: IndexMap<String, DepRequest> = IndexMap::new();
        for dep in &merged.dependencies {
            if let Some(dep_name) = &dep.spec.name {
                hints.insert(dep_name.clone(), dep.clone());
            }
        }

        let mut propagated: Vec<VariantConstraint> = merged
            .variants
            .iter()
            .filter(|c| c.propagate)
            .cloned()
            .collect();
        for vc in &request.propagated {
            if !propagated.iter().any(|c| c.name == vc.name) {
                propagated.push(vc.clone());
            }
        }

        let mut children: Vec<Request> = Vec::new();
        for condition in facts.applicable_dependencies(&snap) {
            let mut child_spec = condition.spec.clone();
            if child_spec.name.is_none() {
                child_spec.name = Some(condition.name.clone());
            }
            let mut deptypes = condition.deptypes;
            let mut deptype_pinned = false;
            let mut pinned = false;
            let mut virtuals = condition.virtuals.clone();

            let hint = self.take_hint(&mut hints, &condition.name);
            if let Some(hint) = hint {
                if let Some(hint_name) = &hint.spec.name {
                    // A hint naming a concrete provider forces the choice
                    // for a virtual condition.
                    if self.problem.is_virtual(&condition.name) {
                        virtuals.insert(condition.name.clone());
                        child_spec.name = Some(hint_name.clone());
                    }
                }
                child_spec = child_spec.merged(&hint.spec).ok_or_else(|| {
                    ConcretizeError::unsatisfiable(
                        merged.to_string(),
                        format!(
                            "dependency request `{}` conflicts with declared dependency",
                            hint.spec
                        ),
                    )
                })?;
                if let Some(pin) = hint.deptypes {
                    deptypes = pin;
                    deptype_pinned = true;
                }
                virtuals.extend(hint.virtuals.iter().cloned());
                pinned = true;
            }

            children.push(Request {
                spec: child_spec,
                deptypes,
                deptype_pinned,
                virtuals,
                propagated: propagated.clone(),
                parent: Some(idx),
                pinned,
            });
        }

        // Hints that matched no declared dependency become direct edges.
        for (_, hint) in hints {
            children.push(Request {
                spec: hint.spec.clone(),
                deptypes: hint.deptypes.unwrap_or(DepTypes::DEFAULT),
                deptype_pinned: hint.deptypes.is_some(),
                virtuals: hint.virtuals.clone(),
                propagated: propagated.clone(),
                parent: Some(idx),
                pinned: true,
            });
        }

        // Reversed so the first declared dependency is expanded first.
        for child in children.into_iter().rev() {
            state.pending.push(child);
        }

        Ok(idx)
    }

    /// A hint matches a condition by exact name, or by naming a provider of
    /// the condition's virtual.
    fn take_hint(
        &self,
        hints: &mut IndexMap<String, DepRequest>,
        condition_name: &str,
    ) -> Option<DepRequest> {
        if let Some(hint) = hints.shift_remove(condition_name) {
            return Some(hint);
        }
        if self.problem.is_virtual(condition_name) {
            let provider = self
                .problem
                .providers_of(condition_name)
                .iter()
                .find(|p| hints.contains_key(*p))?
                .clone();
            return hints.shift_remove(&provider);
        }
        None
    }

    /// Arena insertion with the same-name distinctness rule, edge creation,
    /// and the forbidden-combination check.
    fn insert_node(
        &self,
        state: &mut SolveState,
        request: &Request,
        node: DraftNode,
        existing: &[usize],
    ) -> Result<usize> {
        let snap = node.snapshot();
        for virtual_name in &request.virtuals {
            let provides = self
                .problem
                .facts(&node.name)
                .map(|f| f.provides_virtual(virtual_name, &snap))
                .unwrap_or(false);
            if !provides {
                return Err(ConcretizeError::unsatisfiable(
                    request.spec.to_string(),
                    format!("{} does not provide {virtual_name} as resolved", node.name),
                ));
            }
        }

        for other in existing {
            let served = state.nodes[*other].served;
            if !request.deptypes.is_disjoint_from(served) {
                return Err(ConcretizeError::unsatisfiable(
                    request.spec.to_string(),
                    format!(
                        "needs {} concretized differently from the existing {}@{} node",
                        node.name, node.name, state.nodes[*other].version
                    ),
                )
                .with_conflicts(vec![
                    request.spec.to_string(),
                    state.nodes[*other].snapshot_string(),
                ]));
            }
        }

        let idx = state.nodes.len();
        state.nodes.push(node);
        self.attach_edge(state, idx, request)?;
        Ok(idx)
    }

    /// Create or merge the edge carrying this request, honoring explicit
    /// deptype pins, then re-check forbidden cyclic combinations.
    fn attach_edge(&self, state: &mut SolveState, child: usize, request: &Request) -> Result<()> {
        state.nodes[child].served = state.nodes[child].served.union(request.deptypes);

        let parent = match request.parent {
            Some(p) => p,
            None => {
                state.roots.push(child);
                return Ok(());
            }
        };

        if let Some(edge) = state
            .edges
            .iter_mut()
            .find(|e| e.parent == parent && e.child == child)
        {
            let union = edge.deptypes.union(request.deptypes);
            if (edge.deptype_pinned && union != edge.deptypes)
                || (request.deptype_pinned && union != request.deptypes)
            {
                return Err(ConcretizeError::unsatisfiable(
                    request.spec.to_string(),
                    "edge merge would violate an explicit deptype pin".to_string(),
                ));
            }
            edge.deptypes = union;
            edge.deptype_pinned |= request.deptype_pinned;
            edge.virtuals.extend(request.virtuals.iter().cloned());
            edge.pinned |= request.pinned;
        } else {
            state.edges.push(DraftEdge {
                parent,
                child,
                deptypes: request.deptypes,
                deptype_pinned: request.deptype_pinned,
                virtuals: request.virtuals.clone(),
                pinned: request.pinned,
            });
        }

        self.check_forbidden(state, request)
    }

    /// Fail as soon as every edge of a forbidden combination is present
    /// with binding deptypes.
    fn check_forbidden(&self, state: &SolveState, request: &Request) -> Result<()> {
        for set in &self.problem.forbidden {
            let complete = set.edges.iter().all(|(parent_name, child_name)| {
                state.edges.iter().any(|e| {
                    e.deptypes.is_binding()
                        && state.nodes[e.parent].name == *parent_name
                        && state.nodes[e.child].name == *child_name
                })
            });
            if complete {
                let cycle: Vec<String> = set
                    .edges
                    .iter()
                    .map(|(a, b)| format!("{a} -> {b}"))
                    .collect();
                return Err(ConcretizeError::unsatisfiable(
                    request.spec.to_string(),
                    "assignment reproduces a forbidden cyclic edge combination".to_string(),
                )
                .with_conflicts(cycle));
            }
        }
        Ok(())
    }

    /// Whether an existing node satisfies every constraint of a request.
    fn node_satisfies(
        &self,
        state: &SolveState,
        idx: usize,
        merged: &AbstractSpec,
        variant_constraints: &IndexMap<String, VariantConstraint>,
        request: &Request,
    ) -> bool {
        let node = &state.nodes[idx];

        let range = match merged.version_range() {
            Some(r) => r,
            None => return false,
        };
        if !range.satisfies(&node.version) {
            return false;
        }

        for (vname, vc) in variant_constraints {
            match node.variants.get(vname) {
                Some(value) if vc.satisfied_by(value) => {}
                _ => return false,
            }
        }

        if !merged.arch.satisfied_by(&node.arch) {
            return false;
        }

        let snap = node.snapshot();
        for virtual_name in &request.virtuals {
            let provides = self
                .problem
                .facts(&node.name)
                .map(|f| f.provides_virtual(virtual_name, &snap))
                .unwrap_or(false);
            if !provides {
                return false;
            }
        }

        // User dependency pins must already hold on the existing node.
        for dep in &merged.dependencies {
            let dep_name = match &dep.spec.name {
                Some(n) => n,
                None => continue,
            };
            let satisfied = state.edges.iter().any(|e| {
                e.parent == idx
                    && (&state.nodes[e.child].name == dep_name
                        || e.virtuals.contains(dep_name))
                    && dep.spec.matches(&state.nodes[e.child].snapshot())
            });
            if !satisfied {
                return false;
            }
        }

        true
    }
}

fn is_fatal(err: &ConcretizeError) -> bool {
    matches!(err, ConcretizeError::SolverTimeout { .. })
}

/// Whether a reuse candidate's snapshot satisfies the merged constraints.
fn snapshot_satisfies(
    snap: &SpecSnapshot,
    range: &strata_spec::VersionConstraint,
    variant_constraints: &IndexMap<String, VariantConstraint>,
    arch: &ArchSpec,
) -> bool {
    match &snap.version {
        Some(v) if range.satisfies(v) => {}
        _ => return false,
    }
    for (vname, vc) in variant_constraints {
        match snap.variants.get(vname) {
            Some(value) if vc.satisfied_by(value) => {}
            _ => return false,
        }
    }
    arch.satisfied_by(&snap.arch)
}

/// The incumbent assignment, replaced only by a strictly cheaper one so
/// that cost ties keep the first (highest branch-preference) solution.
struct Search {
    best: Option<(Assignment, CostVector)>,
}

struct Budget {
    attempts: u64,
    limit: u64,
}

impl Budget {
    fn spend(&mut self) -> Result<()> {
        self.attempts += 1;
        if self.attempts > self.limit {
            return Err(ConcretizeError::SolverTimeout {
                attempts: self.attempts,
            });
        }
        Ok(())
    }
}

/// A node under construction in the solve arena.
#[derive(Debug, Clone)]
struct DraftNode {
    name: String,
    namespace: String,
    version: Version,
    variants: BTreeMap<String, VariantValue>,
    arch: ArchSpec,
    external: Option<PathBuf>,
    reused: bool,
    reuse_hash: Option<String>,
    deprecated: bool,
    /// Union of deptypes over incoming edges; roots serve all phases.
    served: DepTypes,
}

impl DraftNode {
    fn snapshot(&self) -> SpecSnapshot {
        SpecSnapshot {
            name: self.name.clone(),
            version: Some(self.version.clone()),
            variants: self.variants.clone(),
            arch: self.arch.clone(),
        }
    }

    fn snapshot_string(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

#[derive(Debug, Clone)]
struct DraftEdge {
    parent: usize,
    child: usize,
    deptypes: DepTypes,
    deptype_pinned: bool,
    virtuals: BTreeSet<String>,
    pinned: bool,
}

/// One node request: merged constraints plus edge attributes.
#[derive(Debug, Clone)]
struct Request {
    spec: AbstractSpec,
    deptypes: DepTypes,
    deptype_pinned: bool,
    virtuals: BTreeSet<String>,
    propagated: Vec<VariantConstraint>,
    parent: Option<usize>,
    pinned: bool,
}

#[derive(Debug, Clone, Default)]
struct SolveState {
    nodes: Vec<DraftNode>,
    edges: Vec<DraftEdge>,
    roots: Vec<usize>,
    /// Requests not yet expanded; the back of the stack is expanded first.
    pending: Vec<Request>,
}

impl SolveState {
    fn nodes_named(&self, name: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.name == name)
            .map(|(i, _)| i)
            .collect()
    }

    fn into_assignment(self) -> Assignment {
        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(id, node)| NodeFact {
                id: id as u32,
                name: node.name,
                namespace: node.namespace,
                version: node.version,
                variants: node.variants,
                arch: node.arch,
                external: node.external,
                reused: node.reused,
                reuse_hash: node.reuse_hash,
                deprecated: node.deprecated,
            })
            .collect();

        let mut edges: Vec<EdgeFact> = self
            .edges
            .into_iter()
            .map(|edge| EdgeFact {
                parent: edge.parent as u32,
                child: edge.child as u32,
                deptypes: edge.deptypes,
                virtuals: edge.virtuals,
                pinned: edge.pinned,
            })
            .collect();
        edges.sort_by_key(|e| (e.parent, e.child));

        Assignment {
            nodes,
            edges,
            roots: self.roots.into_iter().map(|r| r as u32).collect(),
        }
    }
}

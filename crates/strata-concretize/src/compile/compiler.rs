use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};
use strata_spec::AbstractSpec;

use crate::config::ConcretizerConfig;
use crate::error::{ConcretizeError, Result};
use crate::facts::{FactProvider, PackageFacts};
use crate::reuse::ReusableSpec;

use super::problem::Problem;

/// Compiles root abstract specs plus configuration into a normalized
/// [`Problem`].
///
/// Compilation walks every root tree, validates literal constraints
/// structurally, computes the fixed-point closure of reachable packages,
/// and eliminates conditional definitions that a later, higher-precedence
/// definition always overrides.
pub struct Compiler<'a> {
    provider: &'a FactProvider,
    config: &'a ConcretizerConfig,
}

impl<'a> Compiler<'a> {
    pub fn new(provider: &'a FactProvider, config: &'a ConcretizerConfig) -> Self {
        Self { provider, config }
    }

    pub fn compile(
        &self,
        roots: &[AbstractSpec],
        reusable: Vec<ReusableSpec>,
    ) -> Result<Problem> {
        for root in roots {
            if root.is_anonymous() {
                return Err(ConcretizeError::SpecSyntax {
                    spec: root.to_string(),
                    message: "root specs must name a package".to_string(),
                });
            }
            validate_tree(root)?;
        }

        let mut packages: IndexMap<String, Arc<PackageFacts>> = IndexMap::new();
        let mut virtual_providers: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut queue: VecDeque<(String, bool)> = VecDeque::new();
        let mut enqueued: BTreeSet<String> = BTreeSet::new();

        let push = |queue: &mut VecDeque<(String, bool)>,
                        enqueued: &mut BTreeSet<String>,
                        name: &str,
                        required: bool| {
            if enqueued.insert(name.to_string()) {
                queue.push_back((name.to_string(), required));
            }
        };

        for root in roots {
            for name in spec_tree_names(root) {
                push(&mut queue, &mut enqueued, &name, true);
            }
        }
        for candidate in &reusable {
            push(&mut queue, &mut enqueued, candidate.name(), false);
        }

        while let Some((name, required)) = queue.pop_front() {
            if packages.contains_key(&name) || virtual_providers.contains_key(&name) {
                continue;
            }

            match self.provider.facts(&name) {
                Ok(facts) => {
                    let pruned = Arc::new(prune_facts(&facts));
                    for dep in &pruned.dependencies {
                        push(&mut queue, &mut enqueued, &dep.name, required);
                        for nested in spec_tree_names(&dep.spec) {
                            push(&mut queue, &mut enqueued, &nested, required);
                        }
                    }
                    // Hard requirements from configuration can pull in
                    // dependency constraints of their own.
                    if let Some(settings) = self.config.package(&name) {
                        for require in &settings.require {
                            validate_tree(require)?;
                            for nested in spec_tree_names(require) {
                                push(&mut queue, &mut enqueued, &nested, required);
                            }
                        }
                    }
                    packages.insert(name, pruned);
                }
                Err(err) => {
                    let providers = self.provider.providers_of(&name);
                    if !providers.is_empty() {
                        for provider_name in &providers {
                            push(&mut queue, &mut enqueued, provider_name, required);
                        }
                        virtual_providers.insert(name, providers);
                    } else if required {
                        return Err(err);
                    } else {
                        // Unknown names from the reuse pool degrade reuse,
                        // never the solve.
                        warn!("ignoring reuse candidate for unknown package {name}");
                    }
                }
            }
        }

        debug!(
            "compiled problem: {} roots, {} packages, {} virtuals, {} reuse candidates",
            roots.len(),
            packages.len(),
            virtual_providers.len(),
            reusable.len()
        );

        Ok(Problem {
            roots: roots.to_vec(),
            packages,
            virtual_providers,
            reusable,
            config: self.config.clone(),
            forbidden: Vec::new(),
        })
    }
}

/// Structural validation of one abstract spec tree. Conflicting literal
/// constraints on the same attribute are an input error, detected before
/// any solving happens.
fn validate_tree(spec: &AbstractSpec) -> Result<()> {
    if spec.version_range().is_none() {
        return Err(ConcretizeError::SpecSyntax {
            spec: spec.to_string(),
            message: "conflicting version constraints on one node".to_string(),
        });
    }
    if let Err(name) = spec.variant_map() {
        return Err(ConcretizeError::SpecSyntax {
            spec: spec.to_string(),
            message: format!("variant `{name}` constrained to two different values"),
        });
    }
    for dep in &spec.dependencies {
        if let Some(deptypes) = dep.deptypes {
            if deptypes.is_empty() {
                return Err(ConcretizeError::SpecSyntax {
                    spec: spec.to_string(),
                    message: "dependency pinned to an empty deptype set".to_string(),
                });
            }
        }
        validate_tree(&dep.spec)?;
    }
    Ok(())
}

/// All package (or virtual) names appearing in a spec tree, root first.
fn spec_tree_names(spec: &AbstractSpec) -> Vec<String> {
    let mut names = Vec::new();
    collect_names(spec, &mut names);
    names
}

fn collect_names(spec: &AbstractSpec, out: &mut Vec<String>) {
    if let Some(name) = &spec.name {
        out.push(name.clone());
    }
    for dep in &spec.dependencies {
        collect_names(&dep.spec, out);
        for v in &dep.virtuals {
            out.push(v.clone());
        }
    }
}

fn condition_implies(a: &Option<AbstractSpec>, b: &Option<AbstractSpec>) -> bool {
    let anon = AbstractSpec::anonymous();
    let a = a.as_ref().unwrap_or(&anon);
    let b = b.as_ref().unwrap_or(&anon);
    a.implies(b)
}

/// Dead-rule elimination: drop a conditional definition when a later
/// definition of the same key, at equal or higher precedence, has a
/// condition implied by it. Such a definition can never win, so the solver
/// never needs to consider it.
fn prune_facts(facts: &PackageFacts) -> PackageFacts {
    let mut pruned = facts.clone();

    let variants = std::mem::take(&mut pruned.variants);
    pruned.variants = variants
        .iter()
        .enumerate()
        .filter(|(i, def)| {
            !variants.iter().skip(i + 1).any(|later| {
                later.name == def.name
                    && later.precedence >= def.precedence
                    && condition_implies(&def.when, &later.when)
            })
        })
        .map(|(_, def)| def.clone())
        .collect();

    let dependencies = std::mem::take(&mut pruned.dependencies);
    pruned.dependencies = dependencies
        .iter()
        .enumerate()
        .filter(|(i, dep)| {
            !dependencies.iter().skip(i + 1).any(|later| {
                later.name == dep.name
                    && later.precedence >= dep.precedence
                    && condition_implies(&dep.when, &later.when)
            })
        })
        .map(|(_, dep)| dep.clone())
        .collect();

    let conflicts = std::mem::take(&mut pruned.conflicts);
    pruned.conflicts = conflicts
        .iter()
        .enumerate()
        .filter(|(i, rule)| {
            !conflicts.iter().skip(i + 1).any(|later| {
                later.forbidden == rule.forbidden && rule.trigger.implies(&later.trigger)
            })
        })
        .map(|(_, rule)| rule.clone())
        .collect();

    pruned
}

use std::collections::BTreeSet;
use std::path::PathBuf;

use glob::Pattern;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strata_spec::{AbstractSpec, SpecSnapshot};

use crate::config::{ConcretizerConfig, LibcInfo, ReusePolicy, SourceKind};
use crate::error::Result;

/// A previously concretized spec usable as a pre-built substitute.
///
/// Reused nodes are not re-expanded by the solver: their dependencies are
/// already built and are identified by hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReusableSpec {
    pub snapshot: SpecSnapshot,
    /// Content hash over the candidate's full transitive subgraph.
    pub hash: String,
    pub provenance: SourceKind,
    /// The candidate claims to be an externally installed package rather
    /// than one this system built.
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub prefix: Option<PathBuf>,
    #[serde(default)]
    pub modules: Vec<String>,
    /// The C library the candidate was built against, if recorded.
    #[serde(default)]
    pub libc: Option<LibcInfo>,
}

impl ReusableSpec {
    pub fn name(&self) -> &str {
        &self.snapshot.name
    }

    /// Render in spec surface syntax, for include/exclude matching and
    /// diagnostics.
    pub fn render(&self) -> String {
        let mut out = self.snapshot.name.clone();
        if let Some(version) = &self.snapshot.version {
            out.push('@');
            out.push_str(version.as_str());
        }
        for (name, value) in &self.snapshot.variants {
            match value.as_bool() {
                Some(true) => out.push_str(&format!("+{name}")),
                Some(false) => out.push_str(&format!("~{name}")),
                None => out.push_str(&format!(" {name}={value}")),
            }
        }
        out
    }
}

/// One source of reuse candidates. Reads are independent and may run
/// concurrently; the selector merges results deterministically.
pub trait ReuseSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn gather(&self) -> Result<Vec<ReusableSpec>>;
}

/// Candidates from the local installation store. The store database itself
/// is an external collaborator; it hands the engine a snapshot list.
pub struct LocalStore {
    installed: Vec<ReusableSpec>,
}

impl LocalStore {
    pub fn new(mut installed: Vec<ReusableSpec>) -> Self {
        for spec in &mut installed {
            spec.provenance = SourceKind::Local;
        }
        Self { installed }
    }
}

impl ReuseSource for LocalStore {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn gather(&self) -> Result<Vec<ReusableSpec>> {
        Ok(self.installed.clone())
    }
}

/// Gathers candidates from configured sources and applies the filter
/// pipeline: external applicability, libc compatibility, include/exclude
/// lists, then policy scoping.
pub struct ReuseSelector {
    sources: Vec<Box<dyn ReuseSource>>,
}

impl ReuseSelector {
    pub fn new(sources: Vec<Box<dyn ReuseSource>>) -> Self {
        Self { sources }
    }

    /// Collect the candidates usable for this solve. Never fails on an
    /// empty result: reuse is always optional.
    pub fn reusable_specs(
        &self,
        roots: &[AbstractSpec],
        policy: &ReusePolicy,
        config: &ConcretizerConfig,
    ) -> Vec<ReusableSpec> {
        let mut collected: Vec<(usize, ReusableSpec)> = Vec::new();

        for from in &policy.from {
            for (priority, source) in self
                .sources
                .iter()
                .enumerate()
                .filter(|(_, s)| s.kind() == from.kind)
            {
                let candidates = match source.gather() {
                    Ok(c) => c,
                    Err(err) => {
                        // A broken source degrades reuse, never the solve.
                        warn!("reuse source {:?} unavailable: {err}", from.kind);
                        continue;
                    }
                };

                for candidate in candidates {
                    if !self.applicable(&candidate, config) {
                        continue;
                    }
                    if !Self::passes_lists(&candidate, &from.include, &from.exclude) {
                        continue;
                    }
                    collected.push((priority, candidate));
                }
            }
        }

        if policy.roots {
            let root_names: BTreeSet<&str> = roots
                .iter()
                .filter_map(|r| r.name.as_deref())
                .collect();
            collected.retain(|(_, c)| root_names.contains(c.name()));
        }

        // Deterministic merge: source priority, then name, version, hash.
        collected.sort_by(|(pa, a), (pb, b)| {
            pa.cmp(pb)
                .then_with(|| a.snapshot.name.cmp(&b.snapshot.name))
                .then_with(|| a.snapshot.version.cmp(&b.snapshot.version))
                .then_with(|| a.hash.cmp(&b.hash))
        });

        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for (_, candidate) in collected {
            if seen.insert(candidate.hash.clone()) {
                out.push(candidate);
            }
        }
        debug!("reuse pool: {} candidates", out.len());
        out
    }

    /// Applicability: externals must exactly match a live external
    /// definition, and the candidate's libc must be host compatible.
    fn applicable(&self, candidate: &ReusableSpec, config: &ConcretizerConfig) -> bool {
        if candidate.external {
            let declared = config.externals_for(candidate.name());
            let matched = declared.iter().any(|entry| {
                // Exact match, not a satisfies check: the declared spec must
                // match the candidate and prefix/modules must be identical.
                entry.spec.matches(&candidate.snapshot)
                    && candidate.prefix.as_ref() == Some(&entry.prefix)
                    && candidate.modules == entry.modules
            });
            if !matched {
                debug!(
                    "skipping external reuse candidate {} (no matching external definition)",
                    candidate.render()
                );
                return false;
            }
        }

        if let (Some(host), Some(built_against)) = (&config.host_libc, &candidate.libc) {
            if !host.compatible_with(built_against) {
                debug!(
                    "skipping reuse candidate {} (libc {} incompatible with host {})",
                    candidate.render(),
                    built_against.version,
                    host.version
                );
                return false;
            }
        }

        true
    }

    fn passes_lists(candidate: &ReusableSpec, include: &[String], exclude: &[String]) -> bool {
        let rendered = candidate.render();
        let matches_any = |patterns: &[String]| {
            patterns.iter().any(|p| {
                Pattern::new(p)
                    .map(|pat| pat.matches(&rendered) || pat.matches(candidate.name()))
                    .unwrap_or(false)
            })
        };

        if !include.is_empty() && !matches_any(include) {
            return false;
        }
        !matches_any(exclude)
    }
}

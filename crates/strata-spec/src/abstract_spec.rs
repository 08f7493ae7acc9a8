use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::arch::ArchSpec;
use crate::constraint::VersionConstraint;
use crate::deptype::DepTypes;
use crate::variant::{VariantConstraint, VariantValue};
use crate::version::Version;

/// A possibly-incomplete constraint description of a desired package
/// instance, as produced by the parser.
///
/// A spec with no name is "anonymous" and acts as a pure constraint
/// fragment, e.g. the `when` guard of a directive. Constraint fields are
/// conjunction lists: the parser may emit several version or variant
/// constraints for the same node, and detecting that their conjunction is
/// empty is the compiler's job, not the parser's.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AbstractSpec {
    pub name: Option<String>,
    pub versions: Vec<VersionConstraint>,
    pub variants: Vec<VariantConstraint>,
    pub arch: ArchSpec,
    pub dependencies: Vec<DepRequest>,
}

/// A dependency edge requested on an abstract spec.
///
/// `deptypes` is an explicit pin when present; `None` leaves the types up to
/// the package's own dependency declarations. `virtuals` names capabilities
/// this edge must provide to the parent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepRequest {
    pub spec: AbstractSpec,
    pub deptypes: Option<DepTypes>,
    pub virtuals: BTreeSet<String>,
}

impl DepRequest {
    pub fn on(spec: AbstractSpec) -> Self {
        Self {
            spec,
            deptypes: None,
            virtuals: BTreeSet::new(),
        }
    }

    pub fn with_deptypes(mut self, deptypes: DepTypes) -> Self {
        self.deptypes = Some(deptypes);
        self
    }

    pub fn with_virtual(mut self, name: impl Into<String>) -> Self {
        self.virtuals.insert(name.into());
        self
    }
}

/// A resolved view of a node, complete enough to evaluate `when` conditions
/// against. Absent attributes fail any condition that constrains them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecSnapshot {
    pub name: String,
    pub version: Option<Version>,
    pub variants: BTreeMap<String, VariantValue>,
    pub arch: ArchSpec,
}

impl SpecSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            variants: BTreeMap::new(),
            arch: ArchSpec::default(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_variant(mut self, name: impl Into<String>, value: VariantValue) -> Self {
        self.variants.insert(name.into(), value);
        self
    }

    pub fn with_arch(mut self, arch: ArchSpec) -> Self {
        self.arch = arch;
        self
    }
}

impl AbstractSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// An anonymous spec: a bare constraint fragment with no package name.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    pub fn with_version(mut self, constraint: VersionConstraint) -> Self {
        self.versions.push(constraint);
        self
    }

    pub fn with_variant(mut self, constraint: VariantConstraint) -> Self {
        self.variants.push(constraint);
        self
    }

    pub fn with_arch(mut self, arch: ArchSpec) -> Self {
        self.arch = arch;
        self
    }

    pub fn with_dependency(mut self, request: DepRequest) -> Self {
        self.dependencies.push(request);
        self
    }

    /// Intersect all version constraints on this node. `None` means the
    /// conjunction is provably empty (a structural conflict).
    pub fn version_range(&self) -> Option<VersionConstraint> {
        let mut merged = VersionConstraint::Any;
        for c in &self.versions {
            merged = merged.intersect(c)?;
        }
        Some(merged)
    }

    /// Collapse variant constraints into a per-name map. `Err` carries the
    /// name of a variant constrained to two different values.
    pub fn variant_map(&self) -> Result<IndexMap<String, VariantConstraint>, String> {
        let mut map: IndexMap<String, VariantConstraint> = IndexMap::new();
        for c in &self.variants {
            match map.get(&c.name) {
                Some(existing) if existing.value != c.value => {
                    return Err(c.name.clone());
                }
                Some(existing) => {
                    if c.propagate && !existing.propagate {
                        map.insert(c.name.clone(), c.clone());
                    }
                }
                None => {
                    map.insert(c.name.clone(), c.clone());
                }
            }
        }
        Ok(map)
    }

    /// Evaluate this spec as a condition against a resolved node view.
    ///
    /// Used for `when` guards: an unconstrained field admits anything, a
    /// constrained field that the snapshot leaves unset does not match.
    pub fn matches(&self, snap: &SpecSnapshot) -> bool {
        if let Some(name) = &self.name {
            if name != &snap.name {
                return false;
            }
        }

        let range = match self.version_range() {
            Some(r) => r,
            None => return false,
        };
        if !range.is_any() {
            match &snap.version {
                Some(v) => {
                    if !range.satisfies(v) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        for c in &self.variants {
            match snap.variants.get(&c.name) {
                Some(value) => {
                    if !c.satisfied_by(value) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        // Unset snapshot arch components fail any condition constraining them.
        self.arch.satisfied_by(&snap.arch)
    }

    /// Conservative syntactic implication: true when every node satisfying
    /// `self` also satisfies `other`. Used for dead-rule elimination of
    /// overridden conditional definitions.
    pub fn implies(&self, other: &AbstractSpec) -> bool {
        if let Some(other_name) = &other.name {
            if self.name.as_ref() != Some(other_name) {
                return false;
            }
        }

        let (mine, theirs) = match (self.version_range(), other.version_range()) {
            (Some(a), Some(b)) => (a, b),
            // An unsatisfiable condition vacuously implies anything.
            (None, _) => return true,
            (_, None) => return false,
        };
        if !mine.implies(&theirs) {
            return false;
        }

        let my_variants = match self.variant_map() {
            Ok(m) => m,
            Err(_) => return true,
        };
        let their_variants = match other.variant_map() {
            Ok(m) => m,
            Err(_) => return false,
        };
        for (name, wanted) in &their_variants {
            match my_variants.get(name) {
                Some(mine) if mine.value == wanted.value => {}
                _ => return false,
            }
        }

        if !self.arch.implies(&other.arch) {
            return false;
        }

        // Dependency constraints on conditions are rare; compare only when
        // the broader side has none.
        other.dependencies.is_empty()
    }

    /// Merge two abstract specs into one conjunction. `None` when their
    /// names differ (anonymous specs merge with anything).
    pub fn merged(&self, other: &AbstractSpec) -> Option<AbstractSpec> {
        let name = match (&self.name, &other.name) {
            (Some(a), Some(b)) if a != b => return None,
            (Some(a), _) => Some(a.clone()),
            (None, b) => b.clone(),
        };

        let mut merged = AbstractSpec {
            name,
            versions: self.versions.clone(),
            variants: self.variants.clone(),
            arch: self.arch.merge(&other.arch)?,
            dependencies: self.dependencies.clone(),
        };
        merged.versions.extend(other.versions.iter().cloned());
        merged.variants.extend(other.variants.iter().cloned());
        merged.dependencies.extend(other.dependencies.iter().cloned());
        Some(merged)
    }
}

impl fmt::Display for AbstractSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        if let Some(name) = &self.name {
            out.push_str(name);
        }
        for v in &self.versions {
            out.push('@');
            out.push_str(&v.to_string());
        }
        for c in &self.variants {
            let rendered = c.to_string();
            if !rendered.starts_with('+') && !rendered.starts_with('~') {
                out.push(' ');
            }
            out.push_str(&rendered);
        }
        if !self.arch.is_empty() {
            out.push_str(&format!(" arch={}", self.arch));
        }
        for dep in &self.dependencies {
            out.push_str(&format!(" ^{}", dep.spec));
        }
        write!(f, "{}", out.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ver(s: &str) -> VersionConstraint {
        VersionConstraint::parse(s).unwrap()
    }

    #[test]
    fn test_version_range_conflict() {
        let spec = AbstractSpec::named("zlib")
            .with_version(ver("1.0"))
            .with_version(ver("2.0"));
        assert!(spec.version_range().is_none());
    }

    #[test]
    fn test_variant_map_conflict() {
        let spec = AbstractSpec::named("x")
            .with_variant(VariantConstraint::enabled("debug"))
            .with_variant(VariantConstraint::disabled("debug"));
        assert_eq!(spec.variant_map().unwrap_err(), "debug");
    }

    #[test]
    fn test_matches_snapshot() {
        let cond = AbstractSpec::anonymous()
            .with_version(ver(":2.0"))
            .with_variant(VariantConstraint::enabled("debug"));

        let snap = SpecSnapshot::new("pkg")
            .with_version(Version::parse("1.5").unwrap())
            .with_variant("debug", VariantValue::Bool(true));
        assert!(cond.matches(&snap));

        let snap_off = SpecSnapshot::new("pkg")
            .with_version(Version::parse("1.5").unwrap())
            .with_variant("debug", VariantValue::Bool(false));
        assert!(!cond.matches(&snap_off));

        let snap_new = SpecSnapshot::new("pkg")
            .with_version(Version::parse("3.0").unwrap())
            .with_variant("debug", VariantValue::Bool(true));
        assert!(!cond.matches(&snap_new));
    }

    #[test]
    fn test_matches_unset_variant_fails() {
        let cond = AbstractSpec::anonymous().with_variant(VariantConstraint::enabled("debug"));
        let snap = SpecSnapshot::new("pkg").with_version(Version::parse("1.0").unwrap());
        assert!(!cond.matches(&snap));
    }

    #[test]
    fn test_implies_narrower_version() {
        let narrow = AbstractSpec::anonymous()
            .with_version(ver("1.5"))
            .with_variant(VariantConstraint::enabled("debug"));
        let broad = AbstractSpec::anonymous().with_version(ver("1.0:2.0"));
        assert!(narrow.implies(&broad));
        assert!(!broad.implies(&narrow));
    }

    #[test]
    fn test_merged_name_conflict() {
        let a = AbstractSpec::named("a");
        let b = AbstractSpec::named("b");
        assert!(a.merged(&b).is_none());
        assert!(a.merged(&AbstractSpec::anonymous()).is_some());
    }

    #[test]
    fn test_display() {
        let spec = AbstractSpec::named("hdf5")
            .with_version(ver("1.10:1.12"))
            .with_variant(VariantConstraint::enabled("mpi"))
            .with_dependency(DepRequest::on(
                AbstractSpec::named("zlib").with_version(ver("1.2")),
            ));
        assert_eq!(spec.to_string(), "hdf5@1.10:1.12+mpi ^zlib@1.2");
    }
}

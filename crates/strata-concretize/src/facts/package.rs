use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_spec::{
    AbstractSpec, DepTypes, SpecSnapshot, VariantValue, Version, VersionConstraint,
};

/// One declared version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDecl {
    pub version: Version,
    #[serde(default)]
    pub deprecated: bool,
    /// Explicitly marked preferred in the package recipe.
    #[serde(default)]
    pub preferred: bool,
    /// Derived from a git ref rather than a checksummed release.
    #[serde(default)]
    pub git_based: bool,
    #[serde(default)]
    pub sha256: Option<String>,
}

impl VersionDecl {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            deprecated: false,
            preferred: false,
            git_based: false,
            sha256: None,
        }
    }
}

/// The set of values a variant may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantDomain {
    Bool,
    /// Any single string value.
    Any,
    /// Exactly one of the listed values.
    OneOf(Vec<String>),
    /// Any subset of the listed values.
    Subset(Vec<String>),
}

impl VariantDomain {
    pub fn admits(&self, value: &VariantValue) -> bool {
        match (self, value) {
            (VariantDomain::Bool, VariantValue::Bool(_)) => true,
            (VariantDomain::Any, VariantValue::Single(_)) => true,
            (VariantDomain::OneOf(allowed), VariantValue::Single(v)) => allowed.contains(v),
            (VariantDomain::Subset(allowed), VariantValue::Multi(values)) => {
                values.iter().all(|v| allowed.contains(v))
            }
            _ => false,
        }
    }

}

/// One conditional definition of a variant.
///
/// The same variant name may be declared several times under different
/// `when` guards; `precedence` (higher wins) breaks ties among definitions
/// whose guards both apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDef {
    pub name: String,
    #[serde(default)]
    pub when: Option<AbstractSpec>,
    pub default: VariantValue,
    pub domain: VariantDomain,
    #[serde(default)]
    pub precedence: u32,
    #[serde(default)]
    pub description: Option<String>,
}

impl VariantDef {
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            when: None,
            default: VariantValue::Bool(default),
            domain: VariantDomain::Bool,
            precedence: 0,
            description: None,
        }
    }

    pub fn one_of<I, S>(name: impl Into<String>, default: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            when: None,
            default: VariantValue::Single(default.into()),
            domain: VariantDomain::OneOf(values.into_iter().map(Into::into).collect()),
            precedence: 0,
            description: None,
        }
    }

    pub fn when(mut self, condition: AbstractSpec) -> Self {
        self.when = Some(condition);
        self
    }

    pub fn precedence(mut self, precedence: u32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn applies_to(&self, snap: &SpecSnapshot) -> bool {
        match &self.when {
            None => true,
            Some(cond) => cond.matches(snap),
        }
    }
}

/// A conditional dependency declaration: when the declaring package's own
/// resolved attributes satisfy `when`, it depends on `name` constrained by
/// `spec`, with the declared dependency types and provided virtuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyCondition {
    /// Dependency package name, or a virtual capability name.
    pub name: String,
    #[serde(default)]
    pub when: Option<AbstractSpec>,
    #[serde(default)]
    pub spec: AbstractSpec,
    pub deptypes: DepTypes,
    #[serde(default)]
    pub virtuals: BTreeSet<String>,
    #[serde(default)]
    pub precedence: u32,
}

impl DependencyCondition {
    pub fn on(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            when: None,
            spec: AbstractSpec::anonymous(),
            deptypes: DepTypes::DEFAULT,
            virtuals: BTreeSet::new(),
            precedence: 0,
        }
    }

    pub fn when(mut self, condition: AbstractSpec) -> Self {
        self.when = Some(condition);
        self
    }

    pub fn constrained(mut self, spec: AbstractSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn deptypes(mut self, deptypes: DepTypes) -> Self {
        self.deptypes = deptypes;
        self
    }

    pub fn precedence(mut self, precedence: u32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn applies_to(&self, snap: &SpecSnapshot) -> bool {
        match &self.when {
            None => true,
            Some(cond) => cond.matches(snap),
        }
    }
}

/// A declared conflict: a node satisfying `trigger` must not also satisfy
/// `forbidden`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRule {
    pub trigger: AbstractSpec,
    pub forbidden: AbstractSpec,
    #[serde(default)]
    pub message: Option<String>,
}

/// A conditional virtual-provider declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvideWhen {
    pub virtual_name: String,
    #[serde(default)]
    pub when: Option<AbstractSpec>,
    /// Version of the virtual this package provides, when constrained.
    #[serde(default)]
    pub versions: VersionConstraint,
}

/// The full directive table for one package, as loaded from a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageFacts {
    pub name: String,
    pub namespace: String,
    /// Declared versions, newest first.
    pub versions: Vec<VersionDecl>,
    pub variants: Vec<VariantDef>,
    pub dependencies: Vec<DependencyCondition>,
    pub conflicts: Vec<ConflictRule>,
    pub provides: Vec<ProvideWhen>,
}

impl PackageFacts {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "builtin".to_string(),
            versions: Vec::new(),
            variants: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        let decl = VersionDecl::new(Version::parse(version).expect("valid version literal"));
        self.push_version(decl);
        self
    }

    pub fn preferred_version(mut self, version: &str) -> Self {
        let mut decl = VersionDecl::new(Version::parse(version).expect("valid version literal"));
        decl.preferred = true;
        self.push_version(decl);
        self
    }

    pub fn deprecated_version(mut self, version: &str) -> Self {
        let mut decl = VersionDecl::new(Version::parse(version).expect("valid version literal"));
        decl.deprecated = true;
        self.push_version(decl);
        self
    }

    fn push_version(&mut self, decl: VersionDecl) {
        // Keep the list ordered newest first regardless of declaration order.
        let at = self
            .versions
            .iter()
            .position(|v| v.version < decl.version)
            .unwrap_or(self.versions.len());
        self.versions.insert(at, decl);
    }

    pub fn variant(mut self, def: VariantDef) -> Self {
        self.variants.push(def);
        self
    }

    pub fn depends_on(mut self, condition: DependencyCondition) -> Self {
        self.dependencies.push(condition);
        self
    }

    pub fn conflict(mut self, trigger: AbstractSpec, forbidden: AbstractSpec) -> Self {
        self.conflicts.push(ConflictRule {
            trigger,
            forbidden,
            message: None,
        });
        self
    }

    pub fn provides(mut self, virtual_name: impl Into<String>) -> Self {
        self.provides.push(ProvideWhen {
            virtual_name: virtual_name.into(),
            when: None,
            versions: VersionConstraint::Any,
        });
        self
    }

    pub fn provides_when(mut self, virtual_name: impl Into<String>, when: AbstractSpec) -> Self {
        self.provides.push(ProvideWhen {
            virtual_name: virtual_name.into(),
            when: Some(when),
            versions: VersionConstraint::Any,
        });
        self
    }

    /// Candidate versions in solve order: preferred first, then regular
    /// releases newest first, then git-based and infinity versions,
    /// deprecated releases last.
    pub fn version_candidates(&self) -> Vec<&VersionDecl> {
        let unstable =
            |v: &VersionDecl| v.git_based || v.version.is_infinity();
        let mut out: Vec<&VersionDecl> = Vec::with_capacity(self.versions.len());
        out.extend(self.versions.iter().filter(|v| v.preferred && !v.deprecated));
        out.extend(
            self.versions
                .iter()
                .filter(|v| !v.preferred && !v.deprecated && !unstable(v)),
        );
        out.extend(
            self.versions
                .iter()
                .filter(|v| !v.preferred && !v.deprecated && unstable(v)),
        );
        out.extend(self.versions.iter().filter(|v| v.deprecated));
        out
    }

    pub fn find_version(&self, version: &Version) -> Option<&VersionDecl> {
        self.versions.iter().find(|v| &v.version == version)
    }

    /// The single winning definition per variant name applicable to `snap`.
    ///
    /// Among applicable definitions of one name, higher `precedence` wins;
    /// among equal precedence, the later declaration wins.
    pub fn applicable_variants(&self, snap: &SpecSnapshot) -> IndexMap<&str, &VariantDef> {
        let mut winners: IndexMap<&str, &VariantDef> = IndexMap::new();
        for def in &self.variants {
            if !def.applies_to(snap) {
                continue;
            }
            match winners.get(def.name.as_str()) {
                Some(current) if current.precedence > def.precedence => {}
                _ => {
                    winners.insert(def.name.as_str(), def);
                }
            }
        }
        winners
    }

    /// Dependency conditions applicable to `snap`, in declaration order.
    pub fn applicable_dependencies(&self, snap: &SpecSnapshot) -> Vec<&DependencyCondition> {
        self.dependencies
            .iter()
            .filter(|d| d.applies_to(snap))
            .collect()
    }

    /// Whether this package provides `virtual_name` for a node matching
    /// `snap`.
    pub fn provides_virtual(&self, virtual_name: &str, snap: &SpecSnapshot) -> bool {
        self.provides.iter().any(|p| {
            p.virtual_name == virtual_name
                && match &p.when {
                    None => true,
                    Some(cond) => cond.matches(snap),
                }
        })
    }

    /// Virtual names this package can provide under any condition.
    pub fn provided_virtual_names(&self) -> BTreeSet<&str> {
        self.provides.iter().map(|p| p.virtual_name.as_str()).collect()
    }
}

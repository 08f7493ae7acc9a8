use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use strata_spec::{AbstractSpec, ArchSpec};

/// Whether multiple root requests must share one globally consistent set of
/// resolved nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Unify {
    #[default]
    #[serde(rename = "true")]
    True,
    #[serde(rename = "false")]
    False,
    #[serde(rename = "when_possible")]
    WhenPossible,
}

// `unify` is written as `true`, `false`, or `"when_possible"` in config
// files, so it needs a hand-rolled deserializer.
impl<'de> Deserialize<'de> for Unify {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bool(bool),
            Str(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Bool(true) => Ok(Unify::True),
            Repr::Bool(false) => Ok(Unify::False),
            Repr::Str(s) if s == "when_possible" => Ok(Unify::WhenPossible),
            Repr::Str(s) => Err(serde::de::Error::custom(format!(
                "invalid unify setting: {s}"
            ))),
        }
    }
}

/// Kind of a reuse source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Buildcache,
}

/// One entry of `reuse.from`: a source plus include/exclude spec filters
/// (glob patterns over rendered spec strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReuseFrom {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Structured reuse policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReusePolicy {
    /// Restrict reuse to root nodes only, rather than the full transitive
    /// closure.
    #[serde(default)]
    pub roots: bool,
    #[serde(default)]
    pub from: Vec<ReuseFrom>,
}

impl ReusePolicy {
    pub fn all_sources() -> Self {
        ReusePolicy {
            roots: false,
            from: vec![
                ReuseFrom {
                    kind: SourceKind::Local,
                    include: Vec::new(),
                    exclude: Vec::new(),
                },
                ReuseFrom {
                    kind: SourceKind::Buildcache,
                    include: Vec::new(),
                    exclude: Vec::new(),
                },
            ],
        }
    }
}

/// `concretizer.reuse`: a plain boolean or a structured policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReuseSetting {
    Enabled(bool),
    Policy(ReusePolicy),
}

impl Default for ReuseSetting {
    fn default() -> Self {
        ReuseSetting::Enabled(true)
    }
}

impl ReuseSetting {
    pub fn policy(&self) -> Option<ReusePolicy> {
        match self {
            ReuseSetting::Enabled(false) => None,
            ReuseSetting::Enabled(true) => Some(ReusePolicy::all_sources()),
            ReuseSetting::Policy(p) => Some(p.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetGranularity {
    #[default]
    Microarchitecture,
    Generic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub granularity: TargetGranularity,
    #[serde(default = "default_true")]
    pub host_compatible: bool,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            granularity: TargetGranularity::default(),
            host_compatible: true,
        }
    }
}

/// An externally installed package declared in configuration. Candidates
/// claiming to be external must match one of these exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEntry {
    pub spec: AbstractSpec,
    pub prefix: PathBuf,
    #[serde(default)]
    pub modules: Vec<String>,
}

/// Per-package configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSettings {
    /// When false, the package must resolve to an external or reused spec;
    /// a fresh build is a hard solve failure.
    #[serde(default = "default_true")]
    pub buildable: bool,
    #[serde(default)]
    pub externals: Vec<ExternalEntry>,
    /// Hard requirements applied to every node of this package.
    #[serde(default)]
    pub require: Vec<AbstractSpec>,
    /// Soft preferences, in descending priority order.
    #[serde(default)]
    pub prefer: Vec<AbstractSpec>,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            buildable: true,
            externals: Vec::new(),
            require: Vec::new(),
            prefer: Vec::new(),
        }
    }
}

/// The host C library, used to reject incompatible reuse candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibcInfo {
    pub name: String,
    /// Major.minor version string, compared on the major component.
    pub version: String,
}

impl LibcInfo {
    pub fn major(&self) -> &str {
        self.version.split('.').next().unwrap_or(&self.version)
    }

    pub fn compatible_with(&self, other: &LibcInfo) -> bool {
        self.name == other.name && self.major() == other.major()
    }
}

/// Full concretizer configuration, deserializable from the settings layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcretizerConfig {
    #[serde(default)]
    pub unify: Unify,
    #[serde(default)]
    pub reuse: ReuseSetting,
    #[serde(default)]
    pub targets: TargetsConfig,
    /// Require checksummed versions; enables the version-discovery pass.
    #[serde(default)]
    pub checksum: bool,
    #[serde(default)]
    pub packages: IndexMap<String, PackageSettings>,
    /// Preferred providers per virtual, in descending priority order.
    #[serde(default)]
    pub providers: IndexMap<String, Vec<String>>,
    /// The architecture unset spec components concretize to.
    #[serde(default = "default_host_arch")]
    pub host_arch: ArchSpec,
    #[serde(default)]
    pub host_libc: Option<LibcInfo>,
}

fn default_true() -> bool {
    true
}

fn default_host_arch() -> ArchSpec {
    ArchSpec::new("linux", "ubuntu24.04", "x86_64")
}

impl Default for ConcretizerConfig {
    fn default() -> Self {
        Self {
            unify: Unify::default(),
            reuse: ReuseSetting::default(),
            targets: TargetsConfig::default(),
            checksum: false,
            packages: IndexMap::new(),
            providers: IndexMap::new(),
            host_arch: default_host_arch(),
            host_libc: None,
        }
    }
}

impl ConcretizerConfig {
    pub fn package(&self, name: &str) -> Option<&PackageSettings> {
        self.packages.get(name)
    }

    pub fn is_buildable(&self, name: &str) -> bool {
        self.package(name).map(|p| p.buildable).unwrap_or(true)
    }

    pub fn externals_for(&self, name: &str) -> &[ExternalEntry] {
        self.package(name)
            .map(|p| p.externals.as_slice())
            .unwrap_or(&[])
    }

    /// Rank of `provider` in the configured preference list for `virtual_name`.
    /// Unlisted providers rank after all listed ones.
    pub fn provider_rank(&self, virtual_name: &str, provider: &str) -> usize {
        match self.providers.get(virtual_name) {
            Some(order) => order
                .iter()
                .position(|p| p == provider)
                .unwrap_or(order.len()),
            None => usize::MAX,
        }
    }
}

pub mod compile;
pub mod concretizer;
pub mod config;
pub mod discovery;
pub mod error;
pub mod facts;
pub mod graph;
pub mod reuse;
pub mod solve;

pub use compile::{Compiler, ForbiddenEdgeSet, Problem};
pub use concretizer::Concretizer;
pub use config::{
    ConcretizerConfig, ExternalEntry, LibcInfo, PackageSettings, ReuseFrom, ReusePolicy,
    ReuseSetting, SourceKind, TargetGranularity, TargetsConfig, Unify,
};
pub use discovery::{discover_versions, DiscoveryReport, HttpVersionFetcher, VersionFetcher};
pub use error::{ConcretizeError, Result};
pub use facts::{
    ConflictRule, DependencyCondition, FactProvider, MemoryRepository, PackageFacts,
    PackageRepository, ProvideWhen, VariantDef, VariantDomain, VersionDecl,
};
pub use graph::{binding_cycles, reconstruct, ConcreteSpec, GraphEdge, SpecGraph};
pub use reuse::{BuildcacheIndex, LocalStore, ReusableSpec, ReuseSelector, ReuseSource};
pub use solve::{
    solve_in_rounds, Assignment, CostVector, EdgeFact, NodeFact, NodeId, RoundOutcome, SolveCache,
    SolveStats, SolvedRoot, Solver,
};

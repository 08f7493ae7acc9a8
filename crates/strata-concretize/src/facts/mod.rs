//! Package fact tables and the repository-backed fact provider.
//!
//! Directive metadata (versions, variants, dependency conditions, conflicts,
//! provided virtuals) is loaded once per package into a plain `PackageFacts`
//! table. Conditional definitions carry explicit `when` guards and
//! `precedence` fields; nothing depends on declaration-time dynamic
//! behavior.

mod package;
mod provider;

pub use package::{
    ConflictRule, DependencyCondition, PackageFacts, ProvideWhen, VariantDef, VariantDomain,
    VersionDecl,
};
pub use provider::{FactProvider, MemoryRepository, PackageRepository};

//! Spec data model for the strata concretizer.
//!
//! This crate defines the vocabulary shared between the spec parser, the
//! package repositories and the concretization engine: concrete versions and
//! version constraints, variant values, dependency types, architecture
//! triples, and the abstract (possibly incomplete) spec type that user
//! requests and `when` conditions are expressed in.

pub mod abstract_spec;
pub mod arch;
pub mod constraint;
pub mod deptype;
pub mod variant;
pub mod version;

pub use abstract_spec::{AbstractSpec, DepRequest, SpecSnapshot};
pub use arch::ArchSpec;
pub use constraint::VersionConstraint;
pub use deptype::DepTypes;
pub use variant::{VariantConstraint, VariantValue};
pub use version::{Version, VersionError};

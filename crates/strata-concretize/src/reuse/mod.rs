//! Reuse candidate gathering and filtering.
//!
//! Already-concretized specs from the local store or a remote buildcache
//! index can stand in for fresh builds. Sources are read independently,
//! merged deterministically, and run through an ordered filter pipeline
//! before being handed to the solver as low-cost facts.

mod buildcache;
mod selector;

pub use buildcache::BuildcacheIndex;
pub use selector::{LocalStore, ReusableSpec, ReuseSelector, ReuseSource};

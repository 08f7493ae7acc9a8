//! Concrete spec graphs: the engine's output form.
//!
//! A solved assignment is reconstructed into an arena-backed DAG with a
//! separate edge table, validated for totality and binding acyclicity.

mod concrete;
mod cycle;
mod reconstruct;

pub use concrete::{ConcreteSpec, GraphEdge, SpecGraph};
pub use cycle::binding_cycles;
pub use reconstruct::reconstruct;

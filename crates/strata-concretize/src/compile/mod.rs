//! Translation of abstract requests plus configuration into a normalized,
//! solver-ready constraint problem.

mod compiler;
mod problem;

pub use compiler::Compiler;
pub use problem::{ForbiddenEdgeSet, Problem};

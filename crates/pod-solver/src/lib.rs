//! Dependency resolution engine for pod.
//!
//! Given a root manifest and the source registry, the solver picks one
//! concrete version of every transitively-required package so that all
//! constraints hold at once, preferring locked versions and backing up
//! through its decisions when a choice turns out to be unsatisfiable.

mod graph;
mod report;
mod solver;

pub use graph::PackageGraph;
pub use report::{Change, ChangeReport};
pub use solver::{solve, SolveResult};

//! Analyses over the structure of a design used by the traversals and the
//! passes.
mod dependency_graph;

pub use dependency_graph::{DependencyGraph, Feed};

//! Hypergraph input, logical constraints and solution types.

mod constraint;
mod hypergraph;
mod solution;

pub use constraint::LogicalConstraint;
pub use hypergraph::Hypergraph;
pub use solution::{IncumbentTracker, SteinerSolution, SteinerStatus};

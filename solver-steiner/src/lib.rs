//! Constraint pool and branch-and-cut search state for Steiner tree solvers.
//!
//! The crate solves the set-covering phase of an FST-based Steiner tree
//! solver: given a hypergraph whose edges are full Steiner trees (FSTs),
//! select a minimum-cost set of edges that spans the terminals without
//! cycles. It provides:
//!
//! - **Constraint pool**: a deduplicating store of integer rows with
//!   arena-backed coefficients and garbage collection
//! - **LP synchronization**: pending rows are pushed to an [`LpEngine`] in
//!   batches, slack rows are deleted, and the LP is rebuilt when it outgrows
//!   its capacity
//! - **Basis checkpoints**: suspended search nodes keep a positional
//!   snapshot of their LP rows and basis
//! - **Cycle detection**: integral selections are checked with union-find
//!   and rejected with a subtour row when they contain a cycle
//!
//! # Example
//!
//! ```ignore
//! use solver_steiner::{BranchAndCut, DenseDualSimplex, Hypergraph, SearchSettings};
//!
//! let hg = Hypergraph::new(
//!     4,
//!     vec![vec![0, 1], vec![1, 2], vec![2, 3], vec![0, 1, 2]],
//!     vec![1.0, 1.0, 1.0, 3.0],
//! )?;
//! let mut tree = BranchAndCut::new(&hg, SearchSettings::default(), DenseDualSimplex::new())?;
//! let solution = tree.solve()?;
//!
//! println!("Status: {:?}", solution.status);
//! println!("Cost: {}", solution.obj_val);
//! println!("Selected: {:?}", solution.selected);
//! ```

#![warn(clippy::all)]

pub mod cycle;
pub mod error;
pub mod events;
pub mod formulation;
pub mod master;
pub mod model;
pub mod pool;
pub mod row;
pub mod search;
pub mod separation;
pub mod session;
pub mod settings;

// Re-export main types
pub use error::{PoolError, PoolResult};
pub use events::{LogObserver, NullObserver, PoolEvent, PoolObserver};
pub use master::{DenseDualSimplex, LpEngine, LpError};
pub use model::{Hypergraph, LogicalConstraint, SteinerSolution, SteinerStatus};
pub use pool::{ConstraintPool, LpState};
pub use row::{Coef, Row, RowOp};
pub use search::{BranchAndCut, SearchNode};
pub use session::{LpOutcome, LpSession, NodeBasis, PoolStats};
pub use settings::{BudgetSettings, NodeSelection, PoolSettings, SearchSettings};

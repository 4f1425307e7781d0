//! LP engine boundary.
//!
//! The pool talks to its LP engine only through [`LpEngine`]. The crate ships
//! [`DenseDualSimplex`], a self-contained dual simplex suitable for the
//! problem sizes used in tests and small instances.

mod backend;
mod simplex_backend;

pub use backend::{
    BasisStatus, LpBasis, LpEngine, LpError, LpProblem, LpSolution, LpStatus, RowBatch,
};
pub use simplex_backend::DenseDualSimplex;

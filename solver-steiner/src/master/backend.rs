//! LP engine trait and the data exchanged with it.

use sprs::CsMat;
use thiserror::Error;

use crate::row::{Coef, RowOp};

/// Errors raised by an LP engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LpError {
    /// An addition would exceed the engine's allocated capacity.
    #[error("{what} capacity exceeded: {requested} requested, {capacity} available")]
    CapacityExceeded {
        what: &'static str,
        requested: usize,
        capacity: usize,
    },

    /// A row or column index does not exist.
    #[error("{what} index {index} out of range ({len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// Supplied basis does not match the problem dimensions.
    #[error("Basis has {cols} column and {rows} row entries, problem is {ncols} x {nrows}")]
    BasisShape {
        cols: usize,
        rows: usize,
        ncols: usize,
        nrows: usize,
    },

    /// Basis matrix could not be factored.
    #[error("Singular basis")]
    SingularBasis,

    /// Simplex did not terminate within its iteration limit.
    #[error("Iteration limit {0} reached")]
    IterationLimit(usize),

    /// Problem data is inconsistent.
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// No problem has been loaded.
    #[error("No problem loaded")]
    NotLoaded,

    /// No optimal solution is available.
    #[error("No solution available")]
    NoSolution,
}

/// Raw status of an LP solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    /// Optimal solution found.
    Optimal,

    /// No feasible point.
    Infeasible,

    /// Objective unbounded below.
    Unbounded,

    /// Objective limit exceeded before optimality.
    CutOff,

    /// Optimal for the scaled problem, infeasible after unscaling.
    OptimalInfeasible,
}

/// Status of one column or row in a simplex basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisStatus {
    /// In the basis.
    Basic,
    /// Nonbasic at its lower bound.
    AtLower,
    /// Nonbasic at its upper bound.
    AtUpper,
}

/// Column and row statuses of a simplex basis.
///
/// Row statuses refer to each row's logical (activity) variable, so the
/// basis is positional: row `i` of a saved basis describes LP row `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpBasis {
    /// One status per column.
    pub cols: Vec<BasisStatus>,
    /// One status per row.
    pub rows: Vec<BasisStatus>,
}

impl LpBasis {
    /// All columns at their lower bound, every row logical basic.
    pub fn slack(ncols: usize, nrows: usize) -> Self {
        Self {
            cols: vec![BasisStatus::AtLower; ncols],
            rows: vec![BasisStatus::Basic; nrows],
        }
    }

    /// Number of basic entries.
    pub fn num_basic(&self) -> usize {
        self.cols
            .iter()
            .chain(&self.rows)
            .filter(|&&s| s == BasisStatus::Basic)
            .count()
    }

    /// True if the basis has one basic entry per row.
    pub fn is_consistent(&self) -> bool {
        self.num_basic() == self.rows.len()
    }
}

/// Complete LP instance handed to [`LpEngine::load`].
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// Objective coefficients (minimized).
    pub objective: Vec<f64>,

    /// Column lower bounds.
    pub lower: Vec<f64>,

    /// Column upper bounds.
    pub upper: Vec<f64>,

    /// Constraint matrix in CSR form (rows x columns).
    pub matrix: CsMat<f64>,

    /// Relational operator per row.
    pub senses: Vec<RowOp>,

    /// Right-hand side per row.
    pub rhs: Vec<f64>,

    /// Maximum number of rows the engine must be able to hold.
    pub row_capacity: usize,

    /// Maximum number of nonzeros the engine must be able to hold.
    pub nz_capacity: usize,
}

impl LpProblem {
    /// Number of columns.
    pub fn num_cols(&self) -> usize {
        self.objective.len()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.senses.len()
    }

    /// Check dimensions and capacities.
    pub fn validate(&self) -> Result<(), LpError> {
        let n = self.num_cols();
        let m = self.num_rows();
        if self.lower.len() != n || self.upper.len() != n {
            return Err(LpError::InvalidProblem(format!(
                "{} columns but {} lower and {} upper bounds",
                n,
                self.lower.len(),
                self.upper.len()
            )));
        }
        if !self.matrix.is_csr() || self.matrix.rows() != m || self.matrix.cols() != n {
            return Err(LpError::InvalidProblem(format!(
                "matrix is {}x{}, expected CSR {}x{}",
                self.matrix.rows(),
                self.matrix.cols(),
                m,
                n
            )));
        }
        if self.rhs.len() != m {
            return Err(LpError::InvalidProblem(format!(
                "{} rows but {} right-hand sides",
                m,
                self.rhs.len()
            )));
        }
        if m > self.row_capacity {
            return Err(LpError::CapacityExceeded {
                what: "row",
                requested: m,
                capacity: self.row_capacity,
            });
        }
        if self.matrix.nnz() > self.nz_capacity {
            return Err(LpError::CapacityExceeded {
                what: "nonzero",
                requested: self.matrix.nnz(),
                capacity: self.nz_capacity,
            });
        }
        Ok(())
    }
}

/// A batch of rows appended with [`LpEngine::add_rows`].
#[derive(Debug, Clone)]
pub struct RowBatch {
    /// Coefficients in CSR form (batch rows x columns).
    pub matrix: CsMat<f64>,
    /// Relational operator per row.
    pub senses: Vec<RowOp>,
    /// Right-hand side per row.
    pub rhs: Vec<f64>,
}

impl RowBatch {
    /// Build a batch from integer rows whose coefficients are sorted by column.
    pub fn from_rows<'a, I>(ncols: usize, rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a [Coef], RowOp, i64)>,
    {
        let mut indptr = vec![0];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        let mut senses = Vec::new();
        let mut rhs = Vec::new();
        for (coefs, op, b) in rows {
            for c in coefs {
                indices.push(c.var);
                data.push(c.val as f64);
            }
            indptr.push(indices.len());
            senses.push(op);
            rhs.push(b as f64);
        }
        let nrows = senses.len();
        Self {
            matrix: CsMat::new((nrows, ncols), indptr, indices, data),
            senses,
            rhs,
        }
    }

    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.senses.len()
    }

    /// True if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.senses.is_empty()
    }

    /// Number of nonzeros in the batch.
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }
}

/// Primal and dual information of an optimal LP.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    /// Objective value.
    pub objective: f64,

    /// Column values.
    pub x: Vec<f64>,

    /// Column reduced costs.
    pub reduced_costs: Vec<f64>,

    /// Row slacks: `rhs - a.x` for `<=`, `a.x - rhs` for `>=`,
    /// `-|a.x - rhs|` for `=`.
    pub slack: Vec<f64>,
}

/// Operations the constraint pool needs from an LP engine.
///
/// Rows are addressed by position. Deleting rows shifts the later rows
/// down; appended rows go at the end.
pub trait LpEngine {
    /// Replace the current problem.
    fn load(&mut self, prob: &LpProblem) -> Result<(), LpError>;

    /// Append rows. New row logicals enter the basis.
    fn add_rows(&mut self, batch: &RowBatch) -> Result<(), LpError>;

    /// Delete rows by ascending index.
    fn delete_rows(&mut self, rows: &[usize]) -> Result<(), LpError>;

    /// Number of rows.
    fn num_rows(&self) -> usize;

    /// Number of columns.
    fn num_cols(&self) -> usize;

    /// Number of nonzeros in the constraint matrix.
    fn num_nonzeros(&self) -> usize;

    /// Row capacity of the current problem.
    fn row_capacity(&self) -> usize;

    /// Nonzero capacity of the current problem.
    fn nonzero_capacity(&self) -> usize;

    /// Change the bounds of one column.
    fn set_bounds(&mut self, col: usize, lower: f64, upper: f64) -> Result<(), LpError>;

    /// Stop with [`LpStatus::CutOff`] once the objective provably exceeds `limit`.
    fn set_objective_limit(&mut self, limit: Option<f64>);

    /// Enable or disable internal scaling.
    fn set_scaling(&mut self, enabled: bool);

    /// Run the simplex method.
    fn solve(&mut self) -> Result<LpStatus, LpError>;

    /// Solution of the last optimal solve.
    fn solution(&self) -> Result<&LpSolution, LpError>;

    /// Current basis.
    fn basis(&self) -> LpBasis;

    /// Install a basis for the next solve.
    fn set_basis(&mut self, basis: &LpBasis) -> Result<(), LpError>;
}

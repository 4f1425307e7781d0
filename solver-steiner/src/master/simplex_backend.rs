//! Dense bounded dual simplex engine.
//!
//! Each row `i` gets a logical variable `s_i = a_i . x` whose bounds encode
//! the row sense, so the working system is `[A | -I] (x, s) = 0` with every
//! variable boxed. The engine keeps the rows sparse and builds a dense
//! working copy per solve; the basis inverse is updated in product form and
//! refactored periodically. Pricing uses Bland's rule (smallest-index
//! leaving variable, smallest-index entering variable among ratio ties).

use super::backend::{
    BasisStatus, LpBasis, LpEngine, LpError, LpProblem, LpSolution, LpStatus, RowBatch,
};
use crate::row::RowOp;

const PIVOT_TOL: f64 = 1e-9;
const PRIMAL_TOL: f64 = 1e-9;
const DUAL_TOL: f64 = 1e-9;
const REFACTOR_EVERY: usize = 50;

#[derive(Debug, Clone)]
struct EngineRow {
    coefs: Vec<(usize, f64)>,
    sense: RowOp,
    rhs: f64,
}

/// Reference LP engine for small and medium problems.
#[derive(Debug, Clone)]
pub struct DenseDualSimplex {
    objective: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    rows: Vec<EngineRow>,
    nnz: usize,
    row_capacity: usize,
    nz_capacity: usize,
    basis: LpBasis,
    objective_limit: Option<f64>,
    scaling: bool,
    loaded: bool,
    max_iterations: usize,
    solution: Option<LpSolution>,
    iterations: usize,
}

impl Default for DenseDualSimplex {
    fn default() -> Self {
        Self::new()
    }
}

impl DenseDualSimplex {
    /// Create an engine with no problem loaded.
    pub fn new() -> Self {
        Self {
            objective: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            rows: Vec::new(),
            nnz: 0,
            row_capacity: 0,
            nz_capacity: 0,
            basis: LpBasis::slack(0, 0),
            objective_limit: None,
            scaling: true,
            loaded: false,
            max_iterations: 100_000,
            solution: None,
            iterations: 0,
        }
    }

    /// Override the simplex iteration limit.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Whether internal row scaling is enabled.
    pub fn scaling(&self) -> bool {
        self.scaling
    }

    /// Simplex iterations performed by the last solve.
    pub fn last_iterations(&self) -> usize {
        self.iterations
    }

    fn invalidate(&mut self) {
        self.solution = None;
    }

    fn finish(&mut self, work: &Working, status: &[BasisStatus], x: &[f64], d: &[f64]) -> LpStatus {
        let n = work.n;
        self.basis = LpBasis {
            cols: status[..n].to_vec(),
            rows: status[n..].to_vec(),
        };

        let xs: Vec<f64> = x[..n].to_vec();
        let mut slack = Vec::with_capacity(self.rows.len());
        let mut worst: f64 = 0.0;
        for row in &self.rows {
            let act: f64 = row.coefs.iter().map(|&(j, a)| a * xs[j]).sum();
            let s = match row.sense {
                RowOp::Le => row.rhs - act,
                RowOp::Ge => act - row.rhs,
                RowOp::Eq => -(act - row.rhs).abs(),
            };
            worst = worst.min(s);
            slack.push(s);
        }
        let objective = self.objective.iter().zip(&xs).map(|(c, v)| c * v).sum();
        self.solution = Some(LpSolution {
            objective,
            x: xs,
            reduced_costs: d[..n].to_vec(),
            slack,
        });

        if self.scaling && worst < -PRIMAL_TOL {
            log::debug!("scaled optimum violates an unscaled row by {:e}", -worst);
            LpStatus::OptimalInfeasible
        } else {
            LpStatus::Optimal
        }
    }
}

/// Dense working copy of the problem for one solve.
struct Working {
    n: usize,
    m: usize,
    /// Scaled structural matrix, row-major m x n.
    a: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    cost: Vec<f64>,
}

impl Working {
    fn build(engine: &DenseDualSimplex) -> Result<Self, LpError> {
        let n = engine.objective.len();
        let m = engine.rows.len();
        for j in 0..n {
            if !engine.lower[j].is_finite() || !engine.upper[j].is_finite() {
                return Err(LpError::InvalidProblem(format!(
                    "column {} has unbounded range [{}, {}]",
                    j, engine.lower[j], engine.upper[j]
                )));
            }
        }

        let mut a = vec![0.0; m * n];
        let mut lower = Vec::with_capacity(n + m);
        let mut upper = Vec::with_capacity(n + m);
        lower.extend_from_slice(&engine.lower);
        upper.extend_from_slice(&engine.upper);

        for (i, row) in engine.rows.iter().enumerate() {
            let scale = if engine.scaling {
                row_scale(&row.coefs)
            } else {
                1.0
            };
            let mut lo_act = 0.0;
            let mut hi_act = 0.0;
            for &(j, v) in &row.coefs {
                a[i * n + j] += v * scale;
                let (p, q) = (v * engine.lower[j], v * engine.upper[j]);
                lo_act += p.min(q);
                hi_act += p.max(q);
            }
            let (lo, hi) = match row.sense {
                RowOp::Le => (lo_act.min(row.rhs), row.rhs),
                RowOp::Ge => (row.rhs, hi_act.max(row.rhs)),
                RowOp::Eq => (row.rhs, row.rhs),
            };
            lower.push(lo * scale);
            upper.push(hi * scale);
        }

        let mut cost = engine.objective.clone();
        cost.resize(n + m, 0.0);
        Ok(Self {
            n,
            m,
            a,
            lower,
            upper,
            cost,
        })
    }

    /// Entry `k` of column `j` of `[A | -I]`.
    fn entry(&self, k: usize, j: usize) -> f64 {
        if j < self.n {
            self.a[k * self.n + j]
        } else if j - self.n == k {
            -1.0
        } else {
            0.0
        }
    }

    fn column(&self, j: usize, out: &mut [f64]) {
        for (k, o) in out.iter_mut().enumerate() {
            *o = self.entry(k, j);
        }
    }

    fn is_fixed(&self, j: usize) -> bool {
        self.upper[j] - self.lower[j] <= PRIMAL_TOL
    }

    /// Dense inverse of the basis matrix by Gauss-Jordan elimination.
    fn invert(&self, head: &[usize]) -> Option<Vec<f64>> {
        let m = self.m;
        let mut b = vec![0.0; m * m];
        for (c, &j) in head.iter().enumerate() {
            for k in 0..m {
                b[k * m + c] = self.entry(k, j);
            }
        }
        let mut inv = vec![0.0; m * m];
        for k in 0..m {
            inv[k * m + k] = 1.0;
        }

        for col in 0..m {
            let (piv, best) = (col..m)
                .map(|r| (r, b[r * m + col].abs()))
                .fold((col, 0.0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
            if best < PIVOT_TOL {
                return None;
            }
            if piv != col {
                for c in 0..m {
                    b.swap(piv * m + c, col * m + c);
                    inv.swap(piv * m + c, col * m + c);
                }
            }
            let p = b[col * m + col];
            for c in 0..m {
                b[col * m + c] /= p;
                inv[col * m + c] /= p;
            }
            for r in 0..m {
                if r == col {
                    continue;
                }
                let f = b[r * m + col];
                if f == 0.0 {
                    continue;
                }
                for c in 0..m {
                    b[r * m + c] -= f * b[col * m + c];
                    inv[r * m + c] -= f * inv[col * m + c];
                }
            }
        }
        Some(inv)
    }
}

/// Power of two bringing the largest coefficient of a row into [1, 2).
fn row_scale(coefs: &[(usize, f64)]) -> f64 {
    let max = coefs.iter().map(|&(_, v)| v.abs()).fold(0.0, f64::max);
    if max == 0.0 {
        return 1.0;
    }
    let e = max.log2().floor() as i32;
    2f64.powi(-e)
}

fn slack_status(n: usize, m: usize) -> Vec<BasisStatus> {
    let slack = LpBasis::slack(n, m);
    slack.cols.into_iter().chain(slack.rows).collect()
}

fn basis_head(status: &[BasisStatus]) -> Vec<usize> {
    status
        .iter()
        .enumerate()
        .filter(|(_, &s)| s == BasisStatus::Basic)
        .map(|(j, _)| j)
        .collect()
}

impl LpEngine for DenseDualSimplex {
    fn load(&mut self, prob: &LpProblem) -> Result<(), LpError> {
        prob.validate()?;
        self.objective = prob.objective.clone();
        self.lower = prob.lower.clone();
        self.upper = prob.upper.clone();
        self.rows = prob
            .matrix
            .outer_iterator()
            .zip(prob.senses.iter().zip(&prob.rhs))
            .map(|(row, (&sense, &rhs))| EngineRow {
                coefs: row.iter().map(|(j, &v)| (j, v)).collect(),
                sense,
                rhs,
            })
            .collect();
        self.nnz = prob.matrix.nnz();
        self.row_capacity = prob.row_capacity;
        self.nz_capacity = prob.nz_capacity;
        self.basis = LpBasis::slack(prob.num_cols(), prob.num_rows());
        self.loaded = true;
        self.invalidate();
        Ok(())
    }

    fn add_rows(&mut self, batch: &RowBatch) -> Result<(), LpError> {
        if !self.loaded {
            return Err(LpError::NotLoaded);
        }
        if batch.matrix.cols() != self.objective.len() {
            return Err(LpError::InvalidProblem(format!(
                "batch has {} columns, problem has {}",
                batch.matrix.cols(),
                self.objective.len()
            )));
        }
        let rows = self.rows.len() + batch.len();
        if rows > self.row_capacity {
            return Err(LpError::CapacityExceeded {
                what: "row",
                requested: rows,
                capacity: self.row_capacity,
            });
        }
        let nnz = self.nnz + batch.nnz();
        if nnz > self.nz_capacity {
            return Err(LpError::CapacityExceeded {
                what: "nonzero",
                requested: nnz,
                capacity: self.nz_capacity,
            });
        }

        for (row, (&sense, &rhs)) in batch
            .matrix
            .outer_iterator()
            .zip(batch.senses.iter().zip(&batch.rhs))
        {
            self.rows.push(EngineRow {
                coefs: row.iter().map(|(j, &v)| (j, v)).collect(),
                sense,
                rhs,
            });
            self.basis.rows.push(BasisStatus::Basic);
        }
        self.nnz = nnz;
        self.invalidate();
        Ok(())
    }

    fn delete_rows(&mut self, rows: &[usize]) -> Result<(), LpError> {
        if !self.loaded {
            return Err(LpError::NotLoaded);
        }
        let nrows = self.rows.len();
        for (k, &r) in rows.iter().enumerate() {
            if r >= nrows || (k > 0 && rows[k - 1] >= r) {
                return Err(LpError::IndexOutOfRange {
                    what: "row",
                    index: r,
                    len: nrows,
                });
            }
        }

        let mut doomed = vec![false; nrows];
        for &r in rows {
            doomed[r] = true;
        }
        let mut keep = doomed.iter().map(|&d| !d);
        self.rows.retain(|_| keep.next().unwrap_or(true));
        let mut keep = doomed.iter().map(|&d| !d);
        self.basis.rows.retain(|_| keep.next().unwrap_or(true));
        self.nnz = self.rows.iter().map(|r| r.coefs.len()).sum();

        if !self.basis.is_consistent() {
            self.basis = LpBasis::slack(self.objective.len(), self.rows.len());
        }
        self.invalidate();
        Ok(())
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn num_cols(&self) -> usize {
        self.objective.len()
    }

    fn num_nonzeros(&self) -> usize {
        self.nnz
    }

    fn row_capacity(&self) -> usize {
        self.row_capacity
    }

    fn nonzero_capacity(&self) -> usize {
        self.nz_capacity
    }

    fn set_bounds(&mut self, col: usize, lower: f64, upper: f64) -> Result<(), LpError> {
        let n = self.objective.len();
        if col >= n {
            return Err(LpError::IndexOutOfRange {
                what: "column",
                index: col,
                len: n,
            });
        }
        if lower > upper {
            return Err(LpError::InvalidProblem(format!(
                "column {} bounds [{}, {}] are empty",
                col, lower, upper
            )));
        }
        self.lower[col] = lower;
        self.upper[col] = upper;
        self.invalidate();
        Ok(())
    }

    fn set_objective_limit(&mut self, limit: Option<f64>) {
        self.objective_limit = limit;
    }

    fn set_scaling(&mut self, enabled: bool) {
        self.scaling = enabled;
    }

    fn solve(&mut self) -> Result<LpStatus, LpError> {
        if !self.loaded {
            return Err(LpError::NotLoaded);
        }
        self.invalidate();
        self.iterations = 0;

        let work = Working::build(self)?;
        let (n, m) = (work.n, work.m);
        let total = n + m;

        let mut status: Vec<BasisStatus> = self
            .basis
            .cols
            .iter()
            .chain(&self.basis.rows)
            .copied()
            .collect();
        if status.len() != total || !self.basis.is_consistent() {
            status = slack_status(n, m);
        }
        let mut head = basis_head(&status);
        let mut binv = match work.invert(&head) {
            Some(inv) => inv,
            None => {
                log::debug!("supplied basis is singular, starting from the slack basis");
                status = slack_status(n, m);
                head = basis_head(&status);
                work.invert(&head).ok_or(LpError::SingularBasis)?
            }
        };

        let mut col = vec![0.0; m];
        let mut x = vec![0.0; total];
        let mut d = vec![0.0; total];

        for iter in 0..self.max_iterations {
            self.iterations = iter;
            if iter > 0 && iter % REFACTOR_EVERY == 0 {
                binv = work.invert(&head).ok_or(LpError::SingularBasis)?;
            }

            // Duals and reduced costs.
            let y: Vec<f64> = (0..m)
                .map(|k| (0..m).map(|i| work.cost[head[i]] * binv[i * m + k]).sum())
                .collect();
            for j in 0..total {
                d[j] = if status[j] == BasisStatus::Basic {
                    0.0
                } else if j < n {
                    work.cost[j] - (0..m).map(|k| y[k] * work.a[k * n + j]).sum::<f64>()
                } else {
                    y[j - n]
                };
            }

            // Nonbasic columns sit at the bound their reduced cost favours.
            for j in 0..total {
                if work.is_fixed(j) {
                    continue;
                }
                match status[j] {
                    BasisStatus::AtLower if d[j] < -DUAL_TOL => status[j] = BasisStatus::AtUpper,
                    BasisStatus::AtUpper if d[j] > DUAL_TOL => status[j] = BasisStatus::AtLower,
                    _ => {}
                }
            }

            // Primal values: x_B = B^-1 (-N x_N).
            let mut r = vec![0.0; m];
            for j in 0..total {
                x[j] = match status[j] {
                    BasisStatus::Basic => continue,
                    BasisStatus::AtLower => work.lower[j],
                    BasisStatus::AtUpper => work.upper[j],
                };
                if x[j] == 0.0 {
                    continue;
                }
                if j < n {
                    for (k, rk) in r.iter_mut().enumerate() {
                        *rk -= work.a[k * n + j] * x[j];
                    }
                } else {
                    r[j - n] += x[j];
                }
            }
            for i in 0..m {
                x[head[i]] = (0..m).map(|k| binv[i * m + k] * r[k]).sum();
            }

            if let Some(limit) = self.objective_limit {
                let obj: f64 = (0..n).map(|j| work.cost[j] * x[j]).sum();
                if obj > limit + 1e-9 * (1.0 + limit.abs()) {
                    self.basis = LpBasis {
                        cols: status[..n].to_vec(),
                        rows: status[n..].to_vec(),
                    };
                    return Ok(LpStatus::CutOff);
                }
            }

            // Leaving variable: smallest index among infeasible basics.
            let leaving = (0..m)
                .filter(|&i| {
                    let v = head[i];
                    x[v] < work.lower[v] - PRIMAL_TOL || x[v] > work.upper[v] + PRIMAL_TOL
                })
                .min_by_key(|&i| head[i]);
            let Some(r_out) = leaving else {
                return Ok(self.finish(&work, &status, &x, &d));
            };
            let out_var = head[r_out];
            let below = x[out_var] < work.lower[out_var];

            // Ratio test over row r_out of the tableau.
            let mut entering: Option<(f64, usize)> = None;
            for j in 0..total {
                if status[j] == BasisStatus::Basic || work.is_fixed(j) {
                    continue;
                }
                let alpha: f64 = (0..m)
                    .map(|k| binv[r_out * m + k] * work.entry(k, j))
                    .sum();
                if alpha.abs() < PIVOT_TOL {
                    continue;
                }
                let eligible = match (below, status[j]) {
                    (true, BasisStatus::AtLower) | (false, BasisStatus::AtUpper) => alpha < 0.0,
                    (true, BasisStatus::AtUpper) | (false, BasisStatus::AtLower) => alpha > 0.0,
                    _ => false,
                };
                if !eligible {
                    continue;
                }
                let ratio = (d[j] / alpha).abs();
                if entering.map_or(true, |(best, _)| ratio < best - 1e-12) {
                    entering = Some((ratio, j));
                }
            }
            let Some((_, in_var)) = entering else {
                self.basis = LpBasis {
                    cols: status[..n].to_vec(),
                    rows: status[n..].to_vec(),
                };
                return Ok(LpStatus::Infeasible);
            };

            // Product-form update of the inverse.
            work.column(in_var, &mut col);
            let alpha_col: Vec<f64> = (0..m)
                .map(|i| (0..m).map(|k| binv[i * m + k] * col[k]).sum())
                .collect();
            let pivot = alpha_col[r_out];
            if pivot.abs() < PIVOT_TOL {
                return Err(LpError::SingularBasis);
            }
            for c in 0..m {
                binv[r_out * m + c] /= pivot;
            }
            for i in 0..m {
                if i == r_out || alpha_col[i] == 0.0 {
                    continue;
                }
                let f = alpha_col[i];
                for c in 0..m {
                    binv[i * m + c] -= f * binv[r_out * m + c];
                }
            }

            status[in_var] = BasisStatus::Basic;
            status[out_var] = if below {
                BasisStatus::AtLower
            } else {
                BasisStatus::AtUpper
            };
            head[r_out] = in_var;
        }

        Err(LpError::IterationLimit(self.max_iterations))
    }

    fn solution(&self) -> Result<&LpSolution, LpError> {
        self.solution.as_ref().ok_or(LpError::NoSolution)
    }

    fn basis(&self) -> LpBasis {
        self.basis.clone()
    }

    fn set_basis(&mut self, basis: &LpBasis) -> Result<(), LpError> {
        let (ncols, nrows) = (self.objective.len(), self.rows.len());
        if basis.cols.len() != ncols || basis.rows.len() != nrows {
            return Err(LpError::BasisShape {
                cols: basis.cols.len(),
                rows: basis.rows.len(),
                ncols,
                nrows,
            });
        }
        self.basis = basis.clone();
        self.invalidate();
        Ok(())
    }
}

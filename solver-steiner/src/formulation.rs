//! Initial pool contents and LP construction.
//!
//! [`initialize_pool`] seeds the pool with the rows every Steiner LP starts
//! from. [`LpColumns`] describes the LP columns (components, plus one
//! uncovered indicator per terminal in budget mode) and their objective, and
//! [`build_lp_problem`] turns the pool's pending rows into a complete
//! [`LpProblem`].

use sprs::{CsMat, TriMat};

use crate::error::{PoolError, PoolResult};
use crate::master::LpProblem;
use crate::model::Hypergraph;
use crate::pool::ConstraintPool;
use crate::row::{Coef, Row, RowOp};
use crate::settings::{BudgetSettings, PoolSettings};

/// Column layout and objective of the LP.
#[derive(Debug, Clone)]
pub struct LpColumns {
    num_edges: usize,
    /// Terminal vertex of each uncovered-indicator column, in column order.
    uncovered: Vec<usize>,
    objective: Vec<f64>,
    scale: i32,
}

impl LpColumns {
    /// Lay out the columns for `hg`.
    pub fn new(hg: &Hypergraph, settings: &PoolSettings) -> Self {
        let mut objective = hg.costs().to_vec();
        let mut uncovered = Vec::new();
        if let Some(budget) = &settings.budget {
            uncovered = (0..hg.num_verts()).filter(|&v| hg.is_terminal(v)).collect();
            objective.resize(hg.num_edges() + uncovered.len(), budget.uncovered_penalty);
        }

        let scale = if settings.scale_objective && settings.budget.is_none() {
            objective_scale(&objective)
        } else {
            0
        };
        Self {
            num_edges: hg.num_edges(),
            uncovered,
            objective,
            scale,
        }
    }

    /// Total number of LP columns.
    pub fn num_cols(&self) -> usize {
        self.objective.len()
    }

    /// Number of component columns.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Column of the uncovered indicator for the `k`-th terminal.
    pub fn uncovered_col(&self, k: usize) -> usize {
        self.num_edges + k
    }

    /// Terminal vertices that own an uncovered indicator.
    pub fn uncovered_terminals(&self) -> &[usize] {
        &self.uncovered
    }

    /// Unscaled objective.
    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    /// Power-of-two exponent the objective is divided by.
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Objective as loaded into the LP.
    pub fn scaled_objective(&self) -> Vec<f64> {
        self.objective
            .iter()
            .map(|&c| c * 2f64.powi(-self.scale))
            .collect()
    }

    /// Convert an LP objective value or reduced cost back to cost units.
    pub fn unscale(&self, v: f64) -> f64 {
        v * 2f64.powi(self.scale)
    }

    /// Scale a cost-unit value into LP objective units.
    pub fn to_lp_units(&self, v: f64) -> f64 {
        v * 2f64.powi(-self.scale)
    }
}

/// Binary exponent of `x` in the `frexp` convention: `x = m 2^e`, `m` in [0.5, 1).
fn frexp_exponent(x: f64) -> i32 {
    x.abs().log2().floor() as i32 + 1
}

/// Exponent that centres the nonzero objective magnitudes around one.
fn objective_scale(objective: &[f64]) -> i32 {
    let nonzero = objective.iter().map(|c| c.abs()).filter(|&c| c > 0.0);
    let (min_c, max_c) = nonzero.fold((f64::MAX, 0.0f64), |(lo, hi), c| (lo.min(c), hi.max(c)));
    if max_c == 0.0 {
        return 0;
    }
    (frexp_exponent(min_c) + frexp_exponent(max_c)) / 2
}

/// Seed a pool for `hg`.
///
/// Rows added, in order: the total degree row, one cutset row per vertex,
/// the incompatibility rows, the two-vertex subtour rows (when enabled), and
/// the "at least one component" row. In budget mode the degree and cutset
/// rows are replaced by their coverage variants and a budget row is added.
/// Every seeded row is protected from garbage collection.
pub fn initialize_pool(hg: &Hypergraph, settings: &PoolSettings) -> PoolResult<ConstraintPool> {
    let columns = LpColumns::new(hg, settings);
    let mut seeds: Vec<(Row, bool)> = Vec::new();

    match &settings.budget {
        None => {
            seeds.push((degree_row(hg, &[], hg.num_verts()), true));
            for v in 0..hg.num_verts() {
                let coefs = hg.term_trees(v).iter().map(|&e| Coef::new(e, 1)).collect();
                seeds.push((Row::new(coefs, RowOp::Ge, 1), true));
            }
        }
        Some(budget) => coverage_rows(hg, &columns, budget, &mut seeds)?,
    }

    for e in 0..hg.num_edges() {
        for &f in hg.incompatible(e) {
            if f < e {
                seeds.push((Row::from_pairs(&[(f, 1), (e, 1)], RowOp::Le, 1), false));
            }
        }
    }

    if settings.seed_pool_with_2secs {
        two_vertex_subtours(hg, &mut seeds);
    }

    match &settings.budget {
        None => {
            let coefs = (0..hg.num_edges()).map(|e| Coef::new(e, 1)).collect();
            seeds.push((Row::new(coefs, RowOp::Ge, 1), true));
        }
        Some(budget) => {
            if let Some(row) = budget_row(hg, budget) {
                seeds.push((row, true));
            }
        }
    }

    let ncoeff: usize = seeds.iter().map(|(row, _)| row.len()).sum();
    let mut pool = ConstraintPool::new(columns.num_cols(), 6 * ncoeff.max(1));
    let nseeds = seeds.len();
    for (row, load) in seeds {
        pool.add_row(row, load)?;
    }
    pool.freeze_initial_rows();

    log::info!(
        "constraint pool initialized: {} seed rows, {} stored, {} in LP, {} nonzeros",
        nseeds,
        pool.num_rows(),
        pool.num_pending(),
        pool.num_nonzeros()
    );
    pool.log_memory();
    Ok(pool)
}

/// Σ (|e| - 1) x_e (+ Σ uncovered) = count - 1.
fn degree_row(hg: &Hypergraph, extra: &[usize], count: usize) -> Row {
    let mut coefs: Vec<Coef> = (0..hg.num_edges())
        .map(|e| Coef::new(e, hg.edge_size(e) as i64 - 1))
        .collect();
    coefs.extend(extra.iter().map(|&col| Coef::new(col, 1)));
    Row::new(coefs, RowOp::Eq, count as i64 - 1)
}

fn coverage_rows(
    hg: &Hypergraph,
    columns: &LpColumns,
    budget: &BudgetSettings,
    seeds: &mut Vec<(Row, bool)>,
) -> PoolResult<()> {
    if !budget.limit.is_finite() || budget.limit < 0.0 {
        return Err(PoolError::InvalidHypergraph(format!(
            "budget limit {} is not a non-negative number",
            budget.limit
        )));
    }
    let terminals = columns.uncovered_terminals();
    let nc_cols: Vec<usize> = (0..terminals.len()).map(|k| columns.uncovered_col(k)).collect();
    seeds.push((degree_row(hg, &nc_cols, terminals.len()), true));

    for (k, &t) in terminals.iter().enumerate() {
        let nc = nc_cols[k];
        let trees = hg.term_trees(t);
        let n_t = trees.len() as i64;
        for &e in trees {
            seeds.push((Row::from_pairs(&[(e, 1), (nc, 1)], RowOp::Le, 1), true));
        }
        let mut coefs: Vec<Coef> = trees.iter().map(|&e| Coef::new(e, 1)).collect();
        if n_t > 0 {
            coefs.push(Coef::new(nc, n_t));
            seeds.push((Row::new(coefs.clone(), RowOp::Le, n_t), true));
            coefs.pop();
        }
        coefs.push(Coef::new(nc, 1));
        seeds.push((Row::new(coefs, RowOp::Ge, 1), true));
    }

    if let Some(&nc0) = nc_cols.first() {
        seeds.push((Row::from_pairs(&[(nc0, 1)], RowOp::Eq, 0), true));
    }
    Ok(())
}

fn budget_row(hg: &Hypergraph, budget: &BudgetSettings) -> Option<Row> {
    let coefs: Vec<Coef> = (0..hg.num_edges())
        .map(|e| Coef::new(e, (hg.cost(e) * budget.scale).floor() as i64))
        .filter(|c| c.val != 0)
        .collect();
    if coefs.is_empty() {
        return None;
    }
    let rhs = (budget.limit * budget.scale).floor() as i64;
    Some(Row::new(coefs, RowOp::Le, rhs))
}

/// For each vertex pair shared by two or more components:
/// Σ_{e ⊇ {i, j}} x_e <= 1.
fn two_vertex_subtours(hg: &Hypergraph, seeds: &mut Vec<(Row, bool)>) {
    let nverts = hg.num_verts();
    let mut shared: Vec<Vec<usize>> = vec![Vec::new(); nverts];
    let mut touched: Vec<usize> = Vec::new();

    for i in 0..nverts {
        for &e in hg.term_trees(i) {
            for &j in hg.edge(e) {
                if j <= i {
                    continue;
                }
                if shared[j].is_empty() {
                    touched.push(j);
                }
                shared[j].push(e);
            }
        }
        touched.sort_unstable();
        for &j in &touched {
            let edges = std::mem::take(&mut shared[j]);
            if edges.len() >= 2 {
                let coefs = edges.into_iter().map(|e| Coef::new(e, 1)).collect();
                seeds.push((Row::new(coefs, RowOp::Le, 1), false));
            }
        }
        touched.clear();
    }
}

/// Build an LP containing exactly the pool's pending rows.
///
/// The pool must have no loaded rows. Capacities are sized from the whole
/// pool on the first build and from the high-water marks afterwards, never
/// below the configured minimums or the rows being loaded.
pub fn build_lp_problem(
    pool: &mut ConstraintPool,
    columns: &LpColumns,
    settings: &PoolSettings,
) -> PoolResult<LpProblem> {
    if pool.num_loaded() != 0 {
        return Err(PoolError::InvalidRowState {
            op: "build_lp_problem",
            uid: pool.header(pool.loaded_rows()[0])?.uid,
            state: "loaded".into(),
        });
    }

    let ncols = columns.num_cols();
    let pending = pool.pending_rows().to_vec();
    let mut tri = TriMat::new((pending.len(), ncols));
    let mut senses = Vec::with_capacity(pending.len());
    let mut rhs = Vec::with_capacity(pending.len());
    for (i, &slot) in pending.iter().enumerate() {
        let row = pool.row(slot)?;
        for c in row.coefs {
            tri.add_triplet(i, c.var, c.val as f64);
        }
        senses.push(row.header.op);
        rhs.push(row.header.rhs as f64);
    }
    let matrix: CsMat<f64> = tri.to_csr();
    let nnz = matrix.nnz();

    let first_build = pool.high_water_marks() == (0, 0);
    let (mut row_capacity, mut nz_capacity) = if first_build {
        (2 * pool.num_rows(), 4 * pool.num_nonzeros())
    } else {
        pool.record_high_water(pending.len(), nnz);
        let (hwm_rows, hwm_nz) = pool.high_water_marks();
        (5 * hwm_rows / 4, 5 * hwm_nz / 4)
    };
    row_capacity = row_capacity.max(settings.min_lp_rows).max(pending.len());
    nz_capacity = nz_capacity.max(settings.min_lp_nonzeros).max(nnz);
    pool.record_high_water(pending.len(), nnz);

    log::debug!(
        "LP allocation: {} rows, {} cols, {} nz (loading {} rows, {} nz)",
        row_capacity,
        ncols,
        nz_capacity,
        pending.len(),
        nnz
    );

    Ok(LpProblem {
        objective: columns.scaled_objective(),
        lower: vec![0.0; ncols],
        upper: vec![1.0; ncols],
        matrix,
        senses,
        rhs,
        row_capacity,
        nz_capacity,
    })
}

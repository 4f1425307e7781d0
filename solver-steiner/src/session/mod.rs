//! LP session: the pool, the LP engine and the cutting-plane loop.
//!
//! [`LpSession`] owns the constraint pool and an [`LpEngine`] and keeps the
//! two in step. The search driver hands it [`SearchNode`]s to solve,
//! constraints to add and nodes to suspend or resume.

mod basis;
mod sync;

pub use basis::NodeBasis;

use crate::cycle;
use crate::error::{PoolError, PoolResult};
use crate::events::{LogObserver, PoolEvent, PoolObserver};
use crate::formulation::{initialize_pool, LpColumns};
use crate::master::{LpEngine, LpStatus};
use crate::model::{Hypergraph, LogicalConstraint};
use crate::pool::{ConstraintPool, PoolMemory};
use crate::row::Row;
use crate::search::SearchNode;
use crate::separation::scan_pool;
use crate::settings::PoolSettings;

/// Outcome of solving a node's LP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpOutcome {
    /// Optimal, and no pool row is violated.
    Optimal,
    /// The LP has no feasible point.
    Infeasible,
    /// The objective exceeds the cutoff.
    CutOff,
}

/// Final statistics of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Rows in the pool.
    pub rows: usize,
    /// Coefficients in the pool.
    pub nonzeros: usize,
    /// Seed rows.
    pub initial_rows: usize,
    /// Rows added after seeding (uids handed out past the seed rows).
    pub rows_added: u64,
    /// LP rows loaded at the end.
    pub lp_rows: usize,
    /// Pool iterations (LP solves over the pool).
    pub iterations: u64,
    /// Largest LP rows / nonzeros seen.
    pub high_water: (usize, usize),
    /// Arena layout at the end.
    pub memory: PoolMemory,
    /// Full LP rebuilds.
    pub reloads: u64,
    /// Garbage collections that evicted rows.
    pub gc_runs: u64,
    /// Rows evicted by garbage collection.
    pub rows_evicted: usize,
    /// Solves retried with scaling disabled.
    pub scaling_retries: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    reloads: u64,
    gc_runs: u64,
    rows_evicted: usize,
    scaling_retries: u64,
}

/// Constraint pool bound to an LP engine.
pub struct LpSession<'h, E: LpEngine> {
    hg: &'h Hypergraph,
    settings: PoolSettings,
    columns: LpColumns,
    pool: ConstraintPool,
    engine: E,
    lp_loaded: bool,
    fixings: Vec<Option<bool>>,
    cutoff: Option<f64>,
    slack: Vec<f64>,
    last_x: Vec<f64>,
    last_dj: Vec<f64>,
    observer: Box<dyn PoolObserver>,
    counters: Counters,
}

impl<'h, E: LpEngine> LpSession<'h, E> {
    /// Seed the pool for `hg` and load the initial LP into `engine`.
    pub fn new(hg: &'h Hypergraph, settings: PoolSettings, engine: E) -> PoolResult<Self> {
        let pool = initialize_pool(hg, &settings)?;
        let columns = LpColumns::new(hg, &settings);
        let ncols = columns.num_cols();
        let mut session = Self {
            hg,
            settings,
            columns,
            pool,
            engine,
            lp_loaded: false,
            fixings: vec![None; ncols],
            cutoff: None,
            slack: Vec::new(),
            last_x: vec![0.0; ncols],
            last_dj: vec![0.0; ncols],
            observer: Box::new(LogObserver),
            counters: Counters::default(),
        };
        session.engine.set_scaling(true);
        session.reload()?;
        Ok(session)
    }

    /// Replace the event observer.
    pub fn with_observer(mut self, observer: impl PoolObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// The hypergraph.
    pub fn hypergraph(&self) -> &'h Hypergraph {
        self.hg
    }

    /// Pool settings.
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// LP column layout.
    pub fn columns(&self) -> &LpColumns {
        &self.columns
    }

    /// Number of LP columns.
    pub fn num_cols(&self) -> usize {
        self.columns.num_cols()
    }

    /// The constraint pool.
    pub fn pool(&self) -> &ConstraintPool {
        &self.pool
    }

    /// The LP engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Slack of each loaded LP row at the last solve.
    pub fn slack(&self) -> &[f64] {
        &self.slack
    }

    /// Uids of the loaded rows, in LP row order.
    pub fn loaded_uids(&self) -> PoolResult<Vec<u64>> {
        self.pool
            .loaded_rows()
            .iter()
            .map(|&slot| Ok(self.pool.header(slot)?.uid))
            .collect()
    }

    fn emit(&mut self, event: PoolEvent<'_>) {
        self.observer.on_event(&event);
    }

    /// Add constraints found for `node`.
    ///
    /// Rows violated by `node.x` are queued and pushed to the LP. Returns the
    /// number of rows that were both new to the pool and violated.
    pub fn add_constraints(
        &mut self,
        node: &mut SearchNode,
        constraints: &[LogicalConstraint],
    ) -> PoolResult<usize> {
        self.check_columns("node solution", node.x.len())?;
        let mut rows: Vec<Row> = Vec::with_capacity(constraints.len());
        for constraint in constraints {
            if let Some(row) = constraint.expand(self.hg)? {
                let row = row.normalized()?;
                self.pool.check_vars(&row)?;
                rows.push(row);
            }
        }

        let ncoeff: usize = rows.iter().map(Row::len).sum();
        if ncoeff > self.pool.arena_free() {
            self.garbage_collect(ncoeff)?;
        }

        let fuzz = self.settings.fuzz;
        let mut any_violated = false;
        let mut count = 0;
        for row in rows {
            let violated = row.evaluate(&node.x, fuzz).is_violated();
            let outcome = self.pool.add_row(row, violated)?;
            if outcome.is_new() {
                let header = self.pool.header(outcome.slot())?;
                let (uid, len) = (header.uid, header.len());
                self.emit(PoolEvent::RowAdded {
                    uid,
                    len,
                    pending: violated,
                });
                if violated {
                    count += 1;
                }
            }
            any_violated |= violated;
        }

        if any_violated {
            self.prune_pending(node, false)?;
            self.push_pending()?;
        }
        Ok(count)
    }

    /// Solve `node`'s LP, adding violated pool rows until none remain.
    pub fn solve_lp_over_pool(&mut self, node: &mut SearchNode) -> PoolResult<LpOutcome> {
        if node.cpiter == Some(self.pool.next_uid()) {
            // Nothing was added since the last optimal solve.
            self.slack = vec![0.0; self.pool.num_loaded()];
            return Ok(LpOutcome::Optimal);
        }

        let fuzz = self.settings.fuzz;
        let outcome = loop {
            let prev_z = node.z;
            let outcome = self.solve_single_lp(node)?;
            self.pool.bump_iteration();
            if outcome != LpOutcome::Optimal {
                break outcome;
            }

            node.record_lp_solution(&self.last_x, &self.last_dj);
            node.iter += 1;

            self.delete_slack_rows(node)?;

            let scan = scan_pool(&mut self.pool, &self.last_x, fuzz)?;
            log::trace!(
                "node {}: z = {:.6}, {} binding rows, {} newly violated",
                node.id,
                node.z,
                scan.binding,
                scan.newly_pending
            );
            if !scan.any_violations() {
                break outcome;
            }

            let can_del = node.z >= prev_z + self.settings.slack_improvement * prev_z.abs();
            self.prune_pending(node, can_del)?;
            self.push_pending()?;
        };

        node.cpiter = (outcome == LpOutcome::Optimal).then(|| self.pool.next_uid());
        Ok(outcome)
    }

    /// Solve the LP once, without touching the pool.
    ///
    /// Sets `node.z` (infinite when infeasible, the cutoff when cut off). An
    /// optimal solution that turns infeasible after unscaling is retried once
    /// with scaling disabled.
    pub fn solve_single_lp(&mut self, node: &mut SearchNode) -> PoolResult<LpOutcome> {
        let mut retried = false;
        let status = loop {
            match self.engine.solve()? {
                LpStatus::OptimalInfeasible if retried => {
                    return Err(PoolError::Numerical(format!(
                        "node {}: optimal solution infeasible even without scaling",
                        node.id
                    )));
                }
                LpStatus::OptimalInfeasible => {
                    log::warn!(
                        "node {}: optimal LP infeasible after unscaling, retrying without scaling",
                        node.id
                    );
                    retried = true;
                    self.counters.scaling_retries += 1;
                    self.engine.set_scaling(false);
                    self.emit(PoolEvent::ScalingDisabled);
                    self.reload()?;
                }
                status => break status,
            }
        };

        let outcome = match status {
            LpStatus::Optimal => {
                let solution = self.engine.solution()?;
                node.z = self.columns.unscale(solution.objective);
                self.last_x.clone_from(&solution.x);
                self.last_dj.clear();
                self.last_dj.extend(
                    solution
                        .reduced_costs
                        .iter()
                        .map(|&d| self.columns.unscale(d)),
                );
                self.slack.clone_from(&solution.slack);
                LpOutcome::Optimal
            }
            LpStatus::CutOff => {
                node.z = self.cutoff.unwrap_or(f64::INFINITY);
                LpOutcome::CutOff
            }
            LpStatus::Infeasible | LpStatus::Unbounded => {
                node.z = f64::INFINITY;
                LpOutcome::Infeasible
            }
            LpStatus::OptimalInfeasible => {
                return Err(PoolError::Internal(
                    "optimal-infeasible status escaped the retry".into(),
                ))
            }
        };

        if retried {
            self.engine.set_scaling(true);
            self.reload()?;
        }

        log::debug!(
            "node {}: LP {:?}, z = {:.6}, {} rows, {} nz",
            node.id,
            outcome,
            node.z,
            self.engine.num_rows(),
            self.engine.num_nonzeros()
        );
        Ok(outcome)
    }

    /// Check an integral selection for cycles.
    ///
    /// Returns the subtour constraint over the offending vertices, if any.
    pub fn check_integer_solution_for_cycles(
        &mut self,
        x: &[f64],
    ) -> PoolResult<Option<LogicalConstraint>> {
        self.check_columns("integral selection", x.len())?;
        let Some(report) = cycle::find_cycle(self.hg, x) else {
            return Ok(None);
        };
        self.emit(PoolEvent::CycleFound {
            vertices: &report.vertices,
        });
        Ok(Some(report.to_constraint(self.hg.num_verts())))
    }

    fn check_columns(&self, what: &'static str, len: usize) -> PoolResult<()> {
        let expected = self.num_cols();
        if len != expected {
            return Err(PoolError::DimensionMismatch {
                what,
                len,
                expected,
            });
        }
        Ok(())
    }

    /// Fix columns to 0 or 1 (`None` frees the column).
    pub fn set_fixings(&mut self, fixings: &[Option<bool>]) -> PoolResult<()> {
        self.check_columns("fixings", fixings.len())?;
        self.fixings.copy_from_slice(fixings);
        self.apply_fixings()
    }

    fn apply_fixings(&mut self) -> PoolResult<()> {
        for (col, fixed) in self.fixings.iter().enumerate() {
            let (lo, hi) = match fixed {
                None => (0.0, 1.0),
                Some(false) => (0.0, 0.0),
                Some(true) => (1.0, 1.0),
            };
            self.engine.set_bounds(col, lo, hi)?;
        }
        Ok(())
    }

    /// Objective cutoff in cost units.
    pub fn set_cutoff(&mut self, cutoff: Option<f64>) {
        self.cutoff = cutoff;
        self.engine
            .set_objective_limit(cutoff.map(|v| self.columns.to_lp_units(v)));
    }

    /// Evict stale rows so `ncoeff` more coefficients fit.
    pub fn garbage_collect(&mut self, ncoeff: usize) -> PoolResult<()> {
        if let Some(report) = self.pool.garbage_collect(ncoeff, &self.settings)? {
            self.counters.gc_runs += 1;
            self.counters.rows_evicted += report.evicted_rows;
            self.emit(PoolEvent::RowsEvicted {
                count: report.evicted_rows,
                nonzeros: report.evicted_nonzeros,
            });
            self.pool.log_memory();
        }
        Ok(())
    }

    /// Statistics of the session so far.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            rows: self.pool.num_rows(),
            nonzeros: self.pool.num_nonzeros(),
            initial_rows: self.pool.initial_rows(),
            rows_added: self
                .pool
                .next_uid()
                .saturating_sub(self.pool.initial_rows() as u64),
            lp_rows: self.pool.num_loaded(),
            iterations: self.pool.iteration(),
            high_water: self.pool.high_water_marks(),
            memory: self.pool.memory(),
            reloads: self.counters.reloads,
            gc_runs: self.counters.gc_runs,
            rows_evicted: self.counters.rows_evicted,
            scaling_retries: self.counters.scaling_retries,
        }
    }

    /// Tear down the session and report its final statistics.
    pub fn free_pool(self) -> PoolStats {
        let stats = self.stats();
        log::debug!(
            "freeing pool: {} rows, {} nz, {} iterations, {} reloads, {} collections",
            stats.rows,
            stats.nonzeros,
            stats.iterations,
            stats.reloads,
            stats.gc_runs
        );
        stats
    }
}

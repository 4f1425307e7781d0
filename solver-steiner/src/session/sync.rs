//! Keeping the LP engine's rows in step with the pool.

use super::LpSession;
use crate::error::{PoolError, PoolResult};
use crate::events::PoolEvent;
use crate::formulation::build_lp_problem;
use crate::master::{BasisStatus, LpEngine, RowBatch};
use crate::search::SearchNode;
use crate::separation::prune_pending_rows;

impl<E: LpEngine> LpSession<'_, E> {
    pub(super) fn check_in_sync(&self, op: &'static str) -> PoolResult<()> {
        let lp_rows = self.engine.num_rows();
        let pool_rows = self.pool.num_loaded();
        if lp_rows != pool_rows {
            return Err(PoolError::OutOfSync {
                op,
                lp_rows,
                pool_rows,
            });
        }
        Ok(())
    }

    /// Append every pending row to the LP.
    ///
    /// Rebuilds the LP with larger capacities when the rows do not fit.
    /// Returns the number of rows loaded.
    pub fn push_pending(&mut self) -> PoolResult<usize> {
        self.check_in_sync("push_pending")?;
        let pending = self.pool.pending_rows().to_vec();
        if pending.is_empty() {
            return Ok(0);
        }

        let mut ncoeff = 0;
        for &slot in &pending {
            ncoeff += self.pool.header(slot)?.len();
        }
        let rows_after = self.pool.num_loaded() + pending.len();
        let nz_after = self.engine.num_nonzeros() + ncoeff;
        self.pool.record_high_water(rows_after, nz_after);

        if rows_after > self.engine.row_capacity() || nz_after > self.engine.nonzero_capacity() {
            log::debug!(
                "{} rows / {} nz exceed LP capacity {} / {}, reloading",
                rows_after,
                nz_after,
                self.engine.row_capacity(),
                self.engine.nonzero_capacity()
            );
            self.reload()?;
        } else {
            let rows = pending
                .iter()
                .map(|&slot| self.pool.row(slot))
                .collect::<PoolResult<Vec<_>>>()?;
            let batch = RowBatch::from_rows(
                self.columns.num_cols(),
                rows.iter().map(|r| (r.coefs, r.header.op, r.header.rhs)),
            );
            self.engine.add_rows(&batch)?;
            self.pool.commit_pending();
        }

        self.emit(PoolEvent::RowsLoaded {
            count: pending.len(),
            nonzeros: ncoeff,
        });
        Ok(pending.len())
    }

    /// Remove loaded rows that are slack (or flagged for discard) at the last
    /// solve.
    ///
    /// Only runs when `node.z` has improved since the last deletion. Returns
    /// the number of rows removed.
    pub fn delete_slack_rows(&mut self, node: &mut SearchNode) -> PoolResult<usize> {
        if node.z <= node.delrow_z {
            return Ok(0);
        }
        self.check_in_sync("delete_slack_rows")?;

        let fuzz = self.settings.fuzz;
        let slack = &self.slack;
        let removed = self.pool.unload_rows(|i, header| {
            header.discard || slack.get(i).copied().unwrap_or(0.0) > fuzz
        })?;
        if removed.is_empty() {
            return Ok(0);
        }

        self.engine.delete_rows(&removed)?;
        let mut doomed = removed.iter().peekable();
        let mut i = 0;
        self.slack.retain(|_| {
            let gone = doomed.next_if_eq(&&i).is_some();
            i += 1;
            !gone
        });
        node.delrow_z = node.z;

        self.emit(PoolEvent::SlackRowsDeleted {
            count: removed.len(),
        });
        Ok(removed.len())
    }

    /// Rebuild the LP from the pool's loaded and pending rows.
    ///
    /// The current basis carries over, with the logicals of formerly pending
    /// rows entering it. Fixings and the cutoff are reapplied.
    pub(crate) fn reload(&mut self) -> PoolResult<()> {
        let basis = if self.lp_loaded {
            self.check_in_sync("reload")?;
            let mut basis = self.engine.basis();
            basis
                .rows
                .resize(self.pool.num_loaded() + self.pool.num_pending(), BasisStatus::Basic);
            Some(basis)
        } else {
            None
        };

        self.pool.unload_all_as_pending()?;
        let prob = build_lp_problem(&mut self.pool, &self.columns, &self.settings)?;
        self.engine.load(&prob)?;
        self.pool.commit_pending();
        self.lp_loaded = true;

        self.apply_fixings()?;
        if let Some(basis) = basis {
            self.engine.set_basis(&basis)?;
        }
        self.engine
            .set_objective_limit(self.cutoff.map(|v| self.columns.to_lp_units(v)));
        self.slack = vec![0.0; self.pool.num_loaded()];

        self.counters.reloads += 1;
        self.emit(PoolEvent::LpReloaded {
            row_capacity: prob.row_capacity,
            nz_capacity: prob.nz_capacity,
        });
        Ok(())
    }

    /// Defer the largest pending rows when they exceed the prune threshold.
    ///
    /// With `can_delete`, slack rows are removed first to make room.
    pub(crate) fn prune_pending(
        &mut self,
        node: &mut SearchNode,
        can_delete: bool,
    ) -> PoolResult<usize> {
        let threshold = self.settings.prune_threshold;
        let mut total = 0;
        for &slot in self.pool.pending_rows() {
            total += self.pool.header(slot)?.len();
        }
        if total <= threshold {
            return Ok(0);
        }
        if can_delete {
            self.delete_slack_rows(node)?;
        }
        let deferred = prune_pending_rows(&mut self.pool, threshold)?;
        if deferred > 0 {
            log::debug!(
                "deferred {} of the pending rows ({} nz over threshold {})",
                deferred,
                total,
                threshold
            );
        }
        Ok(deferred)
    }
}

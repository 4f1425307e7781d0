//! Violation scanning and pending-row pruning.

use crate::error::{PoolError, PoolResult};
use crate::pool::{ConstraintPool, LpState};

/// Result of a pool scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSummary {
    /// Rows that were idle, violated and are now pending.
    pub newly_pending: usize,
    /// Rows found binding or violated (stamped with the current iteration).
    pub binding: usize,
}

impl ScanSummary {
    /// True if the scan queued any row.
    pub fn any_violations(&self) -> bool {
        self.newly_pending > 0
    }
}

/// Scan every pool row against `x`.
///
/// Rows within `fuzz` of binding (or violated) get their last-binding
/// iteration refreshed. Violated rows not already in the LP are queued.
pub fn scan_pool(pool: &mut ConstraintPool, x: &[f64], fuzz: f64) -> PoolResult<ScanSummary> {
    let mut summary = ScanSummary::default();
    let mut binding: Vec<(usize, bool)> = Vec::new();

    for (slot, row) in pool.iter().enumerate() {
        let slack = row.slack(x);
        if slack > fuzz {
            continue;
        }
        let queue = row.header.state == LpState::Idle && slack < -fuzz;
        binding.push((slot, queue));
    }

    summary.binding = binding.len();
    for (slot, queue) in binding {
        pool.set_biter(slot);
        if queue {
            pool.mark_pending(slot)?;
            summary.newly_pending += 1;
        }
    }
    Ok(summary)
}

/// Defer the largest pending rows when the pending set is too dense.
///
/// If the pending rows hold more than `threshold` coefficients, they are
/// sorted by length and only the shortest prefix that stays within the
/// threshold remains pending. The rest go back to idle and will be found
/// again by a later scan. Returns the number of deferred rows.
pub fn prune_pending_rows(pool: &mut ConstraintPool, threshold: usize) -> PoolResult<usize> {
    let pending_len = |pool: &ConstraintPool, slot: usize| -> PoolResult<usize> {
        Ok(pool.header(slot)?.len())
    };

    let mut total = 0;
    for &slot in pool.pending_rows() {
        total += pending_len(pool, slot)?;
        if total > threshold {
            break;
        }
    }
    if total <= threshold {
        return Ok(0);
    }

    let nlprows = pool.num_loaded();
    let mut pending: Vec<(usize, usize)> = Vec::with_capacity(pool.num_pending());
    for &slot in pool.pending_rows() {
        pending.push((pending_len(pool, slot)?, slot));
    }
    pending.sort_by_key(|&(len, _)| len);

    let mut keep = 0;
    let mut total = 0;
    for &(len, _) in &pending {
        total += len;
        if total > threshold {
            break;
        }
        keep += 1;
    }

    for &(_, slot) in &pending[keep..] {
        let header = pool.header_mut(slot);
        if header.state != LpState::Pending {
            return Err(PoolError::InvalidRowState {
                op: "prune_pending_rows",
                uid: header.uid,
                state: header.state.to_string(),
            });
        }
        header.state = LpState::Idle;
    }

    let lprows = pool.lprows_mut();
    lprows.truncate(nlprows);
    lprows.extend(pending[..keep].iter().map(|&(_, slot)| slot));

    let deferred = pending.len() - keep;
    log::debug!("deferred {} dense pending rows, kept {}", deferred, keep);
    Ok(deferred)
}

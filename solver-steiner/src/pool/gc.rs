//! Garbage collection of stale pool rows.

use super::{ConstraintPool, LpState};
use crate::error::{PoolError, PoolResult};
use crate::settings::PoolSettings;

/// Outcome of a collection that evicted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcReport {
    /// Pool size target in coefficients.
    pub target: usize,
    /// Coefficients the collection had to recover.
    pub min_recover: usize,
    /// Rows evicted.
    pub evicted_rows: usize,
    /// Coefficients evicted.
    pub evicted_nonzeros: usize,
    /// Coefficients left in the pool.
    pub nonzeros_after: usize,
}

impl ConstraintPool {
    /// Evict stale rows before `ncoeff` more coefficients are inserted.
    ///
    /// Rows that are loaded, pending, referenced by a suspended node or part
    /// of the seed formulation are never evicted. Returns `None` when nothing
    /// needed to (or could) be evicted.
    pub fn garbage_collect(
        &mut self,
        ncoeff: usize,
        settings: &PoolSettings,
    ) -> PoolResult<Option<GcReport>> {
        let npend = self.num_pending();
        if npend > 0 {
            return Err(PoolError::PendingRowsPresent(npend));
        }

        // Coefficients in use by the LP or by some suspended node.
        let in_use: usize = self
            .rows
            .iter()
            .filter(|h| h.state != LpState::Idle || h.refc > 0)
            .map(|h| h.len() + 1)
            .sum();

        let mut candidates: Vec<(usize, u64)> = Vec::new();
        for slot in self.initial_rows..self.rows.len() {
            let h = &self.rows[slot];
            if h.state != LpState::Idle || h.refc > 0 {
                continue;
            }
            if h.discard {
                candidates.push((slot, u64::MAX));
                continue;
            }
            let time = self.iteration.saturating_sub(h.biter);
            if time < settings.gc_grace_iterations {
                continue;
            }
            candidates.push((slot, (h.len() as u64 + 1) * time));
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        let target = if settings.target_pool_nonzeros > 0 {
            settings.target_pool_nonzeros
        } else {
            16 * in_use
        };
        let impending = self.num_nz + ncoeff;
        if impending <= target {
            return Ok(None);
        }
        let min_recover = (3 * ncoeff / 2).max(impending - target);

        candidates.sort_by_key(|&(_, cost)| cost);

        let mut doomed = vec![false; self.rows.len()];
        let mut recovered = 0;
        let mut evicted = 0;
        for &(slot, _) in candidates.iter().rev() {
            doomed[slot] = true;
            recovered += self.rows[slot].len();
            evicted += 1;
            if recovered >= min_recover {
                break;
            }
        }

        self.remove_rows(&doomed)?;
        self.num_nz -= recovered;

        let report = GcReport {
            target,
            min_recover,
            evicted_rows: evicted,
            evicted_nonzeros: recovered,
            nonzeros_after: self.num_nz,
        };
        log::debug!(
            "garbage collection evicted {} rows ({} nz), target {}, {} nz left",
            evicted,
            recovered,
            target,
            self.num_nz
        );

        #[cfg(debug_assertions)]
        self.verify()?;

        Ok(Some(report))
    }

    /// Drop the flagged rows, renumber the survivors and compact the arena.
    fn remove_rows(&mut self, doomed: &[bool]) -> PoolResult<()> {
        let mut renum = vec![usize::MAX; self.rows.len()];
        let mut next = 0;
        for (slot, &gone) in doomed.iter().enumerate() {
            if !gone {
                renum[slot] = next;
                next += 1;
            }
        }

        for slot in self.lprows.iter_mut() {
            let new = renum[*slot];
            if new == usize::MAX {
                return Err(PoolError::Internal(format!(
                    "garbage collection would evict LP row at slot {}",
                    slot
                )));
            }
            *slot = new;
        }

        self.index.retain(|_, bucket| {
            bucket.retain_mut(|slot| {
                let new = renum[*slot];
                *slot = new;
                new != usize::MAX
            });
            !bucket.is_empty()
        });

        let mut slot = 0;
        self.rows.retain(|_| {
            let keep = !doomed[slot];
            slot += 1;
            keep
        });

        self.arena.compact(self.rows.iter_mut().map(|h| &mut h.span))?;
        Ok(())
    }
}

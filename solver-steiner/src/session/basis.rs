//! Saving and restoring the LP of a suspended node.
//!
//! A simplex basis is positional, so a snapshot records which pool row sat
//! at each LP row index. Restoring rebuilds the LP rows in exactly that
//! order before reinstalling the basis. Rows named by a snapshot are
//! reference counted so garbage collection cannot evict them meanwhile.

use super::LpSession;
use crate::error::{PoolError, PoolResult};
use crate::events::PoolEvent;
use crate::master::{LpBasis, LpEngine};
use crate::pool::LpState;
use crate::search::SearchNode;

/// LP rows and basis of a suspended node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBasis {
    /// `(uid, LP row index)` of every row loaded at save time.
    rows: Vec<(u64, usize)>,
    basis: LpBasis,
}

impl NodeBasis {
    /// Number of LP rows recorded.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Uids of the recorded rows, in slot order.
    pub fn uids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.iter().map(|&(uid, _)| uid)
    }

    /// The saved simplex basis.
    pub fn lp_basis(&self) -> &LpBasis {
        &self.basis
    }
}

impl<E: LpEngine> LpSession<'_, E> {
    /// Snapshot the current LP rows and basis into `node`.
    pub fn save_node_basis(&mut self, node: &mut SearchNode) -> PoolResult<()> {
        if node.basis.is_some() {
            return Err(PoolError::SnapshotExists(node.id));
        }
        self.check_in_sync("save_node_basis")?;

        let basis = self.engine.basis();
        let nloaded = self.pool.num_loaded();
        let mut rows = Vec::with_capacity(nloaded);
        for slot in 0..self.pool.num_rows() {
            let header = self.pool.header_mut(slot);
            if let LpState::Loaded(k) = header.state {
                header.refc += 1;
                rows.push((header.uid, k));
            }
        }
        if rows.len() != nloaded {
            return Err(PoolError::Internal(format!(
                "save_node_basis found {} loaded rows, pool records {}",
                rows.len(),
                nloaded
            )));
        }

        log::trace!("node {}: saved basis over {} rows", node.id, rows.len());
        node.basis = Some(NodeBasis { rows, basis });
        Ok(())
    }

    /// Reinstate the LP rows and basis saved in `node`.
    ///
    /// Every currently loaded row is removed first. No rows may be pending.
    pub fn restore_node_basis(&mut self, node: &mut SearchNode) -> PoolResult<()> {
        let Some(snapshot) = node.basis.take() else {
            return Err(PoolError::SnapshotMissing(node.id));
        };
        let npending = self.pool.num_pending();
        if npending > 0 {
            return Err(PoolError::BasisMismatch(format!(
                "{} rows pending when restoring node {}",
                npending, node.id
            )));
        }
        self.check_in_sync("restore_node_basis")?;

        let all = self.pool.unload_rows(|_, _| true)?;
        if !all.is_empty() {
            self.engine.delete_rows(&all)?;
        }

        let n = snapshot.rows.len();
        let mut placed: Vec<Option<usize>> = vec![None; n];
        for &(uid, k) in &snapshot.rows {
            let slot = self.pool.find_uid(uid).ok_or(PoolError::MissingRow(uid))?;
            let header = self.pool.header_mut(slot);
            if header.state != LpState::Idle {
                return Err(PoolError::InvalidRowState {
                    op: "restore_node_basis",
                    uid,
                    state: header.state.to_string(),
                });
            }
            header.refc = header.refc.checked_sub(1).ok_or_else(|| {
                PoolError::BasisMismatch(format!("row uid {} is not referenced", uid))
            })?;
            match placed.get_mut(k) {
                Some(entry @ None) => *entry = Some(slot),
                _ => {
                    return Err(PoolError::BasisMismatch(format!(
                        "row uid {} at LP index {} of {}",
                        uid, k, n
                    )))
                }
            }
        }
        for slot in placed.into_iter().flatten() {
            self.pool.mark_pending(slot)?;
        }
        if self.pool.num_pending() != n {
            return Err(PoolError::BasisMismatch(format!(
                "{} of {} saved rows could be queued",
                self.pool.num_pending(),
                n
            )));
        }

        self.push_pending()?;
        self.engine.set_basis(&snapshot.basis)?;
        self.slack = vec![0.0; n];

        self.emit(PoolEvent::BasisRestored {
            node: node.id,
            rows: n,
        });
        Ok(())
    }

    /// Drop the snapshot in `node`, releasing its row references.
    pub fn destroy_node_basis(&mut self, node: &mut SearchNode) -> PoolResult<()> {
        let Some(snapshot) = node.basis.take() else {
            return Ok(());
        };
        for uid in snapshot.uids() {
            let slot = self.pool.find_uid(uid).ok_or(PoolError::MissingRow(uid))?;
            let header = self.pool.header_mut(slot);
            header.refc = header.refc.checked_sub(1).ok_or_else(|| {
                PoolError::BasisMismatch(format!("row uid {} is not referenced", uid))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::DenseDualSimplex;
    use crate::model::{Hypergraph, LogicalConstraint};
    use crate::session::LpOutcome;
    use crate::settings::PoolSettings;

    fn wheel() -> Hypergraph {
        // Hub 0 with rim 1..=5; spokes cost 2, rim edges cost 1.
        let mut edges = Vec::new();
        let mut costs = Vec::new();
        for v in 1..=5 {
            edges.push(vec![0, v]);
            costs.push(2.0);
            edges.push(vec![v, v % 5 + 1]);
            costs.push(1.0);
        }
        Hypergraph::new(6, edges, costs).unwrap()
    }

    fn solved_session(hg: &Hypergraph) -> (LpSession<'_, DenseDualSimplex>, SearchNode) {
        let mut session =
            LpSession::new(hg, PoolSettings::default(), DenseDualSimplex::new()).unwrap();
        let mut node = SearchNode::root(session.num_cols());
        assert_eq!(session.solve_lp_over_pool(&mut node).unwrap(), LpOutcome::Optimal);
        (session, node)
    }

    #[test]
    fn test_save_restore_round_trip() {
        let hg = wheel();
        let (mut session, mut node) = solved_session(&hg);
        let uids = session.loaded_uids().unwrap();
        let basis = session.engine().basis();

        session.save_node_basis(&mut node).unwrap();
        for &uid in &uids {
            let slot = session.pool().find_uid(uid).unwrap();
            assert_eq!(session.pool().header(slot).unwrap().refc, 1);
        }
        assert!(matches!(
            session.save_node_basis(&mut node),
            Err(PoolError::SnapshotExists(0))
        ));

        // Disturb the LP: add a cut, then resume the saved node.
        let mut other = SearchNode::root(session.num_cols());
        other.x = vec![0.0; session.num_cols()];
        let cut = LogicalConstraint::cutset(&[0, 1, 2], 6);
        session.add_constraints(&mut other, &[cut]).unwrap();
        assert_ne!(session.loaded_uids().unwrap(), uids);

        session.restore_node_basis(&mut node).unwrap();
        assert!(node.basis.is_none());
        assert_eq!(session.loaded_uids().unwrap(), uids);
        assert_eq!(session.engine().basis(), basis);
        for &uid in &uids {
            let slot = session.pool().find_uid(uid).unwrap();
            assert_eq!(session.pool().header(slot).unwrap().refc, 0);
        }

        // Re-solving from the restored basis takes no pivots.
        node.cpiter = None;
        let z = node.z;
        assert_eq!(session.solve_lp_over_pool(&mut node).unwrap(), LpOutcome::Optimal);
        assert!((node.z - z).abs() < 1e-9);
        session.pool().verify().unwrap();
    }

    #[test]
    fn test_restore_after_rows_were_unloaded() {
        let hg = wheel();
        let (mut session, mut node) = solved_session(&hg);
        let uids = session.loaded_uids().unwrap();
        let basis = session.engine().basis();
        session.save_node_basis(&mut node).unwrap();

        // Another node drops a saved row from the LP.
        let last = *session.pool().loaded_rows().last().unwrap();
        let victim = session.pool().header(last).unwrap().uid;
        session.pool.set_discard(last).unwrap();
        let mut other = SearchNode::root(session.num_cols());
        other.z = node.z;
        other.delrow_z = f64::NEG_INFINITY;
        assert!(session.delete_slack_rows(&mut other).unwrap() >= 1);
        assert!(!session.loaded_uids().unwrap().contains(&victim));
        let slot = session.pool().find_uid(victim).unwrap();
        let header = session.pool().header(slot).unwrap();
        assert_eq!(header.state, LpState::Idle);
        assert_eq!(header.refc, 1);

        session.restore_node_basis(&mut node).unwrap();
        assert_eq!(session.loaded_uids().unwrap(), uids);
        assert_eq!(session.engine().basis(), basis);
        assert!(session.pool().iter().all(|r| r.header.refc == 0));
        session.pool().verify().unwrap();
    }

    #[test]
    fn test_restore_without_snapshot_fails() {
        let hg = wheel();
        let (mut session, mut node) = solved_session(&hg);
        assert!(matches!(
            session.restore_node_basis(&mut node),
            Err(PoolError::SnapshotMissing(0))
        ));
    }

    #[test]
    fn test_destroy_releases_references() {
        let hg = wheel();
        let (mut session, mut node) = solved_session(&hg);
        session.save_node_basis(&mut node).unwrap();
        session.destroy_node_basis(&mut node).unwrap();
        assert!(node.basis.is_none());
        assert!(session.pool().iter().all(|r| r.header.refc == 0));

        // Destroying twice is harmless.
        session.destroy_node_basis(&mut node).unwrap();
    }

    #[test]
    fn test_restore_detects_missing_row() {
        let hg = wheel();
        let (mut session, mut node) = solved_session(&hg);
        session.save_node_basis(&mut node).unwrap();
        if let Some(snapshot) = node.basis.as_mut() {
            snapshot.rows[0].0 = u64::MAX;
        }
        assert!(matches!(
            session.restore_node_basis(&mut node),
            Err(PoolError::MissingRow(u64::MAX))
        ));
    }
}

//! Basis snapshots of suspended nodes and recovery from numerical trouble.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use solver_steiner::master::{
    LpBasis, LpError, LpProblem, LpSolution, LpStatus, RowBatch,
};
use solver_steiner::search::BoundChange;
use solver_steiner::{
    BranchAndCut, DenseDualSimplex, Hypergraph, LogicalConstraint, LpEngine, LpOutcome,
    LpSession, PoolError, PoolEvent, PoolObserver, PoolSettings, SearchNode, SearchSettings,
    SteinerStatus,
};

fn ring(n: usize) -> Hypergraph {
    let edges = (0..n).map(|v| vec![v, (v + 1) % n]).collect();
    Hypergraph::new(n, edges, vec![1.0; n]).unwrap()
}

fn path_with_shortcut() -> Hypergraph {
    Hypergraph::new(
        4,
        vec![vec![0, 1], vec![1, 2], vec![2, 3], vec![0, 1, 2]],
        vec![1.0, 1.0, 1.0, 3.0],
    )
    .unwrap()
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<String>>>);

impl PoolObserver for Recorder {
    fn on_event(&mut self, event: &PoolEvent<'_>) {
        self.0.borrow_mut().push(event.to_string());
    }
}

/// Reports an optimal-but-infeasible status for the first `failures` solves
/// while scaling is enabled.
struct FlakyEngine {
    inner: DenseDualSimplex,
    failures: usize,
    scaling: bool,
}

impl FlakyEngine {
    fn new(failures: usize) -> Self {
        Self {
            inner: DenseDualSimplex::new(),
            failures,
            scaling: true,
        }
    }
}

impl LpEngine for FlakyEngine {
    fn load(&mut self, prob: &LpProblem) -> Result<(), LpError> {
        self.inner.load(prob)
    }

    fn add_rows(&mut self, batch: &RowBatch) -> Result<(), LpError> {
        self.inner.add_rows(batch)
    }

    fn delete_rows(&mut self, rows: &[usize]) -> Result<(), LpError> {
        self.inner.delete_rows(rows)
    }

    fn num_rows(&self) -> usize {
        self.inner.num_rows()
    }

    fn num_cols(&self) -> usize {
        self.inner.num_cols()
    }

    fn num_nonzeros(&self) -> usize {
        self.inner.num_nonzeros()
    }

    fn row_capacity(&self) -> usize {
        self.inner.row_capacity()
    }

    fn nonzero_capacity(&self) -> usize {
        self.inner.nonzero_capacity()
    }

    fn set_bounds(&mut self, col: usize, lower: f64, upper: f64) -> Result<(), LpError> {
        self.inner.set_bounds(col, lower, upper)
    }

    fn set_objective_limit(&mut self, limit: Option<f64>) {
        self.inner.set_objective_limit(limit)
    }

    fn set_scaling(&mut self, enabled: bool) {
        self.scaling = enabled;
        self.inner.set_scaling(enabled)
    }

    fn solve(&mut self) -> Result<LpStatus, LpError> {
        let status = self.inner.solve()?;
        if status == LpStatus::Optimal && self.failures > 0 {
            self.failures -= 1;
            return Ok(LpStatus::OptimalInfeasible);
        }
        Ok(status)
    }

    fn solution(&self) -> Result<&LpSolution, LpError> {
        self.inner.solution()
    }

    fn basis(&self) -> LpBasis {
        self.inner.basis()
    }

    fn set_basis(&mut self, basis: &LpBasis) -> Result<(), LpError> {
        self.inner.set_basis(basis)
    }
}

#[test]
fn test_optimal_infeasible_is_retried_without_scaling() {
    let hg = path_with_shortcut();
    let recorder = Recorder::default();
    let events = recorder.0.clone();
    let mut session = LpSession::new(&hg, PoolSettings::default(), FlakyEngine::new(1))
        .unwrap()
        .with_observer(recorder);
    let mut node = SearchNode::root(session.num_cols());

    let outcome = session.solve_lp_over_pool(&mut node).unwrap();
    assert_eq!(outcome, LpOutcome::Optimal);
    assert!((node.z - 3.0).abs() < 1e-9);

    let stats = session.stats();
    assert_eq!(stats.scaling_retries, 1);
    // Initial load, the retry and the restore.
    assert_eq!(stats.reloads, 3);
    assert!(session.engine().scaling, "scaling must be re-enabled");
    assert!(events
        .borrow()
        .iter()
        .any(|e| e == "objective scaling disabled"));
}

#[test]
fn test_repeated_optimal_infeasible_is_an_error() {
    let hg = path_with_shortcut();
    let mut session =
        LpSession::new(&hg, PoolSettings::default(), FlakyEngine::new(2)).unwrap();
    let mut node = SearchNode::root(session.num_cols());

    let err = session.solve_lp_over_pool(&mut node).unwrap_err();
    assert!(matches!(err, PoolError::Numerical(_)), "got {:?}", err);
}

#[test]
fn test_search_survives_a_scaling_retry() {
    let hg = path_with_shortcut();
    let mut tree = BranchAndCut::new(&hg, SearchSettings::default(), FlakyEngine::new(1)).unwrap();
    let sol = tree.solve().unwrap();
    assert_eq!(sol.status, SteinerStatus::Optimal);
    assert!((sol.obj_val - 3.0).abs() < 1e-9);
}

#[test]
fn test_snapshot_survives_garbage_collection() {
    let hg = ring(6);
    let mut settings = PoolSettings::default()
        .with_2secs(false)
        .with_target_pool_nonzeros(1);
    settings.gc_grace_iterations = 0;
    let mut session = LpSession::new(&hg, settings, DenseDualSimplex::new()).unwrap();
    let ncols = session.num_cols();
    let mut root = SearchNode::root(ncols);

    // Cutsets around short arcs, all violated at x = 0.
    let cuts: Vec<LogicalConstraint> = (2..4)
        .flat_map(|len| {
            (0..6).map(move |k| {
                let arc: Vec<usize> = (0..len).map(|i| (k + i) % 6).collect();
                LogicalConstraint::cutset(&arc, 6)
            })
        })
        .collect();
    assert!(session.add_constraints(&mut root, &cuts).unwrap() > 0);
    assert_eq!(session.solve_lp_over_pool(&mut root).unwrap(), LpOutcome::Optimal);
    assert!((root.z - 5.0).abs() < 1e-9);

    let mut child = root.child(1, BoundChange::down_branch(0));
    session.save_node_basis(&mut child).unwrap();
    let saved: HashSet<u64> = child.basis.as_ref().unwrap().uids().collect();
    assert_eq!(saved.len(), session.pool().num_loaded());

    // Pad the pool with random rows, then collect.
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut extra = Vec::new();
    for _ in 0..40 {
        let size = rng.gen_range(2..=4);
        let mut verts: Vec<usize> = Vec::new();
        while verts.len() < size {
            let v = rng.gen_range(0..6);
            if !verts.contains(&v) {
                verts.push(v);
            }
        }
        extra.push(LogicalConstraint::subtour(&verts, 6));
    }
    session.add_constraints(&mut root, &extra).unwrap();
    let before = session.pool().num_rows();
    session.garbage_collect(64).unwrap();
    assert!(session.pool().num_rows() < before);
    assert!(session.stats().rows_evicted > 0);
    session.pool().verify().unwrap();
    for &uid in &saved {
        assert!(
            session.pool().find_uid(uid).is_some(),
            "row {} of a snapshot was evicted",
            uid
        );
    }

    session.set_fixings(&child.fixing_vector(ncols)).unwrap();
    session.restore_node_basis(&mut child).unwrap();
    assert!(child.basis.is_none());
    let restored: HashSet<u64> = session.loaded_uids().unwrap().into_iter().collect();
    assert_eq!(restored, saved);
    assert!(session.pool().iter().all(|r| r.header.refc == 0));

    assert_eq!(session.solve_lp_over_pool(&mut child).unwrap(), LpOutcome::Optimal);
    assert!((child.z - 5.0).abs() < 1e-9);
    assert!(child.x[0].abs() < 1e-9);
}

#[test]
fn test_restore_in_sibling_order() {
    let hg = ring(5);
    let mut session =
        LpSession::new(&hg, PoolSettings::default(), DenseDualSimplex::new()).unwrap();
    let ncols = session.num_cols();
    let mut root = SearchNode::root(ncols);
    session.solve_lp_over_pool(&mut root).unwrap();

    let mut down = root.child(1, BoundChange::down_branch(2));
    let mut up = root.child(2, BoundChange::up_branch(2));
    session.save_node_basis(&mut down).unwrap();
    session.save_node_basis(&mut up).unwrap();
    assert!(session.pool().iter().any(|r| r.header.refc == 2));

    for node in [&mut up, &mut down] {
        session.set_fixings(&node.fixing_vector(ncols)).unwrap();
        session.restore_node_basis(node).unwrap();
        assert_eq!(session.solve_lp_over_pool(node).unwrap(), LpOutcome::Optimal);
        assert!((node.z - 4.0).abs() < 1e-9);
    }
    assert!(up.x[2] > 0.5);
    assert!(down.x[2] < 0.5);
    assert!(session.pool().iter().all(|r| r.header.refc == 0));
}

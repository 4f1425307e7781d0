//! Pool garbage collection under a stream of random constraints.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use solver_steiner::{
    DenseDualSimplex, Hypergraph, LogicalConstraint, LpOutcome, LpSession, PoolSettings,
    SearchNode,
};

fn ring(n: usize) -> Hypergraph {
    let edges = (0..n).map(|v| vec![v, (v + 1) % n]).collect();
    Hypergraph::new(n, edges, vec![1.0; n]).unwrap()
}

fn random_constraint(rng: &mut ChaCha8Rng, n: usize) -> LogicalConstraint {
    let size = rng.gen_range(2..n);
    let mut verts: Vec<usize> = Vec::with_capacity(size);
    while verts.len() < size {
        let v = rng.gen_range(0..n);
        if !verts.contains(&v) {
            verts.push(v);
        }
    }
    if rng.gen_bool(0.5) {
        LogicalConstraint::subtour(&verts, n)
    } else {
        LogicalConstraint::cutset(&verts, n)
    }
}

fn collecting_settings(target: usize, grace: u64) -> PoolSettings {
    let mut settings = PoolSettings::default().with_target_pool_nonzeros(target);
    settings.gc_grace_iterations = grace;
    settings
}

#[test]
fn test_gc_stress_keeps_lp_rows() {
    let n = 10;
    let hg = ring(n);
    let mut session =
        LpSession::new(&hg, collecting_settings(120, 0), DenseDualSimplex::new()).unwrap();
    let mut node = SearchNode::root(session.num_cols());
    assert_eq!(session.solve_lp_over_pool(&mut node).unwrap(), LpOutcome::Optimal);

    let initial = session.pool().initial_rows();
    let seed_uids: Vec<u64> = session
        .pool()
        .iter()
        .take(initial)
        .map(|r| r.header.uid)
        .collect();

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for round in 0..30 {
        let batch: Vec<LogicalConstraint> =
            (0..10).map(|_| random_constraint(&mut rng, n)).collect();
        session.add_constraints(&mut node, &batch).unwrap();

        let loaded = session.loaded_uids().unwrap();
        let ncoeff = rng.gen_range(0..40);
        session.garbage_collect(ncoeff).unwrap();
        session.pool().verify().unwrap();

        assert_eq!(
            session.loaded_uids().unwrap(),
            loaded,
            "round {}: collection changed the LP rows",
            round
        );
        let seeds: Vec<u64> = session
            .pool()
            .iter()
            .take(initial)
            .map(|r| r.header.uid)
            .collect();
        assert_eq!(seeds, seed_uids, "round {}: seed rows evicted", round);
    }

    let stats = session.stats();
    assert!(stats.gc_runs > 0);
    assert!(stats.rows_evicted > 0);
    assert!(stats.rows < stats.rows_added as usize + initial);

    // The surviving pool still describes the same LP optimum.
    node.cpiter = None;
    assert_eq!(session.solve_lp_over_pool(&mut node).unwrap(), LpOutcome::Optimal);
    assert!((node.z - (n - 1) as f64).abs() < 1e-9);
}

#[test]
fn test_grace_period_protects_fresh_rows() {
    let n = 8;
    let hg = ring(n);
    let mut session =
        LpSession::new(&hg, collecting_settings(1, 1_000), DenseDualSimplex::new()).unwrap();
    let mut node = SearchNode::root(session.num_cols());
    session.solve_lp_over_pool(&mut node).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let batch: Vec<LogicalConstraint> = (0..20).map(|_| random_constraint(&mut rng, n)).collect();
    session.add_constraints(&mut node, &batch).unwrap();
    let rows = session.pool().num_rows();

    session.garbage_collect(16).unwrap();
    assert_eq!(session.pool().num_rows(), rows);
    assert_eq!(session.stats().rows_evicted, 0);
}

#[test]
fn test_evicted_rows_return_with_new_uids() {
    let n = 8;
    let hg = ring(n);
    let mut session =
        LpSession::new(&hg, collecting_settings(1, 0), DenseDualSimplex::new()).unwrap();
    let mut node = SearchNode::root(session.num_cols());
    session.solve_lp_over_pool(&mut node).unwrap();

    // A proper subset of a ring never holds a cycle, so this stays idle.
    let row = LogicalConstraint::subtour(&[0, 1, 2, 3], n);
    session.add_constraints(&mut node, &[row.clone()]).unwrap();
    let first = session.pool().next_uid() - 1;
    assert!(session.pool().find_uid(first).is_some());

    session.garbage_collect(8).unwrap();
    assert!(session.pool().find_uid(first).is_none());

    session.add_constraints(&mut node, &[row]).unwrap();
    let second = session.pool().next_uid() - 1;
    assert!(second > first);
    assert!(session.pool().find_uid(second).is_some());
}

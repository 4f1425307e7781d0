//! Branch-and-cut tree controller.

use std::time::Instant;

use super::{BranchDecision, BranchingSelector, NodeQueue, NodeStatus, SearchNode};
use crate::error::{PoolError, PoolResult};
use crate::master::LpEngine;
use crate::model::{Hypergraph, IncumbentTracker, SteinerSolution, SteinerStatus};
use crate::session::{LpOutcome, LpSession};
use crate::settings::SearchSettings;

/// Branch-and-cut tree controller.
///
/// Owns the LP session, the node queue and the incumbent. Nodes waiting in
/// the queue hold a basis snapshot of their parent's final LP.
pub struct BranchAndCut<'h, E: LpEngine> {
    /// LP session over the constraint pool.
    session: LpSession<'h, E>,

    /// Node queue.
    queue: NodeQueue,

    /// Branching variable selector.
    branching: BranchingSelector,

    incumbent: IncumbentTracker,

    /// Next node ID to assign.
    next_node_id: u64,

    /// Total nodes explored.
    nodes_explored: u64,

    /// Nodes pruned.
    nodes_pruned: u64,

    /// Integral LP solutions rejected for containing a cycle.
    cycles_found: u64,

    /// Start time.
    start_time: Option<Instant>,

    /// Settings.
    settings: SearchSettings,
}

impl<'h, E: LpEngine> BranchAndCut<'h, E> {
    /// Create a controller for `hg`, seeding a new LP session on `engine`.
    pub fn new(hg: &'h Hypergraph, settings: SearchSettings, engine: E) -> PoolResult<Self> {
        let session = LpSession::new(hg, settings.pool.clone(), engine)?;
        Ok(Self::with_session(session, settings))
    }

    /// Create a controller over an existing session.
    pub fn with_session(session: LpSession<'h, E>, settings: SearchSettings) -> Self {
        Self {
            session,
            queue: NodeQueue::new(settings.node_selection),
            branching: BranchingSelector::new(settings.int_feas_tol),
            incumbent: IncumbentTracker::new(),
            next_node_id: 1, // 0 reserved for root
            nodes_explored: 0,
            nodes_pruned: 0,
            cycles_found: 0,
            start_time: None,
            settings,
        }
    }

    /// The LP session.
    pub fn session(&self) -> &LpSession<'h, E> {
        &self.session
    }

    /// The best selection found so far.
    pub fn incumbent(&self) -> &IncumbentTracker {
        &self.incumbent
    }

    /// Give back the LP session.
    pub fn into_session(self) -> LpSession<'h, E> {
        self.session
    }

    /// Run branch-and-cut to completion or to the node limit.
    pub fn solve(&mut self) -> PoolResult<SteinerSolution> {
        self.start_time = Some(Instant::now());
        let mut next = Some(SearchNode::root(self.session.num_cols()));

        let status = loop {
            let node = match next.take().or_else(|| self.queue.pop()) {
                Some(node) => node,
                None => {
                    break if self.incumbent.has_incumbent() {
                        SteinerStatus::Optimal
                    } else {
                        SteinerStatus::Infeasible
                    };
                }
            };

            if node.can_prune(self.incumbent.obj_val()) {
                self.discard(node)?;
                continue;
            }

            self.process_node(node)?;
            self.nodes_explored += 1;
            self.log_progress();

            if self.nodes_explored >= self.settings.max_nodes && !self.queue.is_empty() {
                break SteinerStatus::NodeLimit;
            }
            if self.incumbent.has_incumbent() && self.gap() <= self.settings.gap_tol {
                break SteinerStatus::Optimal;
            }
        };

        let bound = self.best_bound();
        for node in self.queue.drain() {
            self.discard(node)?;
        }
        Ok(self.finalize(status, bound))
    }

    /// Solve one node: cut, check cycles, then update the incumbent or branch.
    fn process_node(&mut self, mut node: SearchNode) -> PoolResult<()> {
        node.status = NodeStatus::Processing;
        let ncols = self.session.num_cols();
        self.session.set_fixings(&node.fixing_vector(ncols))?;
        if node.basis.is_some() {
            self.session.restore_node_basis(&mut node)?;
        }
        let cutoff = self.incumbent.has_incumbent().then_some(self.incumbent.obj_val());
        self.session.set_cutoff(cutoff);

        loop {
            match self.session.solve_lp_over_pool(&mut node)? {
                LpOutcome::Optimal => {}
                LpOutcome::Infeasible => {
                    log::debug!("node {} infeasible", node.id);
                    node.status = NodeStatus::Infeasible;
                    return Ok(());
                }
                LpOutcome::CutOff => {
                    log::debug!("node {} cut off at z = {:.6}", node.id, node.z);
                    node.status = NodeStatus::Pruned;
                    self.nodes_pruned += 1;
                    return Ok(());
                }
            }

            if node.can_prune(self.incumbent.obj_val()) {
                node.status = NodeStatus::Pruned;
                self.nodes_pruned += 1;
                return Ok(());
            }

            match self.branching.select(&node) {
                Some(decision) => {
                    self.branch(&node, decision)?;
                    node.status = NodeStatus::Branched;
                    return Ok(());
                }
                None => {
                    let Some(cut) = self.session.check_integer_solution_for_cycles(&node.x)? else {
                        self.accept_integral(&node)?;
                        node.status = NodeStatus::IntegerFeasible;
                        return Ok(());
                    };
                    self.cycles_found += 1;
                    let added = self.session.add_constraints(&mut node, &[cut])?;
                    if added == 0 {
                        return Err(PoolError::Internal(format!(
                            "node {}: subtour row did not cut off the integral cycle",
                            node.id
                        )));
                    }
                }
            }
        }
    }

    /// Create both children of `parent`, each holding a snapshot of the LP.
    fn branch(&mut self, parent: &SearchNode, decision: BranchDecision) -> PoolResult<()> {
        log::trace!(
            "node {}: branching on x{} = {:.4} (z = {:.6})",
            parent.id,
            decision.var,
            decision.value,
            parent.z
        );
        for change in [decision.down_branch, decision.up_branch] {
            let mut child = parent.child(self.next_node_id, change);
            self.next_node_id += 1;
            if child.can_prune(self.incumbent.obj_val()) {
                self.nodes_pruned += 1;
                continue;
            }
            self.session.save_node_basis(&mut child)?;
            self.queue.push(child);
        }
        Ok(())
    }

    /// Record an acyclic integral solution and prune the nodes it dominates.
    fn accept_integral(&mut self, node: &SearchNode) -> PoolResult<()> {
        let Some(obj) = self.incumbent.offer(&node.x, self.session.columns().objective()) else {
            return Ok(());
        };

        let pruned = self.queue.prune_by_bound(obj);
        let count = pruned.len();
        self.nodes_pruned += count as u64;
        for open in pruned {
            self.discard(open)?;
        }
        if self.settings.verbose {
            log::info!(
                "New incumbent: obj={:.6}, node {}, pruned {} nodes",
                obj,
                node.id,
                count
            );
        }
        Ok(())
    }

    /// Drop a node without solving it.
    fn discard(&mut self, mut node: SearchNode) -> PoolResult<()> {
        node.status = NodeStatus::Pruned;
        self.session.destroy_node_basis(&mut node)
    }

    /// Get the current optimality gap.
    pub fn gap(&self) -> f64 {
        let inc = self.incumbent.obj_val();
        if !inc.is_finite() {
            return f64::INFINITY;
        }
        let bound = self.best_bound();
        ((inc - bound) / inc.abs().max(1.0)).max(0.0)
    }

    /// Get the best bound over the open nodes (the incumbent once none remain).
    pub fn best_bound(&self) -> f64 {
        if self.queue.is_empty() {
            self.incumbent.obj_val()
        } else {
            self.queue.best_bound().min(self.incumbent.obj_val())
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn finalize(&self, status: SteinerStatus, bound: f64) -> SteinerSolution {
        let x = self.incumbent.x().map(<[f64]>::to_vec).unwrap_or_default();
        let num_edges = self.session.columns().num_edges();
        let selected = x
            .iter()
            .take(num_edges)
            .enumerate()
            .filter(|(_, &v)| v >= 0.5)
            .map(|(e, _)| e)
            .collect();
        let stats = self.session.stats();
        let solution = SteinerSolution {
            status,
            x,
            selected,
            obj_val: self.incumbent.obj_val(),
            bound,
            nodes_explored: self.nodes_explored,
            cuts_added: stats.rows_added,
            cycles_found: self.cycles_found,
        };
        log::info!(
            "branch-and-cut finished: {:?}, obj {:.6}, {} nodes, {} cuts, {} cycles, {:.1}s",
            solution.status,
            solution.obj_val,
            solution.nodes_explored,
            solution.cuts_added,
            solution.cycles_found,
            self.elapsed_ms() as f64 / 1000.0
        );
        solution
    }

    /// Log progress (if verbose).
    fn log_progress(&self) {
        if !self.settings.verbose || self.nodes_explored % self.settings.log_freq.max(1) != 0 {
            return;
        }

        log::info!(
            "Nodes: {} ({} open) | Bound: {:.6} | Incumbent: {:.6} | Gap: {:.2}% | Pool: {} rows | Time: {:.1}s",
            self.nodes_explored,
            self.queue.len(),
            self.best_bound(),
            self.incumbent.obj_val(),
            self.gap() * 100.0,
            self.session.pool().num_rows(),
            self.elapsed_ms() as f64 / 1000.0,
        );
    }

    /// Get statistics for display.
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            nodes_explored: self.nodes_explored,
            nodes_pruned: self.nodes_pruned,
            nodes_open: self.queue.len() as u64,
            cycles_found: self.cycles_found,
            incumbent_updates: self.incumbent.updates(),
            best_bound: self.best_bound(),
            incumbent_obj: self.incumbent.obj_val(),
            gap: self.gap(),
            elapsed_ms: self.elapsed_ms(),
        }
    }
}

/// Statistics from the branch-and-cut tree.
#[derive(Debug, Clone)]
pub struct TreeStats {
    pub nodes_explored: u64,
    pub nodes_pruned: u64,
    pub nodes_open: u64,
    pub cycles_found: u64,
    pub incumbent_updates: u64,
    pub best_bound: f64,
    pub incumbent_obj: f64,
    pub gap: f64,
    pub elapsed_ms: u64,
}

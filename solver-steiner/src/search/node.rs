//! Search node representation.

use crate::session::NodeBasis;

/// Status of a search node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Node is waiting to be processed.
    Pending,

    /// Node is currently being processed.
    Processing,

    /// Node was pruned (bound >= incumbent).
    Pruned,

    /// Node LP relaxation is infeasible.
    Infeasible,

    /// Node produced an acyclic integral selection.
    IntegerFeasible,

    /// Node was branched (children created).
    Branched,
}

/// Fixing of one selection variable by branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundChange {
    /// Variable index.
    pub var: usize,

    /// Value the variable is fixed to.
    pub value: bool,
}

impl BoundChange {
    /// Create a "down" branch: x = 0.
    pub fn down_branch(var: usize) -> Self {
        Self { var, value: false }
    }

    /// Create an "up" branch: x = 1.
    pub fn up_branch(var: usize) -> Self {
        Self { var, value: true }
    }

    /// Bounds implied for the variable.
    pub fn bounds(&self) -> (f64, f64) {
        if self.value {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        }
    }
}

/// A node in the branch-and-cut tree.
///
/// Besides its place in the tree, a node carries the LP state the pool
/// session reads and writes while processing it: the last LP solution, the
/// bound at which slack rows were last deleted, the pool uid counter at the
/// last optimal solve, the branching history, and (while suspended) a basis
/// snapshot.
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Unique node identifier.
    pub id: u64,

    /// Parent node ID (None for root).
    pub parent_id: Option<u64>,

    /// Depth in the tree (0 for root).
    pub depth: usize,

    /// All fixings from the root to this node.
    pub fixings: Vec<BoundChange>,

    /// LP objective at this node, a lower bound for its subtree.
    pub z: f64,

    /// Last LP solution.
    pub x: Vec<f64>,

    /// Objective value when slack rows were last deleted.
    pub delrow_z: f64,

    /// Pool uid counter at the last optimal solve; `None` forces a re-solve.
    pub cpiter: Option<u64>,

    /// LP solves performed at this node.
    pub iter: u64,

    /// Decayed movement of each variable across LP solves.
    pub bheur: Vec<f64>,

    /// Lower bounds on z after fixing variable `j` to 0 (`2j`) or 1 (`2j + 1`).
    pub zlb: Vec<f64>,

    /// LP rows and basis saved while the node is suspended.
    pub basis: Option<NodeBasis>,

    /// Node processing status.
    pub status: NodeStatus,
}

impl SearchNode {
    /// Create the root node over `nvars` LP columns.
    pub fn root(nvars: usize) -> Self {
        Self {
            id: 0,
            parent_id: None,
            depth: 0,
            fixings: Vec::new(),
            z: f64::NEG_INFINITY,
            x: vec![0.0; nvars],
            delrow_z: f64::NEG_INFINITY,
            cpiter: None,
            iter: 0,
            bheur: vec![0.0; nvars],
            zlb: vec![f64::NEG_INFINITY; 2 * nvars],
            basis: None,
            status: NodeStatus::Pending,
        }
    }

    /// Create a child node from a bound change.
    ///
    /// The child inherits the parent's solution and history; its LP must be
    /// solved again.
    pub fn child(&self, id: u64, change: BoundChange) -> Self {
        let mut fixings = self.fixings.clone();
        fixings.push(change);
        let bound = self.zlb[2 * change.var + usize::from(change.value)];
        Self {
            id,
            parent_id: Some(self.id),
            depth: self.depth + 1,
            fixings,
            z: self.z.max(bound),
            x: self.x.clone(),
            delrow_z: self.delrow_z,
            cpiter: None,
            iter: 0,
            bheur: self.bheur.clone(),
            zlb: self.zlb.clone(),
            basis: None,
            status: NodeStatus::Pending,
        }
    }

    /// Per-column fixings, as consumed by the LP session.
    pub fn fixing_vector(&self, nvars: usize) -> Vec<Option<bool>> {
        let mut fixed = vec![None; nvars];
        for change in &self.fixings {
            fixed[change.var] = Some(change.value);
        }
        fixed
    }

    /// Check if this node can be pruned by an incumbent.
    pub fn can_prune(&self, incumbent_obj: f64) -> bool {
        self.z >= incumbent_obj - 1e-9
    }

    /// Record an optimal LP solution with objective `self.z`.
    ///
    /// Updates the movement history (reset on the root's first solve) and
    /// the fixing bounds: moving variable `j` to the side it is not on costs
    /// at least `|dj[j]|`.
    pub fn record_lp_solution(&mut self, x: &[f64], dj: &[f64]) {
        if self.id == 0 && self.iter == 0 {
            self.bheur.iter_mut().for_each(|b| *b = 0.0);
        } else {
            for (b, (&new, &old)) in self.bheur.iter_mut().zip(x.iter().zip(&self.x)) {
                *b = 0.75 * *b + (new - old).abs();
            }
        }
        self.x.copy_from_slice(x);

        let z = self.z;
        for (j, (&xj, &d)) in x.iter().zip(dj).enumerate() {
            let dir = usize::from(xj < 0.5);
            let lb = z + d.abs();
            let far = &mut self.zlb[2 * j + dir];
            *far = far.max(lb);
            let near = &mut self.zlb[2 * j + 1 - dir];
            *near = near.max(z);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_node() {
        let root = SearchNode::root(3);
        assert_eq!(root.id, 0);
        assert!(root.parent_id.is_none());
        assert_eq!(root.depth, 0);
        assert!(root.fixings.is_empty());
        assert_eq!(root.zlb.len(), 6);
        assert_eq!(root.status, NodeStatus::Pending);
    }

    #[test]
    fn test_child_node() {
        let mut root = SearchNode::root(2);
        root.z = 4.0;
        root.cpiter = Some(9);
        root.zlb[1] = 6.0;

        let up = root.child(1, BoundChange::up_branch(0));
        assert_eq!(up.parent_id, Some(0));
        assert_eq!(up.depth, 1);
        assert_eq!(up.cpiter, None);
        assert_eq!(up.z, 6.0);

        let down = up.child(2, BoundChange::down_branch(1));
        assert_eq!(down.fixings.len(), 2);
        assert_eq!(down.fixing_vector(3), vec![Some(true), Some(false), None]);
        assert_eq!(BoundChange::down_branch(1).bounds(), (0.0, 0.0));
    }

    #[test]
    fn test_solution_history() {
        let mut root = SearchNode::root(2);
        root.z = 2.0;
        root.record_lp_solution(&[1.0, 0.25], &[0.0, 0.5]);
        assert_eq!(root.bheur, vec![0.0, 0.0]);
        // x1 < 0.5: raising it costs 0.5 more, lowering costs nothing.
        assert_eq!(root.zlb[3], 2.5);
        assert_eq!(root.zlb[2], 2.0);
        assert_eq!(root.zlb[0], 2.0);

        root.iter = 1;
        root.z = 3.0;
        root.record_lp_solution(&[0.5, 0.25], &[0.0, 0.0]);
        assert_eq!(root.bheur, vec![0.5, 0.0]);
        assert_eq!(root.x, vec![0.5, 0.25]);
        assert_eq!(root.zlb[3], 3.0);

        root.record_lp_solution(&[1.0, 0.25], &[0.0, 0.0]);
        assert_eq!(root.bheur, vec![0.875, 0.0]);
    }

    #[test]
    fn test_pruning() {
        let mut node = SearchNode::root(1);
        node.z = 10.0;
        assert!(!node.can_prune(15.0));
        assert!(node.can_prune(10.0));
        assert!(node.can_prune(8.0));
    }
}

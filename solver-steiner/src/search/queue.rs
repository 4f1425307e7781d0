//! Suspended nodes awaiting their turn.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::SearchNode;
use crate::settings::NodeSelection;

/// Heap entry; the greatest rank is popped first.
struct Ranked {
    /// (primary, secondary) per strategy, larger is better.
    rank: (f64, f64),
    node: SearchNode,
}

impl Ranked {
    fn new(node: SearchNode, strategy: NodeSelection) -> Self {
        let depth = node.depth as f64;
        let rank = match strategy {
            // Lowest bound, then the deeper node (its LP is closer to integral).
            NodeSelection::BestBound => (-node.z, depth),
            // Deepest, then lowest bound.
            NodeSelection::DepthFirst => (depth, -node.z),
        };
        Self { rank, node }
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .0
            .total_cmp(&other.rank.0)
            .then(self.rank.1.total_cmp(&other.rank.1))
            // Older nodes first among equals.
            .then(other.node.id.cmp(&self.node.id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Open nodes, each holding a basis snapshot the queue does not release.
pub struct NodeQueue {
    strategy: NodeSelection,
    heap: BinaryHeap<Ranked>,
}

impl NodeQueue {
    pub fn new(strategy: NodeSelection) -> Self {
        Self {
            strategy,
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, node: SearchNode) {
        self.heap.push(Ranked::new(node, self.strategy));
    }

    pub fn pop(&mut self) -> Option<SearchNode> {
        self.heap.pop().map(|r| r.node)
    }

    /// Smallest `z` among the open nodes (+inf when empty).
    pub fn best_bound(&self) -> f64 {
        self.heap
            .iter()
            .map(|r| r.node.z)
            .fold(f64::INFINITY, f64::min)
    }

    /// Take out the nodes the incumbent dominates.
    pub fn prune_by_bound(&mut self, incumbent_obj: f64) -> Vec<SearchNode> {
        let (pruned, kept): (Vec<Ranked>, Vec<Ranked>) = self
            .heap
            .drain()
            .partition(|r| r.node.can_prune(incumbent_obj));
        self.heap = kept.into();
        pruned.into_iter().map(|r| r.node).collect()
    }

    /// Take out every node.
    pub fn drain(&mut self) -> Vec<SearchNode> {
        self.heap.drain().map(|r| r.node).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

//! Spanning selections produced by the search.

/// How a branch-and-cut run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteinerStatus {
    /// The best selection is proven optimal.
    Optimal,
    /// No acyclic spanning selection exists.
    Infeasible,
    /// Open nodes remained when the node limit was hit.
    NodeLimit,
}

/// Result of [`BranchAndCut::solve`](crate::search::BranchAndCut::solve).
#[derive(Debug, Clone)]
pub struct SteinerSolution {
    pub status: SteinerStatus,

    /// Rounded LP columns of the best selection (components first, then
    /// uncovered indicators in budget mode). Empty when none was found.
    pub x: Vec<f64>,

    /// Components in the best selection, ascending.
    pub selected: Vec<usize>,

    /// Cost of the best selection (+inf when none).
    pub obj_val: f64,

    /// Lower bound over the nodes left open.
    pub bound: f64,

    pub nodes_explored: u64,

    /// Pool rows added after seeding.
    pub cuts_added: u64,

    /// Integral LP solutions rejected for containing a cycle.
    pub cycles_found: u64,
}

/// Best acyclic integral selection seen so far.
#[derive(Debug, Clone, Default)]
pub struct IncumbentTracker {
    best: Option<(Vec<f64>, f64)>,
    updates: u64,
}

impl IncumbentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_incumbent(&self) -> bool {
        self.best.is_some()
    }

    /// Cost of the incumbent, +inf without one.
    pub fn obj_val(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, |(_, z)| *z)
    }

    /// Column values of the incumbent.
    pub fn x(&self) -> Option<&[f64]> {
        self.best.as_ref().map(|(x, _)| x.as_slice())
    }

    /// Number of times the incumbent improved.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Offer an integral LP solution.
    ///
    /// `x` is rounded and priced with the unscaled `objective`. Returns the
    /// cost when it beats the incumbent.
    pub fn offer(&mut self, x: &[f64], objective: &[f64]) -> Option<f64> {
        let rounded: Vec<f64> = x.iter().map(|v| v.round()).collect();
        let cost: f64 = objective.iter().zip(&rounded).map(|(c, v)| c * v).sum();
        if cost >= self.obj_val() - 1e-9 {
            return None;
        }
        self.best = Some((rounded, cost));
        self.updates += 1;
        Some(cost)
    }
}

//! Branching variable selection.

use super::{BoundChange, SearchNode};

/// Two fractionalities this close count as equal.
const FRAC_TIE: f64 = 1e-6;

/// A branching decision.
#[derive(Debug, Clone)]
pub struct BranchDecision {
    /// Variable to branch on.
    pub var: usize,

    /// Current (fractional) value.
    pub value: f64,

    /// Bound change for the "down" branch (x = 0).
    pub down_branch: BoundChange,

    /// Bound change for the "up" branch (x = 1).
    pub up_branch: BoundChange,

    /// Distance of the value from the nearest integer.
    pub score: f64,
}

/// Branching variable selector.
///
/// Picks the most fractional variable. Among equally fractional ones, the
/// variable whose LP value moved least across recent solves (smallest
/// `bheur`) wins, then the lowest index.
#[derive(Debug, Clone)]
pub struct BranchingSelector {
    /// Integrality tolerance.
    tol: f64,
}

impl BranchingSelector {
    /// Create a selector with integrality tolerance `tol`.
    pub fn new(tol: f64) -> Self {
        Self { tol }
    }

    /// Fractionality of `v`: distance to the nearest integer.
    pub fn fractionality(v: f64) -> f64 {
        (v - v.round()).abs()
    }

    /// True if every entry of `x` is within the tolerance of an integer.
    pub fn is_integral(&self, x: &[f64]) -> bool {
        x.iter().all(|&v| Self::fractionality(v) <= self.tol)
    }

    /// Select a branching variable for `node`'s LP solution.
    ///
    /// Returns None if the solution is integral.
    pub fn select(&self, node: &SearchNode) -> Option<BranchDecision> {
        let mut best: Option<(usize, f64)> = None;
        for (var, &value) in node.x.iter().enumerate() {
            let frac = Self::fractionality(value);
            if frac <= self.tol {
                continue;
            }
            let better = match best {
                None => true,
                Some((b, bfrac)) => {
                    frac > bfrac + FRAC_TIE
                        || (frac >= bfrac - FRAC_TIE && node.bheur[var] < node.bheur[b])
                }
            };
            if better {
                best = Some((var, frac));
            }
        }

        let (var, score) = best?;
        Some(BranchDecision {
            var,
            value: node.x[var],
            down_branch: BoundChange::down_branch(var),
            up_branch: BoundChange::up_branch(var),
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(x: Vec<f64>) -> SearchNode {
        let mut node = SearchNode::root(x.len());
        node.x = x;
        node
    }

    #[test]
    fn test_most_fractional() {
        let selector = BranchingSelector::new(1e-6);
        let node = node_at(vec![0.3, 0.45, 1.0, 0.9]);
        let d = selector.select(&node).unwrap();
        assert_eq!(d.var, 1);
        assert!((d.score - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_integer_feasible() {
        let selector = BranchingSelector::new(1e-6);
        let node = node_at(vec![1.0, 0.0, 1.0 - 1e-9]);
        assert!(selector.select(&node).is_none());
        assert!(selector.is_integral(&node.x));
    }

    #[test]
    fn test_ties_prefer_stable_variables() {
        let selector = BranchingSelector::new(1e-6);
        let mut node = node_at(vec![0.5, 0.5, 0.5]);
        node.bheur = vec![0.4, 0.1, 0.1];
        let d = selector.select(&node).unwrap();
        assert_eq!(d.var, 1);
        assert_eq!(d.value, 0.5);
        assert_eq!(d.down_branch, BoundChange::down_branch(1));
        assert_eq!(d.up_branch.bounds(), (1.0, 1.0));
    }
}

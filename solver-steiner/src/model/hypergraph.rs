//! Read-only hypergraph of candidate full components.

use crate::error::{PoolError, PoolResult};

/// Candidate components over a vertex set.
///
/// Each hyperedge is one component with its vertex list and cost. The
/// incidence lists (`term_trees`) and incompatibility lists are derived or
/// supplied once and never change afterwards.
#[derive(Debug, Clone)]
pub struct Hypergraph {
    num_verts: usize,
    edges: Vec<Vec<usize>>,
    costs: Vec<f64>,
    terminal: Vec<bool>,
    term_trees: Vec<Vec<usize>>,
    incompatible: Vec<Vec<usize>>,
}

impl Hypergraph {
    /// Build a hypergraph in which every vertex is a terminal.
    pub fn new(num_verts: usize, edges: Vec<Vec<usize>>, costs: Vec<f64>) -> PoolResult<Self> {
        if edges.len() != costs.len() {
            return Err(PoolError::InvalidHypergraph(format!(
                "{} edges but {} costs",
                edges.len(),
                costs.len()
            )));
        }

        let mut term_trees = vec![Vec::new(); num_verts];
        for (e, verts) in edges.iter().enumerate() {
            if verts.len() < 2 {
                return Err(PoolError::InvalidHypergraph(format!(
                    "edge {} has {} vertices",
                    e,
                    verts.len()
                )));
            }
            if !costs[e].is_finite() {
                return Err(PoolError::InvalidHypergraph(format!(
                    "edge {} has cost {}",
                    e, costs[e]
                )));
            }
            for (i, &v) in verts.iter().enumerate() {
                if v >= num_verts {
                    return Err(PoolError::InvalidHypergraph(format!(
                        "edge {} refers to vertex {} of {}",
                        e, v, num_verts
                    )));
                }
                if verts[..i].contains(&v) {
                    return Err(PoolError::InvalidHypergraph(format!(
                        "edge {} repeats vertex {}",
                        e, v
                    )));
                }
                term_trees[v].push(e);
            }
        }

        let nedges = edges.len();
        Ok(Self {
            num_verts,
            edges,
            costs,
            terminal: vec![true; num_verts],
            term_trees,
            incompatible: vec![Vec::new(); nedges],
        })
    }

    /// Mark which vertices are required terminals.
    pub fn with_terminals(mut self, terminal: Vec<bool>) -> PoolResult<Self> {
        if terminal.len() != self.num_verts {
            return Err(PoolError::InvalidHypergraph(format!(
                "{} terminal flags for {} vertices",
                terminal.len(),
                self.num_verts
            )));
        }
        self.terminal = terminal;
        Ok(self)
    }

    /// Record pairs of components that may not both be selected.
    pub fn with_incompatible_pairs(mut self, pairs: &[(usize, usize)]) -> PoolResult<Self> {
        let nedges = self.edges.len();
        for &(a, b) in pairs {
            if a >= nedges || b >= nedges || a == b {
                return Err(PoolError::InvalidHypergraph(format!(
                    "bad incompatible pair ({}, {})",
                    a, b
                )));
            }
            self.incompatible[a].push(b);
            self.incompatible[b].push(a);
        }
        for list in &mut self.incompatible {
            list.sort_unstable();
            list.dedup();
        }
        Ok(self)
    }

    /// Number of vertices.
    pub fn num_verts(&self) -> usize {
        self.num_verts
    }

    /// Number of components.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Vertices of component `e`.
    pub fn edge(&self, e: usize) -> &[usize] {
        &self.edges[e]
    }

    /// Vertex count of component `e`.
    pub fn edge_size(&self, e: usize) -> usize {
        self.edges[e].len()
    }

    /// Cost of component `e`.
    pub fn cost(&self, e: usize) -> f64 {
        self.costs[e]
    }

    /// All component costs.
    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    /// True if `v` is a required terminal.
    pub fn is_terminal(&self, v: usize) -> bool {
        self.terminal[v]
    }

    /// Number of required terminals.
    pub fn num_terminals(&self) -> usize {
        self.terminal.iter().filter(|&&t| t).count()
    }

    /// Components incident to vertex `v`, ascending.
    pub fn term_trees(&self, v: usize) -> &[usize] {
        &self.term_trees[v]
    }

    /// Components incompatible with `e`, ascending.
    pub fn incompatible(&self, e: usize) -> &[usize] {
        &self.incompatible[e]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incidence_lists() {
        let hg = Hypergraph::new(
            4,
            vec![vec![0, 1], vec![1, 2], vec![2, 3], vec![0, 1, 2]],
            vec![1.0, 1.0, 1.0, 3.0],
        )
        .unwrap();
        assert_eq!(hg.term_trees(0), &[0, 3]);
        assert_eq!(hg.term_trees(1), &[0, 1, 3]);
        assert_eq!(hg.term_trees(3), &[2]);
        assert_eq!(hg.edge_size(3), 3);
        assert_eq!(hg.num_terminals(), 4);
    }

    #[test]
    fn test_validation() {
        assert!(Hypergraph::new(2, vec![vec![0, 2]], vec![1.0]).is_err());
        assert!(Hypergraph::new(3, vec![vec![0]], vec![1.0]).is_err());
        assert!(Hypergraph::new(3, vec![vec![0, 0]], vec![1.0]).is_err());
        assert!(Hypergraph::new(3, vec![vec![0, 1]], vec![]).is_err());
        assert!(Hypergraph::new(3, vec![vec![0, 1]], vec![f64::NAN]).is_err());
    }

    #[test]
    fn test_incompatible_pairs() {
        let hg = Hypergraph::new(4, vec![vec![0, 1], vec![2, 3], vec![1, 2]], vec![1.0; 3])
            .unwrap()
            .with_incompatible_pairs(&[(1, 0), (0, 1), (2, 0)])
            .unwrap();
        assert_eq!(hg.incompatible(0), &[1, 2]);
        assert_eq!(hg.incompatible(1), &[0]);
        assert!(hg.clone().with_incompatible_pairs(&[(1, 1)]).is_err());
    }
}

//! Logical constraints and their expansion into pool rows.

use super::Hypergraph;
use crate::error::{PoolError, PoolResult};
use crate::row::{Coef, Row, RowOp};

/// A constraint stated in terms of the hypergraph.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalConstraint {
    /// At least one component crosses the boundary of the vertex set.
    Cutset(Vec<bool>),

    /// Components inside the vertex set S do not form a cycle:
    /// Σ (|e ∩ S| - 1) x_e <= |S| - 1 over edges meeting S twice or more.
    Subtour(Vec<bool>),

    /// Two components may not both be selected.
    Incompatible(usize, usize),

    /// An explicit row.
    Raw(Row),
}

impl LogicalConstraint {
    /// Subtour constraint over the listed vertices.
    pub fn subtour(vertices: &[usize], num_verts: usize) -> Self {
        LogicalConstraint::Subtour(mask(vertices, num_verts))
    }

    /// Cutset constraint around the listed vertices.
    pub fn cutset(vertices: &[usize], num_verts: usize) -> Self {
        LogicalConstraint::Cutset(mask(vertices, num_verts))
    }

    /// Expand into coefficients over the component variables.
    ///
    /// Returns `None` for a subtour constraint no component can violate.
    pub fn expand(&self, hg: &Hypergraph) -> PoolResult<Option<Row>> {
        match self {
            LogicalConstraint::Cutset(s) => {
                check_mask(s, hg)?;
                let coefs: Vec<Coef> = (0..hg.num_edges())
                    .filter(|&e| {
                        let inside = hg.edge(e).iter().filter(|&&v| s[v]).count();
                        inside > 0 && inside < hg.edge_size(e)
                    })
                    .map(|e| Coef::new(e, 1))
                    .collect();
                if coefs.is_empty() {
                    return Err(PoolError::MalformedRow(
                        "cutset crossed by no component".into(),
                    ));
                }
                Ok(Some(Row::new(coefs, RowOp::Ge, 1)))
            }
            LogicalConstraint::Subtour(s) => {
                check_mask(s, hg)?;
                let size = s.iter().filter(|&&b| b).count() as i64;
                let coefs: Vec<Coef> = (0..hg.num_edges())
                    .filter_map(|e| {
                        let inside = hg.edge(e).iter().filter(|&&v| s[v]).count() as i64;
                        (inside >= 2).then(|| Coef::new(e, inside - 1))
                    })
                    .collect();
                if coefs.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Row::new(coefs, RowOp::Le, size - 1)))
            }
            LogicalConstraint::Incompatible(a, b) => {
                let nedges = hg.num_edges();
                if *a >= nedges || *b >= nedges || a == b {
                    return Err(PoolError::MalformedRow(format!(
                        "incompatibility between {} and {}",
                        a, b
                    )));
                }
                Ok(Some(Row::from_pairs(&[(*a, 1), (*b, 1)], RowOp::Le, 1)))
            }
            LogicalConstraint::Raw(row) => Ok(Some(row.clone())),
        }
    }
}

// Out-of-range vertices lengthen the mask so `expand` rejects it.
fn mask(vertices: &[usize], num_verts: usize) -> Vec<bool> {
    let len = vertices.iter().map(|&v| v + 1).fold(num_verts, usize::max);
    let mut m = vec![false; len];
    for &v in vertices {
        m[v] = true;
    }
    m
}

fn check_mask(mask: &[bool], hg: &Hypergraph) -> PoolResult<()> {
    if mask.len() != hg.num_verts() {
        return Err(PoolError::MalformedRow(format!(
            "vertex mask of length {} for {} vertices",
            mask.len(),
            hg.num_verts()
        )));
    }
    Ok(())
}

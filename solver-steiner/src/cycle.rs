//! Cycle detection for integral selections.
//!
//! Degree and cutset rows alone admit integral selections made of disjoint
//! cycles. Before an integral LP solution is accepted, the selected
//! components are merged in a union-find forest; a merge of two vertices
//! that are already connected proves a cycle, and the vertices of that
//! connected piece give a violated subtour constraint.

use crate::model::{Hypergraph, LogicalConstraint};

/// Disjoint-set forest with union by rank and path compression.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// One singleton set per element.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Representative of `x`'s set.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`; false if they were already merged.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// A cycle found among selected components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Component whose merge closed the cycle.
    pub edge: usize,
    /// Vertices of the connected piece containing the cycle, ascending.
    pub vertices: Vec<usize>,
}

impl CycleReport {
    /// Subtour constraint over the cycle's vertices.
    pub fn to_constraint(&self, num_verts: usize) -> LogicalConstraint {
        LogicalConstraint::subtour(&self.vertices, num_verts)
    }
}

/// Look for a cycle among the components with `x[e] >= 0.5`.
///
/// Each component is merged as a star around its first vertex. Components
/// past the end of `x` count as unselected.
pub fn find_cycle(hg: &Hypergraph, x: &[f64]) -> Option<CycleReport> {
    let nverts = hg.num_verts();
    let mut uf = UnionFind::new(nverts);
    let mut visited = vec![false; nverts];

    for (e, _) in x
        .iter()
        .take(hg.num_edges())
        .enumerate()
        .filter(|&(_, &v)| v >= 0.5)
    {
        let verts = hg.edge(e);
        for &v in verts {
            visited[v] = true;
        }
        let Some((&root, rest)) = verts.split_first() else {
            continue;
        };
        for &v in rest {
            if uf.union(root, v) {
                continue;
            }
            let cycle_root = uf.find(root);
            let vertices: Vec<usize> = (0..nverts)
                .filter(|&k| visited[k] && uf.find(k) == cycle_root)
                .collect();
            log::debug!(
                "component {} closes a cycle between {} and {} ({} vertices)",
                e,
                root,
                v,
                vertices.len()
            );
            return Some(CycleReport { edge: e, vertices });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn graph(nverts: usize, edges: Vec<Vec<usize>>) -> Hypergraph {
        let n = edges.len();
        Hypergraph::new(nverts, edges, vec![1.0; n]).unwrap()
    }

    #[test]
    fn test_triangle_is_a_cycle() {
        let hg = graph(3, vec![vec![0, 1], vec![1, 2], vec![0, 2]]);
        let report = find_cycle(&hg, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(report.edge, 2);
        assert_eq!(report.vertices, vec![0, 1, 2]);
    }

    #[test]
    fn test_path_is_not_a_cycle() {
        let hg = graph(3, vec![vec![0, 1], vec![1, 2], vec![0, 2]]);
        assert_eq!(find_cycle(&hg, &[1.0, 1.0, 0.0]), None);
        // Missing entries are unselected.
        assert_eq!(find_cycle(&hg, &[1.0, 1.0]), None);
    }

    #[test]
    fn test_cycle_through_hyperedge() {
        // {0,1,2} plus {1,2} share two vertices.
        let hg = graph(5, vec![vec![0, 1, 2], vec![3, 4], vec![2, 1]]);
        let report = find_cycle(&hg, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(report.vertices, vec![0, 1, 2]);
        let sec = report.to_constraint(5).expand(&hg).unwrap().unwrap();
        // 2 x0 + x2 <= 2 is violated by the selection.
        assert!(sec.evaluate(&[1.0, 1.0, 1.0], 1e-6).is_violated());
    }

    #[test]
    fn test_union_find_deep_chain() {
        let n = 200_000;
        let mut uf = UnionFind::new(n);
        for i in 1..n {
            assert!(uf.union(i - 1, i));
        }
        assert!(!uf.union(0, n - 1));
        assert_eq!(uf.find(0), uf.find(n - 1));
    }

    #[test]
    fn test_random_forests_have_no_cycle() {
        let mut rng = ChaCha8Rng::seed_from_u64(31337);
        for _ in 0..50 {
            let n = rng.gen_range(3..40);
            // Random spanning tree: attach each vertex to an earlier one.
            let mut edges: Vec<Vec<usize>> = (1..n)
                .map(|v| vec![rng.gen_range(0..v), v])
                .collect();
            let tree_len = edges.len();
            assert_eq!(find_cycle(&graph(n, edges.clone()), &vec![1.0; tree_len]), None);

            // Any extra edge closes a cycle.
            let a = rng.gen_range(0..n);
            let b = (a + rng.gen_range(1..n)) % n;
            edges.push(vec![a, b]);
            let hg = graph(n, edges);
            let report = find_cycle(&hg, &vec![1.0; tree_len + 1]).unwrap();
            assert!(report.vertices.contains(&a) && report.vertices.contains(&b));
        }
    }
}

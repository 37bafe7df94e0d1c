//! Immutable undirected graph in compressed adjacency form.
//!
//! Both directions of every edge are stored and each node's neighbor list is
//! sorted ascending, which lets the evaluator run merge-style scans against
//! community node sets. The structure is read-only for the lifetime of the
//! process and shared between tasks behind an `Arc`.

/// Undirected graph with `n` nodes `[0, n)`.
#[derive(Debug, Clone)]
pub struct Graph {
    n: usize,
    /// offsets[i]..offsets[i + 1] indexes node i's slice of `neighbors`.
    offsets: Vec<usize>,
    /// Neighbor ids, sorted ascending per node. Holds both directions.
    neighbors: Vec<u32>,
}

impl Graph {
    /// Build from per-node neighbor lists. The lists are trusted to already
    /// be sorted, symmetric and self-loop free; loaders validate upstream.
    pub fn from_adjacency(adjacency: Vec<Vec<u32>>) -> Self {
        let n = adjacency.len();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut neighbors = Vec::new();

        offsets.push(0);
        for list in adjacency {
            neighbors.extend_from_slice(&list);
            offsets.push(neighbors.len());
        }

        Self {
            n,
            offsets,
            neighbors,
        }
    }

    /// Build from an undirected edge list. Test and demo convenience; inserts
    /// both directions and sorts each neighbor list.
    pub fn from_edges(n: usize, edges: &[(u32, u32)]) -> Self {
        let mut adjacency = vec![Vec::new(); n];
        for &(u, v) in edges {
            adjacency[u as usize].push(v);
            adjacency[v as usize].push(u);
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }
        Self::from_adjacency(adjacency)
    }

    pub fn node_count(&self) -> usize {
        self.n
    }

    /// Number of stored directed arcs (twice the undirected edge count).
    pub fn arc_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Node `u`'s neighbors, sorted ascending.
    pub fn neighbors(&self, u: u32) -> &[u32] {
        let u = u as usize;
        &self.neighbors[self.offsets[u]..self.offsets[u + 1]]
    }

    pub fn degree(&self, u: u32) -> usize {
        self.neighbors(u).len()
    }

    pub fn has_edge(&self, u: u32, v: u32) -> bool {
        self.neighbors(u).binary_search(&v).is_ok()
    }

    /// Count of edges with one endpoint in `a` and the other in `b`, both
    /// given as sorted node sets. Each node of `a` contributes the size of
    /// the intersection between its neighbor list and `b`, so calling this
    /// with `a == b` counts every inner edge twice.
    pub fn edges_between(&self, a: &[u32], b: &[u32]) -> usize {
        let mut count = 0;
        for &u in a {
            count += crate::sets::common_elements(self.neighbors(u), b);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path5() -> Graph {
        Graph::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4)])
    }

    #[test]
    fn adjacency_is_symmetric_and_sorted() {
        let g = path5();
        assert_eq!(g.node_count(), 5);
        assert_eq!(g.arc_count(), 8);
        assert_eq!(g.neighbors(1), &[0, 2]);
        assert!(g.has_edge(3, 2));
        assert!(g.has_edge(2, 3));
        assert!(!g.has_edge(0, 4));
    }

    #[test]
    fn edges_between_disjoint_sets() {
        let g = path5();
        // {0,1} vs {3,4} share no edge; {1,2} vs {3,4} share 2-3.
        assert_eq!(g.edges_between(&[0, 1], &[3, 4]), 0);
        assert_eq!(g.edges_between(&[1, 2], &[3, 4]), 1);
    }

    #[test]
    fn edges_between_self_double_counts() {
        let g = path5();
        // Inner edges of {0,1,2}: 0-1 and 1-2, each counted from both ends.
        assert_eq!(g.edges_between(&[0, 1, 2], &[0, 1, 2]), 4);
    }
}

//! Implementation of a simple, undirected graph data structure with basic static and
//! dynamic functions, used as the input representation for the coloring solvers.

use fxhash::FxHashSet;
use rand::Rng;

/// A simple undirected graph datastructure that supports dynamic behaviour.
///
/// Vertices are dense `usize` ids. A deleted vertex leaves a `None` slot behind and
/// its id is never reused.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct DynGraph {
    adj_list: Vec<Option<FxHashSet<usize>>>,
}

// Static functions
impl DynGraph {
    /// Creates a graph with `n` isolated vertices.
    pub fn new(n: usize) -> Self {
        DynGraph {
            adj_list: vec![Some(FxHashSet::default()); n],
        }
    }

    /// Returns an `Iterator` over all nodes that have not yet been deleted.
    pub fn nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.adj_list
            .iter()
            .enumerate()
            .filter_map(|(i, adj)| if adj.is_some() { Some(i) } else { None })
    }

    /// Returns the number of nodes of `self`.
    pub fn num_nodes(&self) -> usize {
        self.nodes().count()
    }

    /// Returns the amount of reserved nodes of `self`. Deleted or not.
    pub fn num_reserved(&self) -> usize {
        self.adj_list.len()
    }

    /// Returns the neighborhood of `node`, or `None` if `node` was deleted.
    pub fn neighbors(&self, node: usize) -> &Option<FxHashSet<usize>> {
        &self.adj_list[node]
    }

    /// Returns the neighborhood of `node` in ascending order, or an empty `Vec` if
    /// `node` was deleted. Used wherever iteration order has to be deterministic.
    pub fn sorted_neighbors(&self, node: usize) -> Vec<usize> {
        let mut neighs: Vec<usize> = self.adj_list[node]
            .as_ref()
            .map(|adj| adj.iter().copied().collect())
            .unwrap_or_default();
        neighs.sort_unstable();
        neighs
    }

    /// Returns the degree of `node`, or `None` if `node` was deleted.
    pub fn degree(&self, node: usize) -> Option<usize> {
        self.adj_list[node].as_ref().map(|neighbors| neighbors.len())
    }

    /// Returns the maximal degree over all remaining nodes.
    pub fn max_degree(&self) -> usize {
        self.nodes()
            .filter_map(|node| self.degree(node))
            .max()
            .unwrap_or(0)
    }

    /// Returns an iterator over all edges.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adj_list
            .iter()
            .enumerate()
            .filter(|(_, adj)| adj.is_some())
            .flat_map(|(i, adj)| {
                adj.as_ref()
                    .expect("`adj` is some")
                    .iter()
                    .filter_map(|neigh| if i < *neigh { Some((i, *neigh)) } else { None })
                    .collect::<Vec<(usize, usize)>>()
            })
    }

    /// Checks if `edge` exists.
    pub fn edge_exists(&self, edge: (usize, usize)) -> bool {
        if let Some(neighs) = &self.adj_list[edge.0] {
            return neighs.contains(&edge.1);
        }
        false
    }

    /// Checks if `self` is empty (holds no undeleted nodes).
    pub fn is_empty(&self) -> bool {
        self.num_nodes() == 0
    }
}

// Dynamic functions
impl DynGraph {
    /// Adds the edge between `src` and `trg`. Both nodes must be reserved and alive.
    pub fn add_edge(&mut self, src: usize, trg: usize) {
        assert!(src != trg, "self loops are not supported");
        self.adj_list[src]
            .as_mut()
            .expect("`src` exists")
            .insert(trg);
        self.adj_list[trg]
            .as_mut()
            .expect("`trg` exists")
            .insert(src);
    }

    /// Tries to delete `node`.
    /// Returns the old neighborhood of `node` or `None` if nothing was deleted.
    pub fn delete_node(&mut self, node: usize) -> Option<FxHashSet<usize>> {
        let opt_neighbors = self.adj_list[node].take();
        if let Some(neighborhood) = opt_neighbors.as_ref() {
            for neighbor in neighborhood.iter() {
                if let Some(ref mut nn) = self.adj_list[*neighbor] {
                    nn.remove(&node);
                }
            }
        }
        opt_neighbors
    }
}

impl DynGraph {
    /// Builds a graph with `n` vertices from an explicit edge list.
    pub fn from_edges(n: usize, edges: &[(usize, usize)]) -> Self {
        let mut graph = DynGraph::new(n);
        for &(src, trg) in edges {
            graph.add_edge(src, trg);
        }
        graph
    }

    /// Generates a random graph on `n` vertices where no vertex exceeds degree
    /// `max_degree`. Candidate edges are tried in random order and kept whenever
    /// both endpoints still have spare degree.
    pub fn random_bounded_degree<R: Rng>(n: usize, max_degree: usize, rng: &mut R) -> Self {
        let mut graph = DynGraph::new(n);
        if n < 2 {
            return graph;
        }
        let mut candidates: Vec<(usize, usize)> = (0..n)
            .flat_map(|src| ((src + 1)..n).map(move |trg| (src, trg)))
            .collect();
        // Fisher-Yates shuffle.
        for i in (1..candidates.len()).rev() {
            let j = rng.gen_range(0..=i);
            candidates.swap(i, j);
        }
        for (src, trg) in candidates {
            if graph.degree(src).expect("`src` exists") < max_degree
                && graph.degree(trg).expect("`trg` exists") < max_degree
                && rng.gen_bool(0.75)
            {
                graph.add_edge(src, trg);
            }
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_delete_test() {
        let mut graph = DynGraph::from_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.edges().count(), 4);
        assert_eq!(graph.degree(1), Some(2));
        assert!(graph.edge_exists((0, 3)));
        let old = graph.delete_node(1);
        assert_eq!(old.expect("was alive").len(), 2);
        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.degree(0), Some(1));
        assert_eq!(graph.degree(1), None);
        assert_eq!(graph.edges().count(), 2);
    }

    #[test]
    fn sorted_neighbors_test() {
        let graph = DynGraph::from_edges(5, &[(2, 4), (2, 0), (2, 3)]);
        assert_eq!(graph.sorted_neighbors(2), vec![0, 3, 4]);
        assert_eq!(graph.max_degree(), 3);
    }

    #[test]
    fn random_bounded_degree_test() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let graph = DynGraph::random_bounded_degree(10, 3, &mut rng);
            assert!(graph.max_degree() <= 3);
            assert_eq!(graph.num_nodes(), 10);
        }
    }
}

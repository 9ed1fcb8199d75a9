//! Exhaustive backtracking baseline, used as the reference the structural
//! solver is cross-checked against and exposed through the `brute` input mode.

use crate::store::Color;
use crate::coloring::ColoringSolver;

impl ColoringSolver {
    /// Decides 3-colorability by backtracking directly over the graph. On
    /// success `self.coloring` holds a proper coloring; the graph itself is
    /// left untouched. Vertices without a preset candidate set start from the
    /// full palette; preset sets, including empty ones, are honored.
    pub fn brute_force_solve(&mut self) -> bool {
        self.coloring.clear();
        let vertices: Vec<usize> = self.graph.nodes().collect();
        for vertex in vertices {
            self.allowed.entry(vertex).or_insert_with(|| (0..3).collect());
        }
        self.brute_recurse()
    }

    fn brute_recurse(&mut self) -> bool {
        let Some(vertex) = self.graph.nodes().next() else {
            return true;
        };
        let colors: Vec<Color> = self
            .allowed
            .get(&vertex)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        'color: for color in colors {
            let mut copy = self.clone();
            for neighbor in copy.graph.sorted_neighbors(vertex) {
                if let Some(candidates) = copy.allowed.get_mut(&neighbor) {
                    candidates.remove(&color);
                    if candidates.is_empty() {
                        // Only this branch dies, the remaining colors of
                        // `vertex` are still open.
                        continue 'color;
                    }
                }
            }
            copy.graph.delete_node(vertex);
            copy.allowed.remove(&vertex);
            if copy.brute_recurse() {
                self.coloring = copy.coloring;
                self.coloring.insert(vertex, color);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_test() {
        let mut solver = ColoringSolver::from_edges(3, &[(0, 1), (1, 2), (0, 2)]);
        assert!(solver.brute_force_solve());
        solver.validate_coloring().expect("witness is proper");
    }

    #[test]
    fn four_clique_unsat_test() {
        let edges = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
        let mut solver = ColoringSolver::from_edges(4, &edges);
        assert!(!solver.brute_force_solve());
    }

    #[test]
    fn exhausted_neighbor_skips_color_only_test() {
        // Vertex 0 neighbors three mutually adjacent vertices; its first color
        // choices empty a neighbor's candidate set at some depth, but the
        // search must move on to the next color instead of giving up.
        let edges = [(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)];
        let mut solver = ColoringSolver::from_edges(4, &edges);
        assert!(solver.brute_force_solve());
        solver.validate_coloring().expect("witness is proper");
    }

    #[test]
    fn empty_candidate_set_is_unsat_test() {
        // A preset empty candidate set on an isolated vertex rules the
        // instance out immediately.
        let mut solver = ColoringSolver::new(1);
        solver.allowed.insert(0, std::collections::BTreeSet::new());
        assert!(!solver.brute_force_solve());
        assert!(solver.coloring.is_empty());
    }

    #[test]
    fn empty_graph_test() {
        let mut solver = ColoringSolver::new(0);
        assert!(solver.brute_force_solve());
        assert!(solver.coloring.is_empty());
    }
}

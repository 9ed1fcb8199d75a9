//! The graph-level decision procedure for 3-colorability of bounded-degree
//! graphs.
//!
//! The solver first strips vertices of degree at most two, which are always
//! completable afterwards, then covers the reduced graph with a forest of
//! two-level trees and picks a small set of vertices to pin per tree. For
//! every assignment of the pinned vertices the remaining instance is handed
//! to the constraint solver; the pinned set is chosen so that at least one
//! assignment makes the residual tractable for the case catalogue whenever the
//! graph is 3-colorable at all.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;

use crate::case_solve::{Coloring, ThreeColorSolver};
use crate::cust_error::{ImportError, ProcessingError};
use crate::graph::DynGraph;
use crate::store::{CandidateStore, Color, Constraint, Pair, Vertex};

/// Solver selection, read from the instance trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Structural reduction plus the case-dispatch constraint solver.
    Fast,
    /// Plain backtracking over the raw graph.
    Exhaustive,
}

/// A two-level tree of the reduced graph: a root, its children, and the
/// grandchildren each child has claimed exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub root: Vertex,
    pub children: BTreeMap<Vertex, BTreeSet<Vertex>>,
}

#[derive(Debug, Clone)]
pub struct ColoringSolver {
    pub(crate) graph: DynGraph,
    pub(crate) allowed: BTreeMap<Vertex, BTreeSet<Color>>,
    deferred: Vec<(Vertex, Vec<Vertex>)>,
    forest: Vec<Tree>,
    pub coloring: Coloring,
}

impl ColoringSolver {
    pub fn new(n: usize) -> Self {
        ColoringSolver {
            graph: DynGraph::new(n),
            allowed: BTreeMap::new(),
            deferred: Vec::new(),
            forest: Vec::new(),
            coloring: Coloring::new(),
        }
    }

    pub fn from_edges(n: usize, edges: &[(usize, usize)]) -> Self {
        let mut solver = ColoringSolver::new(n);
        for &(src, trg) in edges {
            solver.add_edge(src, trg);
        }
        solver
    }

    pub fn add_edge(&mut self, src: Vertex, trg: Vertex) {
        self.graph.add_edge(src, trg);
    }

    /// Gives every live vertex the full three-color palette.
    pub fn allow_all_colors(&mut self) {
        self.allowed = self
            .graph
            .nodes()
            .map(|vertex| (vertex, (0..3).collect()))
            .collect();
    }

    /// Reads an instance from `reader`.
    ///
    /// The format is a whitespace-separated token stream: the vertex count `n`
    /// and the edge count `m`, followed by `m` edges as zero-based endpoint
    /// pairs, optionally followed by a mode token (`fast` or `brute`, default
    /// `fast`). Lines starting with `#` are comments.
    pub fn read_instance<R: BufRead>(reader: R) -> Result<(Self, Mode), ImportError> {
        let mut tokens: Vec<String> = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            tokens.extend(trimmed.split_whitespace().map(str::to_string));
        }
        let mut tokens = tokens.into_iter();
        let n: usize = tokens
            .next()
            .ok_or(ImportError::InputMalformedError)?
            .parse()?;
        let m: usize = tokens
            .next()
            .ok_or(ImportError::InputMalformedError)?
            .parse()?;
        let mut solver = ColoringSolver::new(n);
        for _ in 0..m {
            let src: usize = tokens
                .next()
                .ok_or(ImportError::InputMalformedError)?
                .parse()?;
            let trg: usize = tokens
                .next()
                .ok_or(ImportError::InputMalformedError)?
                .parse()?;
            if src >= n || trg >= n || src == trg {
                return Err(ImportError::InputMalformedError);
            }
            solver.add_edge(src, trg);
        }
        let mode = match tokens.next().as_deref() {
            None | Some("fast") => Mode::Fast,
            Some("brute") => Mode::Exhaustive,
            Some(_) => return Err(ImportError::InputMalformedError),
        };
        Ok((solver, mode))
    }

    /// Decides 3-colorability of the graph. On success `self.coloring` holds a
    /// proper coloring of every vertex; the graph itself is left untouched.
    pub fn solve(&mut self) -> bool {
        self.coloring.clear();
        self.deferred.clear();
        self.allow_all_colors();

        let mut work = self.graph.clone();
        self.strip_low_degree(&mut work);
        if work.is_empty() {
            self.complete_deferred();
            return true;
        }

        self.build_forest(&work);
        let pinned = self.select_fixed_vertices();
        let store = self.build_store(&work);

        // Odometer over all assignments of the pinned vertices.
        let mut trial: Vec<Color> = vec![0; pinned.len()];
        loop {
            let assignment: Vec<(Vertex, Color)> = pinned
                .iter()
                .zip(trial.iter())
                .map(|(&vertex, &color)| (vertex, color))
                .collect();
            let mut trial_store = store.clone();
            Self::apply_fixed(&work, &mut trial_store, &assignment);
            let mut solver = ThreeColorSolver::new(trial_store);
            if solver.solve() {
                self.coloring = solver.into_coloring();
                for (vertex, color) in assignment {
                    self.coloring.insert(vertex, color);
                }
                self.complete_deferred();
                return true;
            }
            let mut digit = 0;
            loop {
                if digit == trial.len() {
                    return false;
                }
                if trial[digit] < 2 {
                    trial[digit] += 1;
                    break;
                }
                trial[digit] = 0;
                digit += 1;
            }
        }
    }

    /// Repeatedly removes vertices of degree at most two from `work`, recording
    /// each together with its active neighborhood. Such vertices always keep a
    /// free color once everything else is colored and are completed greedily in
    /// reverse removal order.
    fn strip_low_degree(&mut self, work: &mut DynGraph) {
        let mut stripped = true;
        while stripped {
            stripped = false;
            for vertex in work.nodes().collect::<Vec<Vertex>>() {
                if work.degree(vertex).map_or(false, |d| d <= 2) {
                    let neighbors = work.sorted_neighbors(vertex);
                    work.delete_node(vertex);
                    self.deferred.push((vertex, neighbors));
                    stripped = true;
                }
            }
        }
    }

    /// Colors the stripped vertices, newest first. Every recorded neighbor is
    /// colored by then, either by the constraint solver or by an earlier pop.
    fn complete_deferred(&mut self) {
        while let Some((vertex, neighbors)) = self.deferred.pop() {
            let taken: BTreeSet<Color> = neighbors
                .iter()
                .filter_map(|n| self.coloring.get(n).copied())
                .collect();
            let color = self
                .allowed
                .get(&vertex)
                .into_iter()
                .flatten()
                .copied()
                .find(|c| !taken.contains(c))
                .expect("a vertex stripped at degree at most two keeps a free color");
            self.coloring.insert(vertex, color);
        }
    }

    /// Covers the reduced graph with two-level trees. Roots form an independent
    /// set picked greedily so that no root neighbors a previous root's child;
    /// every other vertex becomes the child of some root, or the grandchild of
    /// the first tree that claims it.
    fn build_forest(&mut self, work: &DynGraph) {
        self.forest.clear();
        let mut roots: BTreeSet<Vertex> = BTreeSet::new();
        let mut covered: BTreeSet<Vertex> = BTreeSet::new();
        for vertex in work.nodes() {
            if covered.contains(&vertex) {
                continue;
            }
            let neighbors = work.sorted_neighbors(vertex);
            if neighbors.iter().any(|n| covered.contains(n)) {
                continue;
            }
            roots.insert(vertex);
            covered.extend(neighbors);
        }
        let mut claimed: BTreeSet<Vertex> = BTreeSet::new();
        for &root in &roots {
            let mut children: BTreeMap<Vertex, BTreeSet<Vertex>> = BTreeMap::new();
            for child in work.sorted_neighbors(root) {
                let mut grandchildren = BTreeSet::new();
                for grandchild in work.sorted_neighbors(child) {
                    if !claimed.contains(&grandchild)
                        && !covered.contains(&grandchild)
                        && !roots.contains(&grandchild)
                    {
                        grandchildren.insert(grandchild);
                        claimed.insert(grandchild);
                    }
                }
                children.insert(child, grandchildren);
            }
            self.forest.push(Tree { root, children });
        }
    }

    /// Picks the vertices to pin, per tree, by the shape of its child and
    /// grandchild counts. The reduced graph has minimum degree three, so every
    /// root has at least three children.
    fn select_fixed_vertices(&self) -> Vec<Vertex> {
        let mut pinned: BTreeSet<Vertex> = BTreeSet::new();
        for tree in &self.forest {
            if tree.children.len() >= 4 {
                pinned.insert(tree.root);
                for (&child, grandchildren) in &tree.children {
                    if grandchildren.len() >= 3 {
                        pinned.insert(child);
                    }
                }
                continue;
            }
            assert_eq!(
                tree.children.len(),
                3,
                "roots of the reduced graph have at least three children"
            );
            let mut ranked: Vec<(Vertex, usize)> = tree
                .children
                .iter()
                .map(|(&child, grandchildren)| (child, grandchildren.len()))
                .collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let ((x, nx), (y, ny), (z, nz)) = (ranked[0], ranked[1], ranked[2]);
            if ny >= 2 {
                pinned.insert(x);
                pinned.insert(y);
                if nz >= 3 {
                    pinned.insert(z);
                }
                continue;
            }
            if nx >= 3 {
                pinned.insert(x);
                continue;
            }
            pinned.insert(tree.root);
        }
        pinned.into_iter().collect()
    }

    /// Encodes the reduced graph as a (3, 2) store: current allowed sets plus
    /// one not-both constraint per edge per shared allowed color.
    fn build_store(&self, work: &DynGraph) -> CandidateStore {
        let mut store = CandidateStore::new(3, 2);
        store.add_vertices(work.nodes());
        let allowed: BTreeMap<Vertex, BTreeSet<Color>> = work
            .nodes()
            .map(|vertex| {
                (
                    vertex,
                    self.allowed.get(&vertex).cloned().unwrap_or_default(),
                )
            })
            .collect();
        store.set_allowed_colors(allowed);
        for (src, trg) in work.edges() {
            for color in 0..3 {
                if store.is_allowed(Pair::new(src, color)) && store.is_allowed(Pair::new(trg, color))
                {
                    store
                        .add_constraint(Constraint::of([
                            Pair::new(src, color),
                            Pair::new(trg, color),
                        ]))
                        .expect("both endpoints are live with the color allowed");
                }
            }
        }
        store
    }

    /// Commits one trial assignment of the pinned vertices into `store`: the
    /// pinned vertex leaves the instance and its neighbors lose its color.
    /// Vertices this forces down to few candidates are picked up by the
    /// constraint solver's elimination pass, which also records how to color
    /// them afterwards.
    fn apply_fixed(work: &DynGraph, store: &mut CandidateStore, assignment: &[(Vertex, Color)]) {
        for &(vertex, color) in assignment {
            store.drop_vertex(vertex, true);
            for neighbor in work.sorted_neighbors(vertex) {
                store.drop_allowed_color(Pair::new(neighbor, color), true);
            }
        }
    }

    /// Checks that `self.coloring` is a total proper 3-coloring of the graph.
    pub fn validate_coloring(&self) -> Result<(), ProcessingError> {
        for vertex in self.graph.nodes() {
            match self.coloring.get(&vertex) {
                None => {
                    return Err(ProcessingError::InvalidColoring(format!(
                        "vertex {} is uncolored",
                        vertex
                    )))
                }
                Some(&color) if color >= 3 => {
                    return Err(ProcessingError::InvalidColoring(format!(
                        "vertex {} holds color {} outside the palette",
                        vertex, color
                    )))
                }
                _ => {}
            }
        }
        for (src, trg) in self.graph.edges() {
            if self.coloring[&src] == self.coloring[&trg] {
                return Err(ProcessingError::InvalidColoring(format!(
                    "edge ({}, {}) connects two vertices of color {}",
                    src, trg, self.coloring[&src]
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn petersen() -> Vec<(usize, usize)> {
        vec![
            (0, 1),
            (0, 4),
            (0, 5),
            (1, 2),
            (1, 6),
            (2, 3),
            (2, 7),
            (3, 4),
            (3, 8),
            (4, 9),
            (5, 7),
            (5, 8),
            (6, 8),
            (6, 9),
            (7, 9),
        ]
    }

    #[test]
    fn petersen_fast_test() {
        // 3-regular, so nothing strips and the full pipeline runs: forest,
        // pinning, odometer and the constraint solver.
        let mut solver = ColoringSolver::from_edges(10, &petersen());
        assert!(solver.solve());
        solver.validate_coloring().expect("witness is proper");
    }

    #[test]
    fn stripping_alone_suffices_test() {
        // An odd cycle has maximum degree two and is handled entirely by the
        // strip-and-complete path, without touching the constraint solver.
        let edges = [(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)];
        let mut solver = ColoringSolver::from_edges(5, &edges);
        assert!(solver.solve());
        solver.validate_coloring().expect("witness is proper");
    }

    #[test]
    fn stripping_cascades_test() {
        // Removing the degree-two vertices of the chorded square cascades
        // until nothing is left.
        let edges = [(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)];
        let mut solver = ColoringSolver::from_edges(4, &edges);
        assert!(solver.solve());
        solver.validate_coloring().expect("witness is proper");
    }

    #[test]
    fn four_clique_unsat_test() {
        let edges = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
        let mut solver = ColoringSolver::from_edges(4, &edges);
        assert!(!solver.solve());
    }

    #[test]
    fn empty_graph_test() {
        let mut solver = ColoringSolver::new(0);
        assert!(solver.solve());
        assert!(solver.coloring.is_empty());
    }

    #[test]
    fn read_instance_test() {
        let input = "# toy instance\n3 2\n0 1\n1 2\nbrute\n";
        let (solver, mode) = ColoringSolver::read_instance(input.as_bytes()).expect("well formed");
        assert_eq!(mode, Mode::Exhaustive);
        assert_eq!(solver.graph.num_nodes(), 3);
        assert!(solver.graph.edge_exists((0, 1)));
        assert!(solver.graph.edge_exists((1, 2)));
        assert!(!solver.graph.edge_exists((0, 2)));

        let (_, mode) = ColoringSolver::read_instance("2 1\n0 1\n".as_bytes()).expect("well formed");
        assert_eq!(mode, Mode::Fast);
    }

    #[test]
    fn read_instance_rejects_malformed_test() {
        assert!(ColoringSolver::read_instance("".as_bytes()).is_err());
        // Missing an edge.
        assert!(ColoringSolver::read_instance("3 2\n0 1\n".as_bytes()).is_err());
        // Endpoint out of range.
        assert!(ColoringSolver::read_instance("2 1\n0 5\n".as_bytes()).is_err());
        // Self loop.
        assert!(ColoringSolver::read_instance("2 1\n1 1\n".as_bytes()).is_err());
        // Unknown trailer.
        assert!(ColoringSolver::read_instance("2 1\n0 1\nslow\n".as_bytes()).is_err());
        // Garbage integer.
        assert!(ColoringSolver::read_instance("two 1\n0 1\n".as_bytes()).is_err());
    }

    #[test]
    fn fast_matches_brute_force_test() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(1729);
        for _ in 0..60 {
            let n = rng.gen_range(4..=12);
            let graph = DynGraph::random_bounded_degree(n, 3, &mut rng);
            let edges: Vec<(usize, usize)> = graph.edges().collect();
            let mut fast = ColoringSolver::from_edges(n, &edges);
            let mut brute = fast.clone();
            let fast_sat = fast.solve();
            let brute_sat = brute.brute_force_solve();
            assert_eq!(fast_sat, brute_sat, "solvers disagree on {:?}", edges);
            if fast_sat {
                fast.validate_coloring().expect("fast witness is proper");
                brute.validate_coloring().expect("brute witness is proper");
            }
        }
    }
}

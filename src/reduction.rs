//! Degree-based elimination rules for stores with binary constraints.
//!
//! A vertex whose candidate set has shrunk to exactly two colors can be removed
//! by rewriting its incident constraints into direct constraints between its
//! neighbors; a vertex with a single remaining candidate is forced and its
//! constraints propagate outright. Both rules keep the binary constraint graph
//! from growing as vertices are fixed, and both leave behind an [`Elimination`]
//! record from which the removed vertex's color is reconstructed once the rest
//! of the instance is colored.

use std::collections::{BTreeMap, BTreeSet};

use crate::store::{CandidateStore, Color, Constraint, Pair, Vertex};

/// Record of one eliminated vertex, sufficient to rebuild its color.
///
/// `candidates` holds the colors the vertex may still take, in preference
/// order, and `blockers` the partner pairs that rule a candidate out when they
/// hold in the final coloring, keyed by the candidate they block. A two-color
/// elimination records its two surviving candidates with the other pair of
/// every incident constraint as blockers; a forced vertex records its single
/// candidate with no blockers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub vertex: Vertex,
    pub candidates: Vec<Color>,
    pub blockers: Vec<(Color, Pair)>,
}

impl Elimination {
    /// Picks the first candidate color that no blocker invalidates under
    /// `coloring`. The constraints synthesized when the record was written
    /// guarantee that some candidate stays free in any satisfying coloring, so
    /// this only returns `None` on a coloring that is not actually satisfying.
    pub fn resolve(&self, coloring: &BTreeMap<Vertex, Color>) -> Option<Color> {
        'candidate: for &candidate in &self.candidates {
            for &(blocked, partner) in &self.blockers {
                if blocked == candidate && coloring.get(&partner.vertex) == Some(&partner.color) {
                    continue 'candidate;
                }
            }
            return Some(candidate);
        }
        None
    }
}

impl CandidateStore {
    /// Removes `vertex` if its allowed set has exactly two members.
    ///
    /// For every combination of one constraint on each of the two candidate
    /// pairs, the two "other" pairs either differ, in which case they become a
    /// direct constraint between the neighbors, or they coincide, in which case
    /// that pair can never hold and is dropped once the scan is over (dropping
    /// mid-scan would mutate the collection under the iteration).
    pub fn eliminate_two_color_vertex(&mut self, vertex: Vertex) -> Option<Elimination> {
        debug_assert_eq!(self.max_arity(), 2, "elimination requires binary constraints");
        let colors: Vec<Color> = self.allowed_colors(vertex)?.iter().copied().collect();
        if colors.len() != 2 {
            return None;
        }
        let pair_r = Pair::new(vertex, colors[0]);
        let pair_g = Pair::new(vertex, colors[1]);
        let constraints_r = self.constraints_of(pair_r);
        let constraints_g = self.constraints_of(pair_g);

        let mut coinciding: BTreeSet<Pair> = BTreeSet::new();
        for constraint_r in &constraints_r {
            for constraint_g in &constraints_g {
                let other_r = constraint_r.other(pair_r);
                let other_g = constraint_g.other(pair_g);
                if other_r != other_g {
                    self.add_constraint(Constraint::of([other_r, other_g]))
                        .expect("both pairs are drawn from live constraints");
                } else {
                    coinciding.insert(other_r);
                }
            }
        }
        for pair in coinciding {
            self.drop_allowed_color(pair, true);
        }

        let blockers = constraints_r
            .iter()
            .map(|c| (colors[0], c.other(pair_r)))
            .chain(constraints_g.iter().map(|c| (colors[1], c.other(pair_g))))
            .collect();
        self.drop_vertex(vertex, true);
        Some(Elimination {
            vertex,
            candidates: vec![colors[0], colors[1]],
            blockers,
        })
    }

    /// Removes `vertex` if its allowed set is a singleton `{c}`: the vertex will
    /// be colored `c`, so the other pair of every constraint on `(vertex, c)` can
    /// never hold and is dropped.
    pub fn eliminate_forced_vertex(&mut self, vertex: Vertex) -> Option<Elimination> {
        debug_assert_eq!(self.max_arity(), 2, "elimination requires binary constraints");
        let colors = self.allowed_colors(vertex)?;
        if colors.len() != 1 {
            return None;
        }
        let color = *colors.iter().next().expect("allowed set is a singleton");
        let pair = Pair::new(vertex, color);
        let excluded: Vec<Pair> = self
            .constraints_of(pair)
            .iter()
            .map(|c| c.other(pair))
            .collect();
        self.drop_vertex(vertex, true);
        for other in excluded {
            self.drop_allowed_color(other, true);
        }
        Some(Elimination {
            vertex,
            candidates: vec![color],
            blockers: Vec::new(),
        })
    }

    /// Applies both elimination rules to snapshots of the current vertex set
    /// until a fixed point. Mutations during a pass never affect which vertices
    /// the pass visits; cascades that shrink further vertices to two or one
    /// candidates are picked up by the next pass.
    pub fn eliminate_reducible_vertices(&mut self) -> Vec<Elimination> {
        let mut log = Vec::new();
        loop {
            let snapshot: Vec<Vertex> = self.vertices().collect();
            let before = log.len();
            for vertex in snapshot {
                if !self.contains_vertex(vertex) {
                    continue;
                }
                match self.allowed_colors(vertex).map(|colors| colors.len()) {
                    Some(1) => log.extend(self.eliminate_forced_vertex(vertex)),
                    Some(2) => log.extend(self.eliminate_two_color_vertex(vertex)),
                    _ => {}
                }
            }
            if log.len() == before {
                break;
            }
        }
        log
    }
}

/// Exhaustive satisfiability check over a store, for use as a test oracle only.
#[cfg(test)]
pub(crate) fn exhaustive_assignment(store: &CandidateStore) -> Option<BTreeMap<Vertex, Color>> {
    fn satisfied(store: &CandidateStore, assignment: &BTreeMap<Vertex, Color>) -> bool {
        store.constraints().all(|constraint| {
            !constraint
                .iter()
                .all(|pair| assignment.get(&pair.vertex) == Some(&pair.color))
        })
    }
    fn search(
        store: &CandidateStore,
        remaining: &[Vertex],
        assignment: &mut BTreeMap<Vertex, Color>,
    ) -> bool {
        let Some((&vertex, rest)) = remaining.split_first() else {
            return satisfied(store, assignment);
        };
        let colors: Vec<Color> = store
            .allowed_colors(vertex)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();
        for color in colors {
            assignment.insert(vertex, color);
            if search(store, rest, assignment) {
                return true;
            }
        }
        assignment.remove(&vertex);
        false
    }
    let order: Vec<Vertex> = store.vertices().collect();
    let mut assignment = BTreeMap::new();
    if search(store, &order, &mut assignment) {
        Some(assignment)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_store(rng: &mut StdRng, n: usize) -> CandidateStore {
        let mut store = CandidateStore::new(3, 2);
        store.set_vertex_range(n);
        store.add_all_colors_everywhere();
        // Random color removals first, then random binary constraints over the
        // surviving pairs.
        for vertex in 0..n {
            if rng.gen_bool(0.3) {
                store.drop_allowed_color(Pair::new(vertex, rng.gen_range(0..3)), true);
            }
        }
        let num_constraints = rng.gen_range(0..=2 * n);
        for _ in 0..num_constraints {
            let v = rng.gen_range(0..n);
            let u = rng.gen_range(0..n);
            if v == u {
                continue;
            }
            let pv = Pair::new(v, rng.gen_range(0..3));
            let pu = Pair::new(u, rng.gen_range(0..3));
            if store.is_allowed(pv) && store.is_allowed(pu) {
                store
                    .add_constraint(Constraint::of([pv, pu]))
                    .expect("pairs were checked");
            }
        }
        store
    }

    #[test]
    fn two_color_elimination_preserves_satisfiability_test() {
        let mut rng = StdRng::seed_from_u64(42);
        for round in 0..300 {
            let n = rng.gen_range(2..=8);
            let store = random_store(&mut rng, n);
            let Some(vertex) = store
                .vertices()
                .find(|v| store.allowed_colors(*v).map(|c| c.len()) == Some(2))
            else {
                continue;
            };
            let before = exhaustive_assignment(&store).is_some();
            let mut reduced = store.clone();
            let elimination = reduced
                .eliminate_two_color_vertex(vertex)
                .expect("vertex has two candidates");
            let after = exhaustive_assignment(&reduced);
            assert_eq!(
                before,
                after.is_some(),
                "satisfiability changed in round {}",
                round
            );
            // The record must extend any reduced solution to the dropped vertex.
            if let Some(mut assignment) = after {
                let color = elimination
                    .resolve(&assignment)
                    .expect("one candidate is always free");
                assignment.insert(vertex, color);
                assert!(store.constraints().all(|constraint| {
                    !constraint
                        .iter()
                        .all(|pair| assignment.get(&pair.vertex) == Some(&pair.color))
                }));
            }
        }
    }

    #[test]
    fn forced_elimination_propagates_test() {
        let mut store = CandidateStore::new(3, 2);
        store.set_vertex_range(3);
        store.add_all_colors_everywhere();
        store.drop_allowed_color(Pair::new(0, 1), true);
        store.drop_allowed_color(Pair::new(0, 2), true);
        store
            .add_constraint(Constraint::of([Pair::new(0, 0), Pair::new(1, 0)]))
            .expect("well formed");
        store
            .add_constraint(Constraint::of([Pair::new(0, 0), Pair::new(2, 2)]))
            .expect("well formed");
        let elimination = store.eliminate_forced_vertex(0).expect("vertex is forced");
        assert_eq!(elimination.candidates, vec![0]);
        assert!(!store.contains_vertex(0));
        assert!(!store.is_allowed(Pair::new(1, 0)));
        assert!(!store.is_allowed(Pair::new(2, 2)));
        assert_eq!(store.num_constraints(), 0);
        assert_eq!(elimination.resolve(&BTreeMap::new()), Some(0));
    }

    #[test]
    fn fixed_point_pass_test() {
        let mut store = CandidateStore::new(3, 2);
        store.set_vertex_range(4);
        store.add_all_colors_everywhere();
        // A chain of equality-style exclusions: shrinking vertex 0 cascades.
        for (a, b) in [(0, 1), (1, 2), (2, 3)] {
            for color in 0..3 {
                store
                    .add_constraint(Constraint::of([Pair::new(a, color), Pair::new(b, color)]))
                    .expect("well formed");
            }
        }
        store.drop_allowed_color(Pair::new(0, 0), true);
        store.drop_allowed_color(Pair::new(0, 1), true);
        let log = store.eliminate_reducible_vertices();
        assert!(!log.is_empty());
        assert!(log.iter().any(|e| e.vertex == 0));
        // Nothing reducible may remain.
        assert!(store
            .vertices()
            .all(|v| store.allowed_colors(v).map(|c| c.len()).unwrap_or(0) > 2));
    }
}

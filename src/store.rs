//! The small-set constraint store: per-vertex candidate-color sets plus a
//! deduplicated collection of forbidden-combination constraints, with cascading
//! removal semantics.
//!
//! The store is configured at runtime with a maximal color count and a maximal
//! constraint arity. It is a plain value: solvers branch by cloning the whole
//! store, so no branch ever aliases another branch's state.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::cust_error::StoreError;

pub type Vertex = usize;
pub type Color = usize;

/// A candidate assignment of one color to one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    pub vertex: Vertex,
    pub color: Color,
}

impl Pair {
    pub fn new(vertex: Vertex, color: Color) -> Self {
        Pair { vertex, color }
    }
}

/// A forbidden combination of pairs: not all of the contained vertex-to-color
/// assignments may hold simultaneously.
///
/// Constraints are compared structurally, size first and then in lexicographic
/// pair order, so two constraints with the same pair set are the same constraint
/// regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pairs: BTreeSet<Pair>,
}

impl Constraint {
    pub fn of<I: IntoIterator<Item = Pair>>(pairs: I) -> Self {
        Constraint {
            pairs: pairs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.iter()
    }

    pub fn contains(&self, pair: Pair) -> bool {
        self.pairs.contains(&pair)
    }

    /// A constraint holding two pairs on the same vertex is degenerate: the two
    /// assignments exclude each other already, so the constraint carries no
    /// information and is silently dropped by the store.
    pub fn is_degenerate(&self) -> bool {
        let distinct: BTreeSet<Vertex> = self.pairs.iter().map(|p| p.vertex).collect();
        distinct.len() < self.pairs.len()
    }

    /// For a binary constraint, returns the pair that is not `pair`.
    pub fn other(&self, pair: Pair) -> Pair {
        debug_assert_eq!(self.len(), 2, "`other` is only defined on binary constraints");
        *self
            .pairs
            .iter()
            .find(|p| **p != pair)
            .expect("a binary constraint holds a second pair")
    }
}

impl Ord for Constraint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.pairs.iter().cmp(other.pairs.iter()))
    }
}

impl PartialOrd for Constraint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The constraint store: active vertex set, authoritative allowed-colors map and
/// the deduplicated constraint collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateStore {
    max_colors: usize,
    max_arity: usize,
    vertices: BTreeSet<Vertex>,
    allowed: BTreeMap<Vertex, BTreeSet<Color>>,
    constraints: BTreeSet<Constraint>,
}

impl CandidateStore {
    /// Creates an empty store accepting at most `max_colors` candidate colors per
    /// vertex and constraints of arity at most `max_arity`.
    pub fn new(max_colors: usize, max_arity: usize) -> Self {
        CandidateStore {
            max_colors,
            max_arity,
            vertices: BTreeSet::new(),
            allowed: BTreeMap::new(),
            constraints: BTreeSet::new(),
        }
    }

    pub fn max_colors(&self) -> usize {
        self.max_colors
    }

    pub fn max_arity(&self) -> usize {
        self.max_arity
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn contains_vertex(&self, vertex: Vertex) -> bool {
        self.vertices.contains(&vertex)
    }

    /// Returns the active vertices in ascending order.
    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.vertices.iter().copied()
    }

    /// Returns the stored constraints in canonical order.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn add_vertex(&mut self, vertex: Vertex) {
        self.vertices.insert(vertex);
    }

    pub fn add_vertices<I: IntoIterator<Item = Vertex>>(&mut self, vertices: I) {
        self.vertices.extend(vertices);
    }

    /// Replaces the active vertex set with `0..n`.
    pub fn set_vertex_range(&mut self, n: usize) {
        self.vertices = (0..n).collect();
    }

    /// Grows the allowed set of `pair.vertex` by `pair.color`.
    pub fn add_candidate_color(&mut self, pair: Pair) -> Result<(), StoreError> {
        if !self.vertices.contains(&pair.vertex) {
            return Err(StoreError::Domain {
                vertex: pair.vertex,
                color: None,
            });
        }
        let colors = self.allowed.entry(pair.vertex).or_default();
        if !colors.contains(&pair.color) && colors.len() + 1 > self.max_colors {
            return Err(StoreError::Capacity {
                vertex: pair.vertex,
                limit: self.max_colors,
            });
        }
        colors.insert(pair.color);
        Ok(())
    }

    /// Allows the full color universe for `vertex`.
    pub fn add_all_colors(&mut self, vertex: Vertex) {
        self.allowed.insert(vertex, (0..self.max_colors).collect());
    }

    /// Allows the full color universe for every active vertex.
    pub fn add_all_colors_everywhere(&mut self) {
        for vertex in self.vertices.clone() {
            self.add_all_colors(vertex);
        }
    }

    pub fn set_allowed_colors(&mut self, allowed: BTreeMap<Vertex, BTreeSet<Color>>) {
        self.allowed = allowed;
    }

    /// Returns the allowed-color set of `vertex`, or `None` if the vertex holds no
    /// entry.
    pub fn allowed_colors(&self, vertex: Vertex) -> Option<&BTreeSet<Color>> {
        self.allowed.get(&vertex)
    }

    pub fn is_allowed(&self, pair: Pair) -> bool {
        self.allowed
            .get(&pair.vertex)
            .map(|colors| colors.contains(&pair.color))
            .unwrap_or(false)
    }

    /// Inserts `constraint` into the store.
    ///
    /// Fails with `StoreError::Size` if the arity exceeds the configured maximum
    /// and with `StoreError::Domain` if any referenced vertex is inactive or any
    /// referenced color is not currently allowed; a failed call leaves the store
    /// untouched. Degenerate and empty constraints are silently ignored. An
    /// arity-1 constraint is not stored but converted into the removal of its
    /// single candidate pair.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<(), StoreError> {
        if constraint.len() > self.max_arity {
            return Err(StoreError::Size {
                found: constraint.len(),
                limit: self.max_arity,
            });
        }
        for pair in constraint.iter() {
            if !self.vertices.contains(&pair.vertex) {
                return Err(StoreError::Domain {
                    vertex: pair.vertex,
                    color: None,
                });
            }
            if !self.is_allowed(*pair) {
                return Err(StoreError::Domain {
                    vertex: pair.vertex,
                    color: Some(pair.color),
                });
            }
        }
        if constraint.is_empty() || constraint.is_degenerate() {
            return Ok(());
        }
        if constraint.len() == 1 {
            let pair = *constraint.iter().next().expect("arity is 1");
            self.drop_allowed_color(pair, true);
            return Ok(());
        }
        self.constraints.insert(constraint);
        Ok(())
    }

    /// Returns all stored constraints mentioning `pair`, in canonical order.
    pub fn constraints_of(&self, pair: Pair) -> Vec<Constraint> {
        self.constraints
            .iter()
            .filter(|constraint| constraint.contains(pair))
            .cloned()
            .collect()
    }

    /// Removes `vertex` from the active set together with its allowed-colors
    /// entry. With `cascade` every constraint mentioning a still-allowed pair of
    /// `vertex` is removed as well, keeping the collection consistent with the
    /// live vertex set.
    pub fn drop_vertex(&mut self, vertex: Vertex, cascade: bool) {
        let removed = self.vertices.remove(&vertex);
        if cascade && removed {
            if let Some(colors) = self.allowed.get(&vertex).cloned() {
                for color in colors {
                    for constraint in self.constraints_of(Pair::new(vertex, color)) {
                        self.constraints.remove(&constraint);
                    }
                }
            }
        }
        self.allowed.remove(&vertex);
    }

    /// Removes `pair.color` from the allowed set of `pair.vertex`. If the color
    /// was actually present and `cascade` is set, every constraint mentioning the
    /// now impossible pair is removed as well.
    pub fn drop_allowed_color(&mut self, pair: Pair, cascade: bool) {
        let removed = self
            .allowed
            .get_mut(&pair.vertex)
            .map(|colors| colors.remove(&pair.color))
            .unwrap_or(false);
        if cascade && removed {
            for constraint in self.constraints_of(pair) {
                self.constraints.remove(&constraint);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_store(n: usize) -> CandidateStore {
        let mut store = CandidateStore::new(3, 2);
        store.set_vertex_range(n);
        store.add_all_colors_everywhere();
        store
    }

    #[test]
    fn arity_one_equals_drop_test() {
        let mut via_constraint = full_store(3);
        via_constraint
            .add_constraint(Constraint::of([Pair::new(1, 2)]))
            .expect("well formed");
        let mut via_drop = full_store(3);
        via_drop.drop_allowed_color(Pair::new(1, 2), true);
        assert_eq!(via_constraint, via_drop);
        assert_eq!(via_constraint.num_constraints(), 0);
    }

    #[test]
    fn dedup_test() {
        let mut store = full_store(3);
        store
            .add_constraint(Constraint::of([Pair::new(0, 1), Pair::new(2, 0)]))
            .expect("well formed");
        // Same pair set, different insertion order.
        store
            .add_constraint(Constraint::of([Pair::new(2, 0), Pair::new(0, 1)]))
            .expect("well formed");
        assert_eq!(store.num_constraints(), 1);
    }

    #[test]
    fn degenerate_is_ignored_test() {
        let mut store = full_store(2);
        store
            .add_constraint(Constraint::of([Pair::new(0, 1), Pair::new(0, 2)]))
            .expect("degenerate constraints are ignored, not rejected");
        assert_eq!(store.num_constraints(), 0);
        // The allowed sets are untouched as well.
        assert!(store.is_allowed(Pair::new(0, 1)));
        assert!(store.is_allowed(Pair::new(0, 2)));
    }

    #[test]
    fn domain_error_leaves_store_untouched_test() {
        let mut store = full_store(2);
        let before = store.clone();
        let err = store.add_constraint(Constraint::of([Pair::new(0, 0), Pair::new(9, 0)]));
        assert_eq!(
            err,
            Err(StoreError::Domain {
                vertex: 9,
                color: None
            })
        );
        assert_eq!(store, before);
        store.drop_allowed_color(Pair::new(1, 2), true);
        let err = store.add_constraint(Constraint::of([Pair::new(0, 0), Pair::new(1, 2)]));
        assert_eq!(
            err,
            Err(StoreError::Domain {
                vertex: 1,
                color: Some(2)
            })
        );
    }

    #[test]
    fn capacity_and_size_errors_test() {
        let mut store = CandidateStore::new(2, 2);
        store.set_vertex_range(1);
        store
            .add_candidate_color(Pair::new(0, 0))
            .expect("below capacity");
        store
            .add_candidate_color(Pair::new(0, 1))
            .expect("at capacity");
        assert_eq!(
            store.add_candidate_color(Pair::new(0, 2)),
            Err(StoreError::Capacity {
                vertex: 0,
                limit: 2
            })
        );
        // Re-adding an already allowed color stays fine.
        assert!(store.add_candidate_color(Pair::new(0, 1)).is_ok());

        let mut store = full_store(3);
        assert_eq!(
            store.add_constraint(Constraint::of([
                Pair::new(0, 0),
                Pair::new(1, 0),
                Pair::new(2, 0)
            ])),
            Err(StoreError::Size { found: 3, limit: 2 })
        );
    }

    #[test]
    fn cascade_invariant_test() {
        let mut store = full_store(4);
        for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
            for color in 0..3 {
                store
                    .add_constraint(Constraint::of([Pair::new(a, color), Pair::new(b, color)]))
                    .expect("well formed");
            }
        }
        store.drop_allowed_color(Pair::new(1, 0), true);
        store.drop_vertex(3, true);
        // No stored constraint may reference an inactive vertex or a disallowed
        // color afterwards.
        for constraint in store.constraints() {
            for pair in constraint.iter() {
                assert!(store.contains_vertex(pair.vertex));
                assert!(store.is_allowed(*pair));
            }
        }
        assert!(store
            .constraints()
            .all(|c| !c.contains(Pair::new(1, 0)) && c.iter().all(|p| p.vertex != 3)));
    }

    #[test]
    fn constraints_of_canonical_order_test() {
        let mut store = full_store(4);
        store
            .add_constraint(Constraint::of([Pair::new(1, 0), Pair::new(3, 2)]))
            .expect("well formed");
        store
            .add_constraint(Constraint::of([Pair::new(1, 0), Pair::new(2, 1)]))
            .expect("well formed");
        let found = store.constraints_of(Pair::new(1, 0));
        assert_eq!(found.len(), 2);
        assert!(found[0] < found[1]);
        assert!(store.constraints_of(Pair::new(0, 2)).is_empty());
    }
}

//! The three-color, binary-constraint decision procedure.
//!
//! The solver classifies the reduced instance by the local topology around one
//! pair of the conflict graph and resolves it through a fixed catalogue of
//! structural cases, recursing on a strictly smaller instance each time. Every
//! case performs at most two speculative sub-solves on a cloned instance before
//! committing, so the recursion depth stays linear in the number of eliminated
//! vertices as long as the input graph respects the bounded-degree precondition.
//!
//! Configurations outside the catalogue are logic-invariant violations, not
//! data-dependent outcomes, and panic loudly instead of producing a wrong
//! answer.

use std::collections::{BTreeMap, BTreeSet};

use crate::reduction::Elimination;
use crate::store::{CandidateStore, Color, Constraint, Pair, Vertex};

pub type Coloring = BTreeMap<Vertex, Color>;

/// The structural pattern dispatch resolves on, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Case {
    /// Some pair is constrained against three or more distinct vertices.
    ManyNeighbors(Pair),
    /// Some pair carries exactly one constraint.
    SingleConstraint(Pair),
    /// Some pair carries no constraint at all and can be fixed outright.
    FreePair(Pair),
    /// Some pair carries three or more constraints over fewer neighbors.
    ManyConstraints(Pair),
    /// Every pair carries exactly two constraints: the conflict graph is a
    /// disjoint union of simple cycles.
    BareCycles,
}

#[derive(Debug, Clone)]
pub struct ThreeColorSolver {
    store: CandidateStore,
    coloring: Coloring,
    eliminations: Vec<Elimination>,
    pair_constraints: BTreeMap<Pair, Vec<Constraint>>,
    pair_neighbors: BTreeMap<Pair, BTreeSet<Vertex>>,
}

impl ThreeColorSolver {
    pub fn new(store: CandidateStore) -> Self {
        assert!(
            store.max_colors() == 3 && store.max_arity() == 2,
            "the case catalogue covers exactly the three-color, binary-constraint configuration"
        );
        ThreeColorSolver {
            store,
            coloring: Coloring::new(),
            eliminations: Vec::new(),
            pair_constraints: BTreeMap::new(),
            pair_neighbors: BTreeMap::new(),
        }
    }

    pub fn coloring(&self) -> &Coloring {
        &self.coloring
    }

    pub fn into_coloring(self) -> Coloring {
        self.coloring
    }

    /// Decides the instance. On success the coloring covers every vertex the
    /// store held at construction time, including the ones the reducer
    /// eliminated along the way.
    pub fn solve(&mut self) -> bool {
        let sat = self.solve_inner();
        if sat {
            self.restore_eliminated();
        }
        sat
    }

    fn solve_inner(&mut self) -> bool {
        if self.has_exhausted_vertex() {
            return false;
        }
        let log = self.store.eliminate_reducible_vertices();
        self.eliminations.extend(log);
        if self.has_exhausted_vertex() {
            return false;
        }
        self.rebuild_indices();
        match self.classify() {
            None => true,
            Some(Case::ManyNeighbors(pair)) => self.settle_many_neighbors(pair),
            Some(Case::SingleConstraint(pair)) => self.settle_single_constraint(pair),
            Some(Case::FreePair(pair)) => self.settle_free_pair(pair),
            Some(Case::ManyConstraints(pair)) => self.settle_many_constraints(pair),
            Some(Case::BareCycles) => self.settle_cycles(),
        }
    }

    fn has_exhausted_vertex(&self) -> bool {
        self.store
            .vertices()
            .any(|v| self.store.allowed_colors(v).map_or(true, |c| c.is_empty()))
    }

    /// Rebuilds the two dispatch indices over every live pair: pair to
    /// constraints (canonical order) and pair to the distinct neighbor vertices
    /// across those constraints. Pairs without constraints get empty entries so
    /// that unconstrained vertices are visible to dispatch.
    fn rebuild_indices(&mut self) {
        self.pair_constraints.clear();
        self.pair_neighbors.clear();
        for vertex in self.store.vertices() {
            for &color in self.store.allowed_colors(vertex).into_iter().flatten() {
                let pair = Pair::new(vertex, color);
                self.pair_constraints.insert(pair, Vec::new());
                self.pair_neighbors.insert(pair, BTreeSet::new());
            }
        }
        let constraints: Vec<Constraint> = self.store.constraints().cloned().collect();
        for constraint in constraints {
            let pairs: Vec<Pair> = constraint.iter().copied().collect();
            for pair in pairs {
                self.pair_constraints
                    .get_mut(&pair)
                    .expect("stored constraints mention live pairs only")
                    .push(constraint.clone());
                self.pair_neighbors
                    .get_mut(&pair)
                    .expect("stored constraints mention live pairs only")
                    .insert(constraint.other(pair).vertex);
            }
        }
    }

    fn classify(&self) -> Option<Case> {
        if self.store.num_vertices() == 0 {
            return None;
        }
        for (pair, neighbors) in &self.pair_neighbors {
            if neighbors.len() >= 3 {
                return Some(Case::ManyNeighbors(*pair));
            }
        }
        for (pair, constraints) in &self.pair_constraints {
            if constraints.len() == 1 {
                return Some(Case::SingleConstraint(*pair));
            }
        }
        for (pair, constraints) in &self.pair_constraints {
            if constraints.is_empty() {
                return Some(Case::FreePair(*pair));
            }
        }
        for (pair, constraints) in &self.pair_constraints {
            if constraints.len() >= 3 {
                return Some(Case::ManyConstraints(*pair));
            }
        }
        Some(Case::BareCycles)
    }

    fn constraints_of(&self, pair: Pair) -> &[Constraint] {
        self.pair_constraints
            .get(&pair)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Takes the accumulated coloring and elimination log over from a successful
    /// speculative branch.
    fn commit(&mut self, branch: ThreeColorSolver) {
        self.coloring = branch.coloring;
        self.eliminations = branch.eliminations;
    }

    /// Fixes `pair` as its vertex's color inside this instance: the other pair
    /// of every constraint on `pair` loses its candidate, then the vertex
    /// leaves the store. Returns `false` when `pair` is no longer allowed,
    /// meaning an earlier commitment already contradicts this one; callers
    /// treat that as an unsatisfiable branch.
    fn commit_pair(&mut self, pair: Pair) -> bool {
        if !self.store.is_allowed(pair) {
            return false;
        }
        for constraint in self.store.constraints_of(pair) {
            self.store.drop_allowed_color(constraint.other(pair), true);
        }
        self.store.drop_vertex(pair.vertex, true);
        true
    }

    /// The two other candidate pairs of `pair`'s vertex.
    fn spare_pairs(&self, pair: Pair) -> (Pair, Pair) {
        let mut colors = self
            .store
            .allowed_colors(pair.vertex)
            .expect("dispatch only names live vertices")
            .clone();
        colors.remove(&pair.color);
        let mut it = colors.iter().copied();
        match (it.next(), it.next()) {
            (Some(a), Some(b)) => (Pair::new(pair.vertex, a), Pair::new(pair.vertex, b)),
            _ => panic!(
                "vertex {} holds fewer than three candidates at dispatch time",
                pair.vertex
            ),
        }
    }

    /// The candidate pair of the shared vertex that is neither `first` nor
    /// `second`.
    fn remaining_pair(&self, first: Pair, second: Pair) -> Pair {
        assert_eq!(
            first.vertex, second.vertex,
            "a remaining pair needs two candidates of one vertex"
        );
        let mut colors = self
            .store
            .allowed_colors(first.vertex)
            .expect("dispatch only names live vertices")
            .clone();
        colors.remove(&first.color);
        colors.remove(&second.color);
        let color = *colors
            .iter()
            .next()
            .expect("three candidates minus two leave one");
        Pair::new(first.vertex, color)
    }

    /// The other pairs of the first two constraints on `pair`.
    fn two_neighbors(&self, pair: Pair) -> (Pair, Pair) {
        let constraints = self.constraints_of(pair);
        assert!(
            constraints.len() >= 2,
            "pair ({}, {}) carries two constraints in the cycle stage",
            pair.vertex,
            pair.color
        );
        (constraints[0].other(pair), constraints[1].other(pair))
    }

    // --- pair with three or more distinct neighbors ------------------------

    /// Speculatively commits `pair`. If the speculation fails, the alternative
    /// is provably forced: three or more distinct neighbors overdetermine the
    /// pair, so dropping it for good loses no solution.
    fn settle_many_neighbors(&mut self, pair: Pair) -> bool {
        let mut branch = self.clone();
        if branch.commit_pair(pair) && branch.solve_inner() {
            self.commit(branch);
            self.coloring.insert(pair.vertex, pair.color);
            return true;
        }
        self.store.drop_allowed_color(pair, true);
        self.solve_inner()
    }

    // --- pair with exactly one constraint -----------------------------------

    /// Sub-classifies on the lone partner pair's own constraints: a constraint
    /// towards a third vertex forces a transitive deduction, a second
    /// constraint between the same two vertices excludes a candidate directly,
    /// and with neither the two vertices form a fully local square.
    fn settle_single_constraint(&mut self, pair: Pair) -> bool {
        let constraint = self.constraints_of(pair)[0].clone();
        let partner = constraint.other(pair);
        for other_constraint in self.constraints_of(partner).to_vec() {
            let third = other_constraint.other(partner);
            if third.vertex != pair.vertex && third.vertex != partner.vertex {
                return self.settle_bridge(pair, partner);
            }
            if third.vertex == pair.vertex && third.color != pair.color {
                return self.settle_direct_exclusion(third);
            }
        }
        self.settle_local_square(pair, partner)
    }

    /// `pair_w` is constrained by `pair_v` and by at least one pair on a third
    /// vertex: either `pair_w` holds, excluding all of its partners, or it does
    /// not and `pair_v` is free to hold.
    fn settle_bridge(&mut self, pair_v: Pair, pair_w: Pair) -> bool {
        let mut branch = self.clone();
        if branch.commit_pair(pair_w) && branch.solve_inner() {
            self.commit(branch);
            self.coloring.insert(pair_w.vertex, pair_w.color);
            return true;
        }
        self.store.drop_allowed_color(pair_w, true);
        if !self.commit_pair(pair_v) {
            return false;
        }
        let sat = self.solve_inner();
        self.coloring.insert(pair_v.vertex, pair_v.color);
        sat
    }

    /// Two constraints between the same two vertices with different colors on
    /// one side: the doubly excluded candidate can never hold.
    fn settle_direct_exclusion(&mut self, pair_x: Pair) -> bool {
        self.store.drop_allowed_color(pair_x, true);
        self.solve_inner()
    }

    /// `pair_v` and `pair_w` exclude each other and nothing else: their spare
    /// candidates inherit the exclusion as four cross constraints, after which
    /// the square is resolved through one of three sub-cases.
    fn settle_local_square(&mut self, pair_v: Pair, pair_w: Pair) -> bool {
        let (v_b, v_g) = self.spare_pairs(pair_v);
        let (w_b, w_g) = self.spare_pairs(pair_w);
        for (a, b) in [(v_b, w_b), (v_g, w_b), (v_b, w_g), (v_g, w_g)] {
            self.store
                .add_constraint(Constraint::of([a, b]))
                .expect("spare pairs are drawn from live allowed sets");
        }
        self.rebuild_indices();
        let spares: BTreeSet<Pair> = [v_b, v_g, w_b, w_g].into_iter().collect();
        for &spare in &spares {
            if self.constraints_of(spare).len() == 3 {
                return self.settle_square_with_tail(pair_v, pair_w, spare, &spares);
            }
            if self.constraints_of(spare).len() == 2 {
                return self.settle_closed_square(pair_v, pair_w, spare);
            }
            if self.pair_neighbors.get(&spare).map_or(0, |n| n.len()) >= 3 {
                return self.settle_many_neighbors(spare);
            }
        }
        self.settle_square_merge(pair_v, pair_w, &spares)
    }

    /// One spare pair has a single constraint leaving the square: commit that
    /// spare, or exclude it and commit the tail's vertex instead.
    fn settle_square_with_tail(
        &mut self,
        pair_v: Pair,
        pair_w: Pair,
        spare: Pair,
        spares: &BTreeSet<Pair>,
    ) -> bool {
        let mut tail = None;
        for constraint in self.constraints_of(spare) {
            let other = constraint.other(spare);
            if !spares.contains(&other) {
                tail = Some(other);
                break;
            }
        }
        let tail = tail.expect("a spare with three constraints has one leaving the square");
        let opposite = if spare.vertex == pair_v.vertex {
            pair_w
        } else {
            pair_v
        };
        let mut branch = self.clone();
        if branch.commit_pair(spare) && branch.commit_pair(opposite) && branch.solve_inner() {
            self.commit(branch);
            self.coloring.insert(opposite.vertex, opposite.color);
            self.coloring.insert(spare.vertex, spare.color);
            return true;
        }
        self.store.drop_allowed_color(spare, true);
        if !self.commit_pair(tail) {
            return false;
        }
        let sat = self.solve_inner();
        self.coloring.insert(tail.vertex, tail.color);
        sat
    }

    /// One spare pair carries nothing beyond the two square constraints: both
    /// square vertices come out directly.
    fn settle_closed_square(&mut self, pair_v: Pair, pair_w: Pair, spare: Pair) -> bool {
        let opposite = if spare.vertex == pair_v.vertex {
            pair_w
        } else {
            pair_v
        };
        if !self.commit_pair(spare) || !self.commit_pair(opposite) {
            return false;
        }
        let sat = self.solve_inner();
        self.coloring.insert(spare.vertex, spare.color);
        self.coloring.insert(opposite.vertex, opposite.color);
        sat
    }

    /// Every spare pair is fully constrained: the exclusions the square imposes
    /// on the outside collapse onto at most two backing vertices, which inherit
    /// them as reduced allowed sets or direct constraints; the square itself
    /// disappears. In any coloring of the residual one square vertex keeps its
    /// original candidate and the other takes a spare none of whose external
    /// partners hold, so the two vertices are recorded for reconstruction on
    /// unwind, resolved in that dependency order.
    fn settle_square_merge(
        &mut self,
        pair_v: Pair,
        pair_w: Pair,
        spares: &BTreeSet<Pair>,
    ) -> bool {
        let mut externals_of: BTreeMap<Pair, Vec<Pair>> = BTreeMap::new();
        for &spare in spares {
            let mut externals: Vec<Pair> = Vec::new();
            for constraint in self.constraints_of(spare) {
                let other = constraint.other(spare);
                if !spares.contains(&other) {
                    externals.push(other);
                }
            }
            if externals.len() == 3 {
                if externals[0].vertex != externals[1].vertex
                    || externals[0].vertex != externals[2].vertex
                {
                    panic!("three external constraints of a spare pair must target one vertex");
                }
                self.store.drop_allowed_color(spare, true);
                return self.solve_inner();
            }
            if externals.len() != 2 {
                panic!(
                    "a spare pair carries two or three external constraints here, found {}",
                    externals.len()
                );
            }
            if externals[0].vertex != externals[1].vertex {
                panic!("two external constraints of a spare pair must target one vertex");
            }
            externals_of.insert(spare, externals);
        }
        let mut viable: BTreeMap<Vertex, BTreeSet<Color>> = BTreeMap::new();
        for externals in externals_of.values() {
            let mut colors = self
                .store
                .allowed_colors(externals[0].vertex)
                .expect("constraint endpoints are live")
                .clone();
            colors.remove(&externals[0].color);
            colors.remove(&externals[1].color);
            let free = *colors
                .iter()
                .next()
                .expect("three candidates minus two leave one");
            viable.entry(externals[0].vertex).or_default().insert(free);
        }
        match viable.len() {
            1 => {
                let (&vertex, free) = viable.iter().next().expect("one entry");
                let free = free.clone();
                let allowed = self
                    .store
                    .allowed_colors(vertex)
                    .expect("backing vertex is live")
                    .clone();
                for color in allowed {
                    if !free.contains(&color) {
                        self.store.drop_allowed_color(Pair::new(vertex, color), true);
                    }
                }
            }
            2 => {
                let mut it = viable.iter();
                let (&v1, free1) = it.next().expect("two entries");
                let (&v2, free2) = it.next().expect("two entries");
                let (free1, free2) = (free1.clone(), free2.clone());
                let allowed1 = self
                    .store
                    .allowed_colors(v1)
                    .expect("backing vertex is live")
                    .clone();
                let allowed2 = self
                    .store
                    .allowed_colors(v2)
                    .expect("backing vertex is live")
                    .clone();
                for c1 in allowed1.iter().copied().filter(|c| !free1.contains(c)) {
                    for c2 in allowed2.iter().copied().filter(|c| !free2.contains(c)) {
                        self.store
                            .add_constraint(Constraint::of([Pair::new(v1, c1), Pair::new(v2, c2)]))
                            .expect("both pairs are drawn from live allowed sets");
                    }
                }
            }
            n => panic!("at most two vertices back a local square, found {}", n),
        }
        // The record for `pair_w`'s vertex resolves first: a spare whose
        // external partners stay uncolored, or the original candidate. The
        // record for `pair_v`'s vertex then resolves against both the external
        // partners, the cross exclusions towards the other side's spares and
        // the mutual exclusion of the two originals.
        let v_spares: Vec<Pair> = spares
            .iter()
            .copied()
            .filter(|s| s.vertex == pair_v.vertex)
            .collect();
        let w_spares: Vec<Pair> = spares
            .iter()
            .copied()
            .filter(|s| s.vertex == pair_w.vertex)
            .collect();
        let mut v_record = Elimination {
            vertex: pair_v.vertex,
            candidates: Vec::new(),
            blockers: Vec::new(),
        };
        for &spare in &v_spares {
            v_record.candidates.push(spare.color);
            for &external in &externals_of[&spare] {
                v_record.blockers.push((spare.color, external));
            }
            for &w_spare in &w_spares {
                v_record.blockers.push((spare.color, w_spare));
            }
        }
        v_record.candidates.push(pair_v.color);
        v_record.blockers.push((pair_v.color, pair_w));
        let mut w_record = Elimination {
            vertex: pair_w.vertex,
            candidates: Vec::new(),
            blockers: Vec::new(),
        };
        for &spare in &w_spares {
            w_record.candidates.push(spare.color);
            for &external in &externals_of[&spare] {
                w_record.blockers.push((spare.color, external));
            }
        }
        w_record.candidates.push(pair_w.color);
        self.eliminations.push(v_record);
        self.eliminations.push(w_record);
        self.store.drop_vertex(pair_v.vertex, true);
        self.store.drop_vertex(pair_w.vertex, true);
        self.solve_inner()
    }

    // --- pair without constraints -------------------------------------------

    /// Nothing excludes the pair: fix it, remove the vertex and record the
    /// color on unwind.
    fn settle_free_pair(&mut self, pair: Pair) -> bool {
        self.store.drop_vertex(pair.vertex, true);
        let sat = self.solve_inner();
        self.coloring.insert(pair.vertex, pair.color);
        sat
    }

    // --- pair with three or more constraints over few neighbors -------------

    fn settle_many_constraints(&mut self, pair: Pair) -> bool {
        if self.pair_neighbors.get(&pair).map_or(0, |n| n.len()) == 1 {
            // All constraints point at one vertex, whose three candidates all
            // exclude the pair: it can never hold.
            self.store.drop_allowed_color(pair, true);
            return self.solve_inner();
        }
        let others: Vec<Pair> = self
            .constraints_of(pair)
            .iter()
            .map(|c| c.other(pair))
            .collect();
        match others.len() {
            3 => self.settle_triple_fan(pair, &others),
            4 => self.settle_double_fork(pair, &others),
            n => panic!(
                "a pair carries three or four constraints over two neighbors here, found {}",
                n
            ),
        }
    }

    /// Three constraints over two neighbor vertices: one vertex excludes the
    /// pair twice, leaving it a single backing candidate `pair_w`.
    fn settle_triple_fan(&mut self, pair: Pair, others: &[Pair]) -> bool {
        let pair_w = if others[0].vertex == others[1].vertex {
            self.remaining_pair(others[0], others[1])
        } else if others[0].vertex == others[2].vertex {
            self.remaining_pair(others[0], others[2])
        } else if others[1].vertex == others[2].vertex {
            self.remaining_pair(others[1], others[2])
        } else {
            panic!("three constraints over two vertices share a vertex twice");
        };
        let w_constraints = self.constraints_of(pair_w).to_vec();
        if w_constraints.is_empty() {
            self.store.drop_vertex(pair_w.vertex, true);
            let sat = self.solve_inner();
            self.coloring.insert(pair_w.vertex, pair_w.color);
            return sat;
        }
        assert!(
            w_constraints.len() >= 2,
            "a backing candidate carries no or at least two constraints here"
        );
        let first = w_constraints[0].other(pair_w);
        let second = w_constraints[1].other(pair_w);
        let mut branch = self.clone();
        if first.vertex != second.vertex {
            if branch.commit_pair(pair_w) && branch.solve_inner() {
                self.commit(branch);
                self.coloring.insert(pair_w.vertex, pair_w.color);
                return true;
            }
        } else if branch.commit_pair(pair_w) && branch.commit_pair(pair) && branch.solve_inner() {
            self.commit(branch);
            self.coloring.insert(pair_w.vertex, pair_w.color);
            self.coloring.insert(pair.vertex, pair.color);
            return true;
        }
        self.store.drop_allowed_color(pair_w, true);
        self.store.drop_allowed_color(pair, true);
        self.solve_inner()
    }

    /// Four constraints over two neighbor vertices: each neighbor excludes the
    /// pair twice, so each is left with exactly one backing candidate and
    /// holding the pair forces both. That joint commitment is speculated on a
    /// branch; residual constraints, in particular one between the two backing
    /// candidates themselves, make it fail, and then the pair can never hold.
    fn settle_double_fork(&mut self, pair: Pair, others: &[Pair]) -> bool {
        let (pair_w, pair_x) = if others[0].vertex == others[1].vertex {
            (
                self.remaining_pair(others[0], others[1]),
                self.remaining_pair(others[2], others[3]),
            )
        } else if others[0].vertex == others[2].vertex {
            (
                self.remaining_pair(others[0], others[2]),
                self.remaining_pair(others[1], others[3]),
            )
        } else if others[0].vertex == others[3].vertex {
            (
                self.remaining_pair(others[0], others[3]),
                self.remaining_pair(others[1], others[2]),
            )
        } else {
            panic!("four constraints over two vertices pair up by vertex");
        };
        let mut branch = self.clone();
        if branch.commit_pair(pair)
            && branch.commit_pair(pair_w)
            && branch.commit_pair(pair_x)
            && branch.solve_inner()
        {
            self.commit(branch);
            self.coloring.insert(pair.vertex, pair.color);
            self.coloring.insert(pair_w.vertex, pair_w.color);
            self.coloring.insert(pair_x.vertex, pair_x.color);
            return true;
        }
        self.store.drop_allowed_color(pair, true);
        self.solve_inner()
    }

    // --- disjoint simple cycles ----------------------------------------------

    /// Every pair carries exactly two constraints. Each conflict-graph cycle is
    /// traced explicitly, classified by length and shape and resolved with a
    /// closed-form elimination; pure pair-triangles are resolved jointly at the
    /// end.
    fn settle_cycles(&mut self) -> bool {
        let pairs: Vec<Pair> = self.pair_constraints.keys().copied().collect();
        for pair in pairs {
            let (left, right) = self.two_neighbors(pair);
            let mut path = vec![left, pair, right];
            while path.last().expect("path is never empty").vertex != path[0].vertex
                && path.len() < 5
            {
                self.extend_path(&mut path);
            }
            if path.len() == 5 {
                if path[4].vertex != path[0].vertex {
                    return self.settle_open_chain(&path);
                }
                if path[4] == path[0] {
                    path.pop();
                    return self.settle_square_cycle(&path);
                }
                // The trace revisits the front vertex with a different color:
                // keep going until it closes on the exact front pair, checking
                // the period-four vertex pattern along the way.
                let mut irregular = false;
                while *path.last().expect("path is never empty") != path[0] {
                    self.extend_path(&mut path);
                    if path.last().expect("path is never empty").vertex
                        != path[path.len() - 5].vertex
                    {
                        irregular = true;
                        break;
                    }
                }
                if irregular {
                    continue;
                }
                path.pop();
                if path.len() == 8 {
                    return self.settle_eight_ring(&path);
                }
                if path.len() == 12 {
                    return self.settle_twelve_ring(&path);
                }
                panic!(
                    "closed conflict cycles here have eight or twelve pairs, found {}",
                    path.len()
                );
            }
            if path.len() == 4 && path[0] != path[3] {
                return self.settle_folded_chain(&path);
            }
            if path.len() == 3 {
                return self.settle_pinched_pair(&path);
            }
            // path.len() == 4 with identical endpoints: a pair triangle,
            // resolved jointly below.
        }
        self.settle_triangles()
    }

    /// Extends the trace by the neighbor of the last pair that is not the one
    /// the trace came from.
    fn extend_path(&self, path: &mut Vec<Pair>) {
        let (a, b) = self.two_neighbors(*path.last().expect("path is never empty"));
        if a != path[path.len() - 2] {
            path.push(a);
        } else {
            path.push(b);
        }
    }

    /// An open chain of five pairs over five distinct vertices.
    fn settle_open_chain(&mut self, path: &[Pair]) -> bool {
        let mut branch = self.clone();
        if branch.commit_pair(path[0]) && branch.commit_pair(path[3]) && branch.solve_inner() {
            self.commit(branch);
            self.coloring.insert(path[0].vertex, path[0].color);
            self.coloring.insert(path[3].vertex, path[3].color);
            return true;
        }
        let mut branch = self.clone();
        if branch.commit_pair(path[1]) && branch.solve_inner() {
            self.commit(branch);
            self.coloring.insert(path[1].vertex, path[1].color);
            return true;
        }
        if !self.commit_pair(path[2]) {
            return false;
        }
        let sat = self.solve_inner();
        self.coloring.insert(path[2].vertex, path[2].color);
        sat
    }

    /// A closed cycle of four pairs: commit two antipodal pairs or, failing
    /// that, the other two.
    fn settle_square_cycle(&mut self, path: &[Pair]) -> bool {
        let mut branch = self.clone();
        if branch.commit_pair(path[0]) && branch.commit_pair(path[2]) && branch.solve_inner() {
            self.commit(branch);
            self.coloring.insert(path[0].vertex, path[0].color);
            self.coloring.insert(path[2].vertex, path[2].color);
            return true;
        }
        if !self.commit_pair(path[1]) || !self.commit_pair(path[3]) {
            return false;
        }
        let sat = self.solve_inner();
        self.coloring.insert(path[1].vertex, path[1].color);
        self.coloring.insert(path[3].vertex, path[3].color);
        sat
    }

    /// A three-pair chain whose endpoints sit on one vertex: the vertex's third
    /// candidate inherits the exclusion, or the middle pair comes out with it.
    fn settle_pinched_pair(&mut self, path: &[Pair]) -> bool {
        let anti = self.remaining_pair(path[0], path[2]);
        let (first, second) = self.two_neighbors(anti);
        if first.vertex != path[1].vertex {
            self.store
                .add_constraint(Constraint::of([path[1], first]))
                .expect("both pairs are live");
            return self.solve_inner();
        }
        if second.vertex != path[1].vertex {
            self.store
                .add_constraint(Constraint::of([path[1], second]))
                .expect("both pairs are live");
            return self.solve_inner();
        }
        if !self.commit_pair(path[1]) || !self.commit_pair(anti) {
            return false;
        }
        let sat = self.solve_inner();
        self.coloring.insert(path[1].vertex, path[1].color);
        self.coloring.insert(anti.vertex, anti.color);
        sat
    }

    /// A four-pair chain whose endpoints sit on one vertex with different
    /// colors.
    fn settle_folded_chain(&mut self, path: &[Pair]) -> bool {
        let mut branch = self.clone();
        if branch.commit_pair(path[1]) && branch.solve_inner() {
            self.commit(branch);
            self.coloring.insert(path[1].vertex, path[1].color);
            return true;
        }
        if !self.commit_pair(path[2]) {
            return false;
        }
        let sat = self.solve_inner();
        self.coloring.insert(path[2].vertex, path[2].color);
        sat
    }

    /// An eight-pair ring over four vertices, two pairs each: the four third
    /// candidates exclude each other pairwise.
    fn settle_eight_ring(&mut self, path: &[Pair]) -> bool {
        let spares: Vec<Pair> = (0..4)
            .map(|i| self.remaining_pair(path[i], path[i + 4]))
            .collect();
        for i in 0..4 {
            for j in (i + 1)..4 {
                self.store
                    .add_constraint(Constraint::of([spares[i], spares[j]]))
                    .expect("spare pairs are drawn from live allowed sets");
            }
        }
        self.solve_inner()
    }

    /// A twelve-pair ring over four vertices, three pairs each: the four
    /// vertices come out jointly, their colors read off the fixed ring shape.
    fn settle_twelve_ring(&mut self, path: &[Pair]) -> bool {
        for &i in &[0usize, 2, 5, 7] {
            if !self.commit_pair(path[i]) {
                return false;
            }
        }
        let sat = self.solve_inner();
        for &i in &[0usize, 2, 5, 7] {
            self.coloring.insert(path[i].vertex, path[i].color);
        }
        sat
    }

    /// Residual conflict graph made of disjoint pair-triangles. Each triangle
    /// may hold at most one of its three pairs; every vertex holds exactly one
    /// of its three pairs and the counts match up, so each triangle holds
    /// exactly one. Choosing which vertex backs which triangle is a perfect
    /// matching in the 3-regular bipartite vertex/triangle incidence graph,
    /// which always exists and is found with augmenting paths.
    fn settle_triangles(&mut self) -> bool {
        let vertices: Vec<Vertex> = self.store.vertices().collect();
        if vertices.is_empty() {
            return true;
        }
        let mut triangles: Vec<[Pair; 3]> = Vec::new();
        let mut triangle_of: BTreeMap<Pair, usize> = BTreeMap::new();
        for (&pair, constraints) in &self.pair_constraints {
            if triangle_of.contains_key(&pair) {
                continue;
            }
            assert_eq!(
                constraints.len(),
                2,
                "every pair carries two constraints in the cycle stage"
            );
            let a = constraints[0].other(pair);
            let b = constraints[1].other(pair);
            if !self.constraints_of(a).iter().any(|c| c.contains(b)) {
                panic!("residual conflict cycles of length three must close");
            }
            let mut triangle = [pair, a, b];
            triangle.sort();
            let id = triangles.len();
            for p in triangle {
                triangle_of.insert(p, id);
            }
            triangles.push(triangle);
        }
        assert_eq!(
            triangles.len(),
            vertices.len(),
            "the residual holds one triangle per vertex"
        );
        let index_of: BTreeMap<Vertex, usize> = vertices
            .iter()
            .copied()
            .enumerate()
            .map(|(i, v)| (v, i))
            .collect();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); vertices.len()];
        for (pair, &triangle) in &triangle_of {
            adjacency[index_of[&pair.vertex]].push(triangle);
        }

        fn augment(
            vertex: usize,
            adjacency: &[Vec<usize>],
            matched_to: &mut [Option<usize>],
            visited: &mut [bool],
        ) -> bool {
            for &triangle in &adjacency[vertex] {
                if visited[triangle] {
                    continue;
                }
                visited[triangle] = true;
                let free = match matched_to[triangle] {
                    None => true,
                    Some(owner) => augment(owner, adjacency, matched_to, visited),
                };
                if free {
                    matched_to[triangle] = Some(vertex);
                    return true;
                }
            }
            false
        }

        let mut matched_to: Vec<Option<usize>> = vec![None; triangles.len()];
        for vertex in 0..vertices.len() {
            let mut visited = vec![false; triangles.len()];
            if !augment(vertex, &adjacency, &mut matched_to, &mut visited) {
                panic!("a 3-regular bipartite incidence graph always has a perfect matching");
            }
        }
        for (triangle, owner) in matched_to.iter().enumerate() {
            let owner = vertices[owner.expect("the matching is perfect")];
            let pair = triangles[triangle]
                .iter()
                .find(|p| p.vertex == owner)
                .expect("the matched triangle holds a pair of its vertex");
            self.coloring.insert(owner, pair.color);
        }
        true
    }

    /// Replays the elimination log backwards once the reduced instance is
    /// colored, assigning each removed vertex a candidate no recorded partner
    /// blocks.
    fn restore_eliminated(&mut self) {
        while let Some(elimination) = self.eliminations.pop() {
            let color = elimination.resolve(&self.coloring).unwrap_or_else(|| {
                panic!(
                    "vertex {} keeps a free candidate after elimination",
                    elimination.vertex
                )
            });
            self.coloring.insert(elimination.vertex, color);
        }
    }
}

//! Storage boundary.
//!
//! The engines only need two things from storage: pattern lookup over
//! (possibly partially bound) triples through [`Finder`], and idempotent
//! writes through [`DeductionSink`]. [`MemGraph`] is the in-memory
//! implementation used for both the base facts and the deductions, and
//! [`FactBase`] cascades lookups over the pair.

use crate::term::{TermId, TermStore};
use crate::triple::{Triple, TriplePattern};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

pub type TripleIter<'a> = Box<dyn Iterator<Item = Triple> + 'a>;

/// Pattern lookup. `None` in a position matches anything. Every call
/// returns a fresh iterator.
pub trait Finder {
    fn find(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> TripleIter<'_>;

    fn contains(&self, triple: &Triple) -> bool {
        self.find(Some(triple.subject), Some(triple.predicate), Some(triple.object))
            .next()
            .is_some()
    }

    /// Lookup keyed on the ground positions of a pattern. Callers still have
    /// to unify each result: open functor positions are not filtered here.
    fn find_pattern(&self, pattern: &TriplePattern, terms: &TermStore) -> TripleIter<'_> {
        let [s, p, o] = pattern.lookup_key(terms);
        self.find(s, p, o)
    }
}

/// Write side of storage.
pub trait DeductionSink {
    /// Add a triple. Returns false if it was already present.
    fn add_deduction(&mut self, triple: Triple) -> bool;

    /// Remove a triple. Returns false if it was absent.
    fn delete(&mut self, triple: &Triple) -> bool;
}

/// Indexed in-memory triple set.
///
/// Triples live in insertion-ordered slots; each position index maps a node
/// to the ordered set of slots holding it, so lookups enumerate in insertion
/// order and results are reproducible run to run.
#[derive(Debug, Default, Clone)]
pub struct MemGraph {
    slots: Vec<Option<Triple>>,
    positions: FxHashMap<Triple, usize>,
    by_subject: FxHashMap<TermId, BTreeSet<usize>>,
    by_predicate: FxHashMap<TermId, BTreeSet<usize>>,
    by_object: FxHashMap<TermId, BTreeSet<usize>>,
}

const COMPACT_MIN_SLOTS: usize = 64;

impl MemGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn add(&mut self, triple: Triple) -> bool {
        if self.positions.contains_key(&triple) {
            return false;
        }
        let slot = self.slots.len();
        self.slots.push(Some(triple));
        self.positions.insert(triple, slot);
        self.by_subject.entry(triple.subject).or_default().insert(slot);
        self.by_predicate
            .entry(triple.predicate)
            .or_default()
            .insert(slot);
        self.by_object.entry(triple.object).or_default().insert(slot);
        true
    }

    pub fn remove(&mut self, triple: &Triple) -> bool {
        let Some(slot) = self.positions.remove(triple) else {
            return false;
        };
        self.slots[slot] = None;
        unindex(&mut self.by_subject, triple.subject, slot);
        unindex(&mut self.by_predicate, triple.predicate, slot);
        unindex(&mut self.by_object, triple.object, slot);
        if self.slots.len() >= COMPACT_MIN_SLOTS && self.positions.len() * 2 < self.slots.len() {
            self.compact();
        }
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn contains_triple(&self, triple: &Triple) -> bool {
        self.positions.contains_key(triple)
    }

    /// All triples in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Triple> + '_ {
        self.slots.iter().filter_map(|t| *t)
    }

    /// Drop tombstoned slots, keeping relative order.
    fn compact(&mut self) {
        let live: Vec<Triple> = self.iter().collect();
        self.clear();
        for t in live {
            self.add(t);
        }
    }

    fn index_for(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> Option<&BTreeSet<usize>> {
        const EMPTY: &BTreeSet<usize> = &BTreeSet::new();
        let candidates = [
            s.map(|s| self.by_subject.get(&s).unwrap_or(EMPTY)),
            p.map(|p| self.by_predicate.get(&p).unwrap_or(EMPTY)),
            o.map(|o| self.by_object.get(&o).unwrap_or(EMPTY)),
        ];
        candidates.into_iter().flatten().min_by_key(|set| set.len())
    }
}

fn unindex(index: &mut FxHashMap<TermId, BTreeSet<usize>>, key: TermId, slot: usize) {
    if let Some(set) = index.get_mut(&key) {
        set.remove(&slot);
        if set.is_empty() {
            index.remove(&key);
        }
    }
}

fn matches(t: &Triple, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> bool {
    s.map_or(true, |s| t.subject == s)
        && p.map_or(true, |p| t.predicate == p)
        && o.map_or(true, |o| t.object == o)
}

impl Finder for MemGraph {
    fn find(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> TripleIter<'_> {
        if let (Some(s), Some(p), Some(o)) = (s, p, o) {
            let t = Triple::new(s, p, o);
            return Box::new(self.contains_triple(&t).then_some(t).into_iter());
        }
        match self.index_for(s, p, o) {
            Some(slots) => Box::new(
                slots
                    .iter()
                    .filter_map(move |&slot| self.slots[slot])
                    .filter(move |t| matches(t, s, p, o)),
            ),
            None => Box::new(self.iter()),
        }
    }

    fn contains(&self, triple: &Triple) -> bool {
        self.contains_triple(triple)
    }
}

impl DeductionSink for MemGraph {
    fn add_deduction(&mut self, triple: Triple) -> bool {
        self.add(triple)
    }

    fn delete(&mut self, triple: &Triple) -> bool {
        self.remove(triple)
    }
}

/// Base facts plus deductions, searched as one graph.
#[derive(Debug, Default, Clone)]
pub struct FactBase {
    pub base: MemGraph,
    pub deductions: MemGraph,
}

impl FactBase {
    pub fn new(base: MemGraph) -> Self {
        Self {
            base,
            deductions: MemGraph::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.base.len()
            + self
                .deductions
                .iter()
                .filter(|t| !self.base.contains_triple(t))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.deductions.is_empty()
    }
}

impl Finder for FactBase {
    fn find(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> TripleIter<'_> {
        let derived = self
            .deductions
            .find(s, p, o)
            .filter(move |t| !self.base.contains_triple(t));
        Box::new(self.base.find(s, p, o).chain(derived))
    }

    fn contains(&self, triple: &Triple) -> bool {
        self.base.contains_triple(triple) || self.deductions.contains_triple(triple)
    }
}

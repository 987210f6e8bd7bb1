//! Ground triples and triple patterns.

use crate::term::{format_term, TermId, TermStore};
use smallvec::SmallVec;
use std::fmt;

/// A ground (subject, predicate, object) statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: TermId,
    pub predicate: TermId,
    pub object: TermId,
}

impl Triple {
    pub fn new(subject: TermId, predicate: TermId, object: TermId) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn as_pattern(&self) -> TriplePattern {
        TriplePattern::new(self.subject, self.predicate, self.object)
    }

    pub fn display<'a>(&'a self, terms: &'a TermStore) -> TripleDisplay<'a> {
        TripleDisplay {
            nodes: [self.subject, self.predicate, self.object],
            terms,
        }
    }
}

/// A triple whose positions may hold variables or functors with variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriplePattern {
    pub subject: TermId,
    pub predicate: TermId,
    pub object: TermId,
}

impl TriplePattern {
    pub fn new(subject: TermId, predicate: TermId, object: TermId) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn nodes(&self) -> [TermId; 3] {
        [self.subject, self.predicate, self.object]
    }

    pub fn is_ground(&self, terms: &TermStore) -> bool {
        self.nodes().iter().all(|&n| terms.is_ground(n))
    }

    pub fn as_triple(&self, terms: &TermStore) -> Option<Triple> {
        self.is_ground(terms)
            .then(|| Triple::new(self.subject, self.predicate, self.object))
    }

    /// Position value usable as a storage lookup key: the node itself when it
    /// is ground, `None` otherwise.
    pub fn lookup_key(&self, terms: &TermStore) -> [Option<TermId>; 3] {
        self.nodes().map(|n| terms.is_ground(n).then_some(n))
    }

    /// Ground predicate, if any. Used to index rules and filters.
    pub fn ground_predicate(&self, terms: &TermStore) -> Option<TermId> {
        terms.is_ground(self.predicate).then_some(self.predicate)
    }

    pub fn map_nodes(&self, mut f: impl FnMut(TermId) -> TermId) -> TriplePattern {
        TriplePattern::new(f(self.subject), f(self.predicate), f(self.object))
    }

    pub fn offset_vars(&self, offset: u32, terms: &TermStore) -> TriplePattern {
        self.map_nodes(|n| terms.offset_vars(n, offset))
    }

    pub fn vars(&self, terms: &TermStore) -> SmallVec<[u32; 8]> {
        let mut out = SmallVec::new();
        for node in self.nodes() {
            terms.collect_vars(node, &mut out);
        }
        out
    }

    /// Renumber variables densely from zero in first-appearance order.
    /// Two calls that differ only in variable naming get the same key.
    pub fn canonical(&self, terms: &TermStore) -> (TriplePattern, u32) {
        let mut mapping: SmallVec<[(u32, u32); 8]> = SmallVec::new();
        let mut rename = |idx: u32| {
            let next = mapping.len() as u32;
            let slot = match mapping.iter().find(|(from, _)| *from == idx) {
                Some((_, to)) => *to,
                None => {
                    mapping.push((idx, next));
                    next
                }
            };
            terms.var(slot)
        };
        let canonical = TriplePattern::new(
            terms.map_vars(self.subject, &mut rename),
            terms.map_vars(self.predicate, &mut rename),
            terms.map_vars(self.object, &mut rename),
        );
        (canonical, mapping.len() as u32)
    }

    pub fn display<'a>(&'a self, terms: &'a TermStore) -> TripleDisplay<'a> {
        TripleDisplay {
            nodes: self.nodes(),
            terms,
        }
    }
}

impl From<Triple> for TriplePattern {
    fn from(t: Triple) -> Self {
        t.as_pattern()
    }
}

pub struct TripleDisplay<'a> {
    nodes: [TermId; 3],
    terms: &'a TermStore,
}

impl fmt::Display for TripleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} {} {})",
            format_term(self.nodes[0], self.terms),
            format_term(self.nodes[1], self.terms),
            format_term(self.nodes[2], self.terms)
        )
    }
}

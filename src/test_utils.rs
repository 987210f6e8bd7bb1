use crate::graph::MemGraph;
use crate::rule::{ClauseEntry, Rule};
use crate::term::{TermId, TermStore};
use crate::triple::{Triple, TriplePattern};
use std::sync::Arc;

pub(crate) fn setup() -> Arc<TermStore> {
    Arc::new(TermStore::new())
}

/// `ex:`-prefixed IRI.
pub(crate) fn ex(terms: &TermStore, local: &str) -> TermId {
    terms.iri(&format!("ex:{}", local))
}

pub(crate) fn triple(terms: &TermStore, s: &str, p: &str, o: &str) -> Triple {
    Triple::new(ex(terms, s), ex(terms, p), ex(terms, o))
}

/// Pattern where `?N` positions become variables and anything else an
/// `ex:` IRI.
pub(crate) fn pattern(terms: &TermStore, s: &str, p: &str, o: &str) -> TriplePattern {
    let node = |text: &str| match text.strip_prefix('?') {
        Some(n) => terms.var(n.parse().unwrap()),
        None => ex(terms, text),
    };
    TriplePattern::new(node(s), node(p), node(o))
}

pub(crate) fn clause(terms: &TermStore, s: &str, p: &str, o: &str) -> ClauseEntry {
    pattern(terms, s, p, o).into()
}

pub(crate) fn graph_of(triples: &[Triple]) -> MemGraph {
    let mut graph = MemGraph::new();
    for &t in triples {
        graph.add(t);
    }
    graph
}

/// `(?0 type Employee) -> (?0 type Person)`
pub(crate) fn employee_rule(terms: &TermStore) -> Rule {
    Rule::forward(
        "employee-person",
        vec![clause(terms, "?0", "type", "Employee")],
        vec![clause(terms, "?0", "type", "Person")],
        terms,
    )
}

/// `(?0 p ?1) (?1 p ?2) -> (?0 p ?2)`
pub(crate) fn transitive_rule(terms: &TermStore, p: &str) -> Rule {
    Rule::forward(
        format!("{}-transitive", p),
        vec![clause(terms, "?0", p, "?1"), clause(terms, "?1", p, "?2")],
        vec![clause(terms, "?0", p, "?2")],
        terms,
    )
}

/// `ancestor(X,Y) <- parent(X,Y)` and
/// `ancestor(X,Y) <- parent(X,Z), ancestor(Z,Y)`.
pub(crate) fn ancestor_rules(terms: &TermStore) -> Vec<Rule> {
    vec![
        Rule::backward(
            "ancestor-base",
            vec![clause(terms, "?0", "parent", "?1")],
            vec![clause(terms, "?0", "ancestor", "?1")],
            terms,
        ),
        Rule::backward(
            "ancestor-step",
            vec![
                clause(terms, "?0", "parent", "?2"),
                clause(terms, "?2", "ancestor", "?1"),
            ],
            vec![clause(terms, "?0", "ancestor", "?1")],
            terms,
        ),
    ]
}

pub(crate) fn sorted(mut triples: Vec<Triple>) -> Vec<Triple> {
    triples.sort();
    triples
}

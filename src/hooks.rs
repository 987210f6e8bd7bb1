//! Preprocessing hooks.
//!
//! A hook runs once per preparation, before either engine starts. It reads
//! the base facts and writes axioms (and optionally extra rules) into a
//! [`PreprocessSink`]. After an incremental add, the owning graph asks each
//! hook whether the new triple invalidates its output; if so the graph is
//! re-prepared from scratch.

use crate::error::ReasonerError;
use crate::graph::{DeductionSink, Finder};
use crate::rule::{ClauseEntry, Rule};
use crate::term::{format_term, Term, TermId, TermStore};
use crate::trace::debug;
use crate::triple::{Triple, TriplePattern};
use crate::vocab;
use rustc_hash::FxHashSet;

pub trait PreprocessHook: Send + Sync {
    fn name(&self) -> &str;

    /// Scan `graph` and write derived axioms and rules into `sink`.
    fn run(
        &self,
        graph: &dyn Finder,
        terms: &TermStore,
        sink: &mut PreprocessSink,
    ) -> Result<(), ReasonerError>;

    /// True if adding `triple` makes the previous output stale.
    fn needs_rerun(&self, graph: &dyn Finder, triple: &Triple, terms: &TermStore) -> bool;
}

/// Output of a preprocessing pass: de-duplicated triples in insertion order
/// plus any rules the hooks contributed.
#[derive(Debug, Default)]
pub struct PreprocessSink {
    triples: Vec<Triple>,
    seen: FxHashSet<Triple>,
    rules: Vec<Rule>,
}

impl PreprocessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn into_parts(self) -> (Vec<Triple>, Vec<Rule>) {
        (self.triples, self.rules)
    }
}

impl DeductionSink for PreprocessSink {
    fn add_deduction(&mut self, triple: Triple) -> bool {
        if self.seen.insert(triple) {
            self.triples.push(triple);
            true
        } else {
            false
        }
    }

    fn delete(&mut self, triple: &Triple) -> bool {
        if self.seen.remove(triple) {
            self.triples.retain(|t| t != triple);
            true
        } else {
            false
        }
    }
}

fn is_membership_property(id: TermId, terms: &TermStore) -> bool {
    if !matches!(terms.resolve(id), Some(Term::Iri(_))) {
        return false;
    }
    terms
        .label(id)
        .is_some_and(|iri| vocab::membership_index(&iri).is_some())
}

/// Types every container membership property `rdf:_n` in use as an
/// `rdfs:ContainerMembershipProperty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerMembershipHook;

impl PreprocessHook for ContainerMembershipHook {
    fn name(&self) -> &str {
        "container-membership"
    }

    fn run(
        &self,
        graph: &dyn Finder,
        terms: &TermStore,
        sink: &mut PreprocessSink,
    ) -> Result<(), ReasonerError> {
        let rdf_type = terms.iri(vocab::RDF_TYPE);
        let cmp = terms.iri(vocab::RDFS_CONTAINER_MEMBERSHIP_PROPERTY);
        let property = terms.iri(vocab::RDF_PROPERTY);

        let mut found = 0usize;
        for triple in graph.find(None, None, None) {
            if is_membership_property(triple.predicate, terms)
                && sink.add_deduction(Triple::new(triple.predicate, rdf_type, cmp))
            {
                found += 1;
            }
        }
        for triple in graph.find(None, Some(rdf_type), Some(property)) {
            if is_membership_property(triple.subject, terms)
                && sink.add_deduction(Triple::new(triple.subject, rdf_type, cmp))
            {
                found += 1;
            }
        }
        debug!(hook = self.name(), found, "preprocessing hook ran");
        Ok(())
    }

    fn needs_rerun(&self, _graph: &dyn Finder, triple: &Triple, terms: &TermStore) -> bool {
        if is_membership_property(triple.predicate, terms) {
            return true;
        }
        let rdf_type = terms.iri(vocab::RDF_TYPE);
        let property = terms.iri(vocab::RDF_PROPERTY);
        triple.predicate == rdf_type
            && triple.object == property
            && is_membership_property(triple.subject, terms)
    }
}

/// Translates `C owl:intersectionOf (D1 .. Dn)` into an implication rule
/// `(?x type C) -> (?x type D1) .. (?x type Dn)` and a recognition rule
/// `(?x type C) <- (?x type D1) .. (?x type Dn)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntersectionHook;

impl IntersectionHook {
    /// Elements of the list headed by `head`, in order.
    fn walk_list(
        head: TermId,
        graph: &dyn Finder,
        terms: &TermStore,
    ) -> Result<Vec<TermId>, ReasonerError> {
        let first = terms.iri(vocab::RDF_FIRST);
        let rest = terms.iri(vocab::RDF_REST);
        let nil = terms.iri(vocab::RDF_NIL);

        let mut elements = Vec::new();
        let mut visited = FxHashSet::default();
        let mut node = head;
        while node != nil {
            let malformed = |reason: String| ReasonerError::MalformedList { reason };
            if terms.is_literal(node) {
                return Err(malformed(format!(
                    "list node {} is a literal",
                    format_term(node, terms)
                )));
            }
            if !visited.insert(node) {
                return Err(malformed(format!(
                    "list through {} is cyclic",
                    format_term(node, terms)
                )));
            }
            let element = graph
                .find(Some(node), Some(first), None)
                .next()
                .ok_or_else(|| {
                    malformed(format!("list node {} has no rdf:first", format_term(node, terms)))
                })?;
            let next = graph
                .find(Some(node), Some(rest), None)
                .next()
                .ok_or_else(|| {
                    malformed(format!("list node {} has no rdf:rest", format_term(node, terms)))
                })?;
            elements.push(element.object);
            node = next.object;
        }
        Ok(elements)
    }
}

impl PreprocessHook for IntersectionHook {
    fn name(&self) -> &str {
        "intersection-translation"
    }

    fn run(
        &self,
        graph: &dyn Finder,
        terms: &TermStore,
        sink: &mut PreprocessSink,
    ) -> Result<(), ReasonerError> {
        let rdf_type = terms.iri(vocab::RDF_TYPE);
        let intersection_of = terms.iri(vocab::OWL_INTERSECTION_OF);
        let x = terms.var(0);

        let definitions: Vec<Triple> = graph.find(None, Some(intersection_of), None).collect();
        for def in &definitions {
            let class = def.subject;
            let members = Self::walk_list(def.object, graph, terms)?;
            if members.is_empty() {
                continue;
            }
            let label = format_term(class, terms);
            let member_clauses: Vec<ClauseEntry> = members
                .iter()
                .map(|&d| TriplePattern::new(x, rdf_type, d).into())
                .collect();
            let class_clause: ClauseEntry = TriplePattern::new(x, rdf_type, class).into();

            sink.add_rule(Rule::forward(
                format!("intersection-implies {}", label),
                vec![class_clause.clone()],
                member_clauses.clone(),
                terms,
            ));
            sink.add_rule(Rule::backward(
                format!("intersection-recognises {}", label),
                member_clauses,
                vec![class_clause],
                terms,
            ));
        }
        debug!(
            hook = self.name(),
            classes = definitions.len(),
            "preprocessing hook ran"
        );
        Ok(())
    }

    fn needs_rerun(&self, _graph: &dyn Finder, triple: &Triple, terms: &TermStore) -> bool {
        triple.predicate == terms.iri(vocab::OWL_INTERSECTION_OF)
    }
}

#[cfg(test)]
#[path = "tests/hooks.rs"]
mod tests;

//! Non-incremental forward engine.
//!
//! Each new triple is matched against every body pattern that could accept
//! it; the rest of the body is then solved by lookups against the fact
//! base, most-bound pattern first. No partial matches are kept between
//! triples, so deletion is not supported: the owning graph re-prepares
//! instead.

use crate::builtin::BuiltinRegistry;
use crate::context::{BufferedContext, RuleContext};
use crate::error::ReasonerError;
use crate::graph::{FactBase, Finder};
use crate::metrics::EngineMetrics;
use crate::rule::{ClauseEntry, Rule};
use crate::term::{TermId, TermStore};
use crate::trace::{debug, warn};
use crate::triple::Triple;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// (rule index, body index) of a pattern that can match a triple.
type ClauseRef = (usize, usize);

pub struct ScanEngine {
    terms: Arc<TermStore>,
    builtins: Arc<BuiltinRegistry>,
    metrics: Arc<EngineMetrics>,
    rules: Vec<Arc<Rule>>,
    by_predicate: FxHashMap<TermId, Vec<ClauseRef>>,
    wildcard: Vec<ClauseRef>,
}

impl ScanEngine {
    pub fn new(
        terms: Arc<TermStore>,
        builtins: Arc<BuiltinRegistry>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            terms,
            builtins,
            metrics,
            rules: Vec::new(),
            by_predicate: FxHashMap::default(),
            wildcard: Vec::new(),
        }
    }

    /// Index `rules`, fire axioms and derive the closure of `facts`.
    pub fn init(&mut self, rules: &[Arc<Rule>], facts: &mut FactBase) -> Result<(), ReasonerError> {
        self.rules = rules.iter().filter(|r| !r.is_backward()).cloned().collect();
        self.by_predicate.clear();
        self.wildcard.clear();
        for (r, rule) in self.rules.iter().enumerate() {
            for (i, clause) in rule.body().iter().enumerate() {
                let ClauseEntry::Pattern(p) = clause else {
                    continue;
                };
                match p.ground_predicate(&self.terms) {
                    Some(pred) => self.by_predicate.entry(pred).or_default().push((r, i)),
                    None => self.wildcard.push((r, i)),
                }
            }
        }

        let seeds: Vec<Triple> = facts.find(None, None, None).collect();
        let terms = self.terms.clone();
        let mut ctx = BufferedContext::new(facts, &terms);
        for rule in self.rules.iter().filter(|r| r.is_axiom()) {
            ctx.begin(rule.clone());
            self.fire(rule, &mut ctx)?;
            ctx.flush();
        }
        for triple in seeds {
            ctx.push_triple(triple);
        }
        self.run(&mut ctx);
        debug!(rules = self.rules.len(), "scan engine initialised");
        Ok(())
    }

    /// Derive the consequences of a triple just added to the base graph.
    pub fn add(&self, triple: Triple, facts: &mut FactBase) {
        let terms = self.terms.clone();
        let mut ctx = BufferedContext::new(facts, &terms);
        ctx.push_triple(triple);
        self.run(&mut ctx);
    }

    fn run(&self, ctx: &mut BufferedContext<'_>) {
        while let Some(triple) = ctx.next_triple() {
            self.metrics.record_injection();
            let indexed = self
                .by_predicate
                .get(&triple.predicate)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            for &(r, i) in indexed.iter().chain(self.wildcard.iter()) {
                let rule = &self.rules[r];
                let Some(pattern) = rule.body()[i].as_pattern() else {
                    continue;
                };
                ctx.begin(rule.clone());
                if !ctx.env_mut().match_triple(pattern, &triple, &self.terms) {
                    continue;
                }
                let remaining: SmallVec<[usize; 4]> = rule
                    .body()
                    .iter()
                    .enumerate()
                    .filter(|&(j, c)| j != i && c.as_pattern().is_some())
                    .map(|(j, _)| j)
                    .collect();
                self.match_rest(rule, &remaining, ctx);
                ctx.flush();
            }
        }
    }

    fn match_rest(&self, rule: &Rule, remaining: &[usize], ctx: &mut BufferedContext<'_>) {
        if remaining.is_empty() {
            if let Err(err) = self.fire(rule, ctx) {
                warn!(rule = rule.name(), error = %err, "head action failed");
            }
            return;
        }

        // Most-bound pattern first.
        let picked = remaining
            .iter()
            .enumerate()
            .filter_map(|(k, &j)| {
                let p = rule.body()[j].as_pattern()?;
                Some((k, ctx.env().resolve_pattern(p, &self.terms)))
            })
            .max_by_key(|(k, p)| {
                let bound = p.lookup_key(&self.terms).iter().filter(|n| n.is_some()).count();
                (bound, std::cmp::Reverse(*k))
            });
        let Some((pick, pattern)) = picked else {
            return;
        };

        let rest: SmallVec<[usize; 4]> = remaining
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != pick)
            .map(|(_, &j)| j)
            .collect();
        let candidates: Vec<Triple> = ctx.facts().find_pattern(&pattern, &self.terms).collect();
        for triple in candidates {
            let mark = ctx.env().checkpoint();
            if ctx.env_mut().match_triple(&pattern, &triple, &self.terms) {
                self.match_rest(rule, &rest, ctx);
            }
            ctx.env_mut().rollback(mark);
        }
    }

    /// Run guards and stage the head of `rule` under the current bindings.
    fn fire(&self, rule: &Rule, ctx: &mut BufferedContext<'_>) -> Result<(), ReasonerError> {
        for clause in rule.body() {
            let ClauseEntry::Functor(call) = clause else {
                continue;
            };
            match self.builtins.call_body(call, ctx) {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(err) => {
                    warn!(
                        rule = rule.name(),
                        builtin = %call.name,
                        error = %err,
                        "guard failed, skipping binding"
                    );
                    self.metrics.record_guard_error();
                    return Ok(());
                }
            }
        }
        self.metrics.record_rule_fired();
        for clause in rule.head() {
            match clause {
                ClauseEntry::Pattern(p) => match ctx.env().ground_triple(p, &self.terms) {
                    Some(triple) if !self.terms.is_literal(triple.subject) => ctx.stage_add(triple),
                    Some(_) => {}
                    None => warn!(rule = rule.name(), "head pattern left unbound"),
                },
                ClauseEntry::Functor(call) => {
                    self.builtins.run_action(call, ctx).map_err(|source| {
                        ReasonerError::BuiltinFailure {
                            name: call.name.clone(),
                            source,
                        }
                    })?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemGraph;
    use crate::rule::Functor;
    use crate::triple::TriplePattern;

    fn setup() -> (Arc<TermStore>, ScanEngine) {
        let terms = Arc::new(TermStore::new());
        let engine = ScanEngine::new(
            terms.clone(),
            Arc::new(BuiltinRegistry::standard()),
            Arc::new(EngineMetrics::new()),
        );
        (terms, engine)
    }

    #[test]
    fn transitive_closure() {
        let (terms, mut engine) = setup();
        let p = terms.iri("ex:p");
        let (a, b, c, d) = (terms.iri("ex:a"), terms.iri("ex:b"), terms.iri("ex:c"), terms.iri("ex:d"));
        let rule = Arc::new(Rule::forward(
            "trans",
            vec![
                TriplePattern::new(terms.var(0), p, terms.var(1)).into(),
                TriplePattern::new(terms.var(1), p, terms.var(2)).into(),
            ],
            vec![TriplePattern::new(terms.var(0), p, terms.var(2)).into()],
            &terms,
        ));
        let mut base = MemGraph::new();
        base.add(Triple::new(a, p, b));
        base.add(Triple::new(b, p, c));
        let mut facts = FactBase::new(base);
        engine.init(&[rule], &mut facts).unwrap();
        assert!(facts.contains(&Triple::new(a, p, c)));
        assert_eq!(facts.deductions.len(), 1);

        facts.base.add(Triple::new(c, p, d));
        engine.add(Triple::new(c, p, d), &mut facts);
        assert!(facts.contains(&Triple::new(a, p, d)));
        assert!(facts.contains(&Triple::new(b, p, d)));
        assert_eq!(facts.deductions.len(), 3);
    }

    #[test]
    fn guard_error_skips_binding() {
        let (terms, mut engine) = setup();
        let val = terms.iri("ex:val");
        let ratio = terms.iri("ex:ratio");
        let rule = Arc::new(Rule::forward(
            "ratio",
            vec![
                TriplePattern::new(terms.var(0), val, terms.var(1)).into(),
                Functor::new("quotient", [terms.int(10), terms.var(1), terms.var(2)]).into(),
            ],
            vec![TriplePattern::new(terms.var(0), ratio, terms.var(2)).into()],
            &terms,
        ));
        let mut base = MemGraph::new();
        base.add(Triple::new(terms.iri("ex:a"), val, terms.int(2)));
        base.add(Triple::new(terms.iri("ex:b"), val, terms.int(0)));
        let mut facts = FactBase::new(base);
        engine.init(&[rule], &mut facts).unwrap();
        assert!(facts.contains(&Triple::new(terms.iri("ex:a"), ratio, terms.int(5))));
        assert_eq!(facts.deductions.len(), 1);
        assert_eq!(engine.metrics.report().guard_errors, 1);
    }

    #[test]
    fn axiom_is_asserted() {
        let (terms, mut engine) = setup();
        let t = Triple::new(terms.iri("ex:a"), terms.iri("ex:p"), terms.iri("ex:b"));
        let axiom = Arc::new(Rule::forward("ax", vec![], vec![t.as_pattern().into()], &terms));
        let mut facts = FactBase::default();
        engine.init(&[axiom], &mut facts).unwrap();
        assert!(facts.deductions.contains_triple(&t));
    }
}

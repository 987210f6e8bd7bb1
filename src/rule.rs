//! Rule representation and validation.
//!
//! Rules are built as data: a body and a head of [`ClauseEntry`] values whose
//! variables are `Var(i)` nodes numbered locally from zero. Rule text parsing
//! is left to callers.

use crate::builtin::BuiltinRegistry;
use crate::error::ReasonerError;
use crate::term::{TermId, TermStore};
use crate::triple::TriplePattern;
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Body matches produce head triples eagerly.
    Forward,
    /// Head patterns are goals solved on demand from the body.
    Backward,
}

/// A builtin call: a name applied to argument nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Functor {
    pub name: String,
    pub args: SmallVec<[TermId; 4]>,
}

impl Functor {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = TermId>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClauseEntry {
    Pattern(TriplePattern),
    Functor(Functor),
}

impl ClauseEntry {
    pub fn as_pattern(&self) -> Option<&TriplePattern> {
        match self {
            ClauseEntry::Pattern(p) => Some(p),
            ClauseEntry::Functor(_) => None,
        }
    }

    fn collect_vars(&self, terms: &TermStore, out: &mut SmallVec<[u32; 8]>) {
        match self {
            ClauseEntry::Pattern(p) => {
                for node in p.nodes() {
                    terms.collect_vars(node, out);
                }
            }
            ClauseEntry::Functor(f) => {
                for &arg in &f.args {
                    terms.collect_vars(arg, out);
                }
            }
        }
    }
}

impl From<TriplePattern> for ClauseEntry {
    fn from(p: TriplePattern) -> Self {
        ClauseEntry::Pattern(p)
    }
}

impl From<Functor> for ClauseEntry {
    fn from(f: Functor) -> Self {
        ClauseEntry::Functor(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    name: String,
    body: Vec<ClauseEntry>,
    head: Vec<ClauseEntry>,
    direction: Direction,
    num_vars: usize,
}

impl Rule {
    /// Build a rule; the variable count is taken from the highest slot used.
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        body: Vec<ClauseEntry>,
        head: Vec<ClauseEntry>,
        terms: &TermStore,
    ) -> Self {
        let mut vars = SmallVec::new();
        for clause in body.iter().chain(head.iter()) {
            clause.collect_vars(terms, &mut vars);
        }
        let num_vars = vars.iter().map(|&v| v as usize + 1).max().unwrap_or(0);
        Self {
            name: name.into(),
            body,
            head,
            direction,
            num_vars,
        }
    }

    pub fn forward(
        name: impl Into<String>,
        body: Vec<ClauseEntry>,
        head: Vec<ClauseEntry>,
        terms: &TermStore,
    ) -> Self {
        Self::new(name, Direction::Forward, body, head, terms)
    }

    pub fn backward(
        name: impl Into<String>,
        body: Vec<ClauseEntry>,
        head: Vec<ClauseEntry>,
        terms: &TermStore,
    ) -> Self {
        Self::new(name, Direction::Backward, body, head, terms)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &[ClauseEntry] {
        &self.body
    }

    pub fn head(&self) -> &[ClauseEntry] {
        &self.head
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_backward(&self) -> bool {
        self.direction == Direction::Backward
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// Forward rule with no body: its head is asserted once at startup.
    pub fn is_axiom(&self) -> bool {
        self.direction == Direction::Forward && self.body.is_empty()
    }

    /// Number of triple patterns in the body.
    pub fn pattern_count(&self) -> usize {
        self.body.iter().filter(|c| c.as_pattern().is_some()).count()
    }

    /// Body index of the `n`th triple pattern.
    pub fn pattern_position(&self, body_index: usize) -> Option<usize> {
        match self.body.get(body_index)? {
            ClauseEntry::Pattern(_) => Some(
                self.body[..body_index]
                    .iter()
                    .filter(|c| c.as_pattern().is_some())
                    .count(),
            ),
            ClauseEntry::Functor(_) => None,
        }
    }

    /// True if any head builtin is non-monotonic (it can remove facts).
    pub fn is_monotonic(&self, builtins: &BuiltinRegistry) -> bool {
        self.head.iter().all(|c| match c {
            ClauseEntry::Functor(f) => builtins.get(&f.name).map_or(true, |b| b.is_monotonic()),
            ClauseEntry::Pattern(_) => true,
        })
    }

    /// Reject rules that cannot run: unknown builtins, head variables no
    /// body clause can bind, backward rules without a usable head.
    pub fn validate(
        &self,
        terms: &TermStore,
        builtins: &BuiltinRegistry,
    ) -> Result<(), ReasonerError> {
        for clause in self.body.iter().chain(self.head.iter()) {
            if let ClauseEntry::Functor(f) = clause {
                let Some(builtin) = builtins.get(&f.name) else {
                    return Err(ReasonerError::UndefinedBuiltin {
                        name: f.name.clone(),
                        rule: self.name.clone(),
                    });
                };
                if let Some(expected) = builtin.arity() {
                    if expected != f.args.len() {
                        return Err(self.malformed(format!(
                            "{} expects {} arguments, found {}",
                            f.name,
                            expected,
                            f.args.len()
                        )));
                    }
                }
            }
        }

        match self.direction {
            Direction::Forward => {
                let mut bound = SmallVec::new();
                for clause in &self.body {
                    clause.collect_vars(terms, &mut bound);
                }
                for clause in &self.head {
                    if let ClauseEntry::Pattern(p) = clause {
                        if let Some(v) = p.vars(terms).into_iter().find(|v| !bound.contains(v)) {
                            return Err(self.malformed(format!(
                                "head variable ?{} is not bound by the body",
                                v
                            )));
                        }
                    }
                }
            }
            Direction::Backward => {
                if self.head.is_empty() {
                    return Err(self.malformed("backward rule has no head".to_string()));
                }
                if self.head.iter().any(|c| c.as_pattern().is_none()) {
                    return Err(
                        self.malformed("backward rule heads must be triple patterns".to_string())
                    );
                }
            }
        }
        Ok(())
    }

    fn malformed(&self, reason: String) -> ReasonerError {
        ReasonerError::MalformedRule {
            rule: self.name.clone(),
            reason,
        }
    }

    pub fn display<'a>(&'a self, terms: &'a TermStore) -> RuleDisplay<'a> {
        RuleDisplay { rule: self, terms }
    }
}

pub struct RuleDisplay<'a> {
    rule: &'a Rule,
    terms: &'a TermStore,
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |clauses: &[ClauseEntry]| -> String {
            clauses
                .iter()
                .map(|c| match c {
                    ClauseEntry::Pattern(p) => p.display(self.terms).to_string(),
                    ClauseEntry::Functor(func) => format!(
                        "{}({})",
                        func.name,
                        func.args
                            .iter()
                            .map(|&a| crate::term::format_term(a, self.terms))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let arrow = match self.rule.direction {
            Direction::Forward => "->",
            Direction::Backward => "<-",
        };
        match self.rule.direction {
            Direction::Forward => write!(
                f,
                "[{}: {} {} {}]",
                self.rule.name,
                render(&self.rule.body),
                arrow,
                render(&self.rule.head)
            ),
            Direction::Backward => write!(
                f,
                "[{}: {} {} {}]",
                self.rule.name,
                render(&self.rule.head),
                arrow,
                render(&self.rule.body)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(terms: &TermStore, s: TermId, p: &str, o: TermId) -> ClauseEntry {
        ClauseEntry::Pattern(TriplePattern::new(s, terms.iri(p), o))
    }

    #[test]
    fn num_vars_from_highest_slot() {
        let terms = TermStore::new();
        let rule = Rule::forward(
            "r",
            vec![pat(&terms, terms.var(0), "ex:p", terms.var(3))],
            vec![pat(&terms, terms.var(3), "ex:q", terms.var(0))],
            &terms,
        );
        assert_eq!(rule.num_vars(), 4);
        assert!(!rule.is_axiom());
    }

    #[test]
    fn unbound_head_variable_rejected() {
        let terms = TermStore::new();
        let builtins = BuiltinRegistry::standard();
        let rule = Rule::forward(
            "bad",
            vec![pat(&terms, terms.var(0), "ex:p", terms.iri("ex:a"))],
            vec![pat(&terms, terms.var(0), "ex:q", terms.var(1))],
            &terms,
        );
        let err = rule.validate(&terms, &builtins).unwrap_err();
        assert!(matches!(err, ReasonerError::MalformedRule { .. }));
    }

    #[test]
    fn undefined_builtin_rejected() {
        let terms = TermStore::new();
        let builtins = BuiltinRegistry::standard();
        let rule = Rule::forward(
            "r",
            vec![
                pat(&terms, terms.var(0), "ex:p", terms.var(1)),
                ClauseEntry::Functor(Functor::new("frobnicate", [terms.var(1)])),
            ],
            vec![pat(&terms, terms.var(0), "ex:q", terms.var(1))],
            &terms,
        );
        let err = rule.validate(&terms, &builtins).unwrap_err();
        assert_eq!(
            err,
            ReasonerError::UndefinedBuiltin {
                name: "frobnicate".into(),
                rule: "r".into()
            }
        );
    }

    #[test]
    fn builtin_arity_checked() {
        let terms = TermStore::new();
        let builtins = BuiltinRegistry::standard();
        let rule = Rule::forward(
            "r",
            vec![
                pat(&terms, terms.var(0), "ex:p", terms.var(1)),
                ClauseEntry::Functor(Functor::new("lessThan", [terms.var(1)])),
            ],
            vec![pat(&terms, terms.var(0), "ex:q", terms.var(1))],
            &terms,
        );
        assert!(matches!(
            rule.validate(&terms, &builtins),
            Err(ReasonerError::MalformedRule { .. })
        ));
    }

    #[test]
    fn backward_rule_may_leave_head_vars_to_caller() {
        let terms = TermStore::new();
        let builtins = BuiltinRegistry::standard();
        let rule = Rule::backward(
            "refl",
            vec![],
            vec![pat(&terms, terms.var(0), "ex:same", terms.var(0))],
            &terms,
        );
        assert!(rule.validate(&terms, &builtins).is_ok());
    }

    #[test]
    fn backward_rule_needs_pattern_head() {
        let terms = TermStore::new();
        let builtins = BuiltinRegistry::standard();
        let rule = Rule::backward(
            "r",
            vec![pat(&terms, terms.var(0), "ex:p", terms.var(1))],
            vec![ClauseEntry::Functor(Functor::new("print", [terms.var(0)]))],
            &terms,
        );
        assert!(rule.validate(&terms, &builtins).is_err());
    }

    #[test]
    fn remove_makes_rule_non_monotonic() {
        let terms = TermStore::new();
        let builtins = BuiltinRegistry::standard();
        let rule = Rule::forward(
            "r",
            vec![pat(&terms, terms.var(0), "ex:p", terms.var(1))],
            vec![ClauseEntry::Functor(Functor::new("remove", [terms.int(0)]))],
            &terms,
        );
        assert!(!rule.is_monotonic(&builtins));
    }

    #[test]
    fn pattern_position_skips_functors() {
        let terms = TermStore::new();
        let rule = Rule::forward(
            "r",
            vec![
                pat(&terms, terms.var(0), "ex:p", terms.var(1)),
                ClauseEntry::Functor(Functor::new("notEqual", [terms.var(0), terms.var(1)])),
                pat(&terms, terms.var(1), "ex:p", terms.var(2)),
            ],
            vec![pat(&terms, terms.var(0), "ex:q", terms.var(2))],
            &terms,
        );
        assert_eq!(rule.pattern_position(2), Some(1));
        assert_eq!(rule.pattern_position(1), None);
        assert_eq!(rule.pattern_count(), 2);
    }

    #[test]
    fn display_forward_rule() {
        let terms = TermStore::new();
        let rule = Rule::forward(
            "emp",
            vec![pat(&terms, terms.var(0), "ex:type", terms.iri("ex:Employee"))],
            vec![pat(&terms, terms.var(0), "ex:type", terms.iri("ex:Person"))],
            &terms,
        );
        assert_eq!(
            rule.display(&terms).to_string(),
            "[emp: (?0 ex:type ex:Employee) -> (?0 ex:type ex:Person)]"
        );
    }
}

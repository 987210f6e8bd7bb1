use proptest::prelude::*;
use rulesys::graph::MemGraph;
use rulesys::{InfGraph, ReasonerConfig, Rule, TermStore, Triple, TriplePattern};
use std::collections::BTreeSet;
use std::sync::Arc;

const PREDICATES: usize = 3;
const NODES: usize = 4;

#[derive(Clone, Debug)]
enum RawRule {
    /// `p_head(x, y) <- p_body(x, y)`
    Copy { head: usize, body: usize },
    /// `p_head(x, y) <- p_left(x, z), p_right(z, y)`
    Join {
        head: usize,
        left: usize,
        right: usize,
    },
}

fn raw_rule_strategy() -> impl Strategy<Value = RawRule> {
    prop_oneof![
        (0..PREDICATES, 0..PREDICATES).prop_map(|(head, body)| RawRule::Copy { head, body }),
        (0..PREDICATES, 0..PREDICATES, 0..PREDICATES)
            .prop_map(|(head, left, right)| RawRule::Join { head, left, right }),
    ]
}

type Fact = (usize, usize, usize);

fn fact_strategy() -> impl Strategy<Value = Fact> {
    (0..NODES, 0..PREDICATES, 0..NODES)
}

/// Forward fixpoint over plain tuples.
fn naive_closure(rules: &[RawRule], facts: &[Fact]) -> BTreeSet<Fact> {
    let mut known: BTreeSet<Fact> = facts.iter().copied().collect();
    loop {
        let mut added = Vec::new();
        for rule in rules {
            match *rule {
                RawRule::Copy { head, body } => {
                    for &(s, p, o) in &known {
                        if p == body {
                            added.push((s, head, o));
                        }
                    }
                }
                RawRule::Join { head, left, right } => {
                    for &(s, p, m) in &known {
                        if p != left {
                            continue;
                        }
                        for &(m2, q, o) in &known {
                            if q == right && m2 == m {
                                added.push((s, head, o));
                            }
                        }
                    }
                }
            }
        }
        let before = known.len();
        known.extend(added);
        if known.len() == before {
            return known;
        }
    }
}

struct World {
    terms: Arc<TermStore>,
}

impl World {
    fn new() -> Self {
        Self {
            terms: Arc::new(TermStore::new()),
        }
    }

    fn node(&self, i: usize) -> rulesys::TermId {
        self.terms.iri(&format!("ex:n{}", i))
    }

    fn pred(&self, i: usize) -> rulesys::TermId {
        self.terms.iri(&format!("ex:p{}", i))
    }

    fn triple(&self, (s, p, o): Fact) -> Triple {
        Triple::new(self.node(s), self.pred(p), self.node(o))
    }

    fn rule(&self, index: usize, raw: &RawRule) -> Rule {
        let v = |i| self.terms.var(i);
        match *raw {
            RawRule::Copy { head, body } => Rule::backward(
                format!("copy-{}", index),
                vec![TriplePattern::new(v(0), self.pred(body), v(1)).into()],
                vec![TriplePattern::new(v(0), self.pred(head), v(1)).into()],
                &self.terms,
            ),
            RawRule::Join { head, left, right } => Rule::backward(
                format!("join-{}", index),
                vec![
                    TriplePattern::new(v(0), self.pred(left), v(2)).into(),
                    TriplePattern::new(v(2), self.pred(right), v(1)).into(),
                ],
                vec![TriplePattern::new(v(0), self.pred(head), v(1)).into()],
                &self.terms,
            ),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tabled_answers_match_fixpoint(
        raw_rules in prop::collection::vec(raw_rule_strategy(), 1..5),
        facts in prop::collection::vec(fact_strategy(), 0..8),
        subject in 0..NODES,
        predicate in 0..PREDICATES,
        check_interval in 0usize..3,
    ) {
        let world = World::new();
        let mut base = MemGraph::new();
        for &f in &facts {
            base.add(world.triple(f));
        }
        let rules: Vec<Rule> = raw_rules
            .iter()
            .enumerate()
            .map(|(i, r)| world.rule(i, r))
            .collect();
        let config = ReasonerConfig {
            completion_check_interval: check_interval,
            ..ReasonerConfig::default()
        };
        let graph = InfGraph::new(world.terms.clone(), base, rules, config).unwrap();

        let goal = TriplePattern::new(world.node(subject), world.pred(predicate), world.terms.var(0));
        let found: BTreeSet<Triple> = graph.find_all(&goal).unwrap().into_iter().collect();
        let expected: BTreeSet<Triple> = naive_closure(&raw_rules, &facts)
            .into_iter()
            .filter(|&(s, p, _)| s == subject && p == predicate)
            .map(|f| world.triple(f))
            .collect();

        prop_assert_eq!(found, expected);
        prop_assert_eq!(graph.metrics().completion_rate(), 1.0);
    }
}

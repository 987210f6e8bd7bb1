use proptest::prelude::*;
use rulesys::graph::MemGraph;
use rulesys::{InfGraph, ReasonerConfig, Rule, TermId, TermStore, Triple, TriplePattern};
use std::collections::BTreeSet;
use std::sync::Arc;

const NODES: u32 = 6;

fn node(terms: &TermStore, i: u32) -> TermId {
    terms.iri(&format!("ex:n{}", i))
}

fn edge(terms: &TermStore, (s, o): (u32, u32)) -> Triple {
    Triple::new(node(terms, s), terms.iri("ex:p"), node(terms, o))
}

/// `(?0 p ?1) (?1 p ?2) -> (?0 p ?2)` and `(?0 p ?1) -> (?1 q ?0)`.
fn rules(terms: &TermStore) -> Vec<Rule> {
    let p = terms.iri("ex:p");
    let q = terms.iri("ex:q");
    let v = |i| terms.var(i);
    vec![
        Rule::forward(
            "p-transitive",
            vec![
                TriplePattern::new(v(0), p, v(1)).into(),
                TriplePattern::new(v(1), p, v(2)).into(),
            ],
            vec![TriplePattern::new(v(0), p, v(2)).into()],
            terms,
        ),
        Rule::forward(
            "p-inverse",
            vec![TriplePattern::new(v(0), p, v(1)).into()],
            vec![TriplePattern::new(v(1), q, v(0)).into()],
            terms,
        ),
    ]
}

fn build(terms: &Arc<TermStore>, edges: &[(u32, u32)]) -> InfGraph {
    let mut base = MemGraph::new();
    for &e in edges {
        base.add(edge(terms, e));
    }
    InfGraph::new(terms.clone(), base, rules(terms), ReasonerConfig::default()).unwrap()
}

fn closure(graph: &InfGraph, terms: &TermStore) -> BTreeSet<Triple> {
    let any = TriplePattern::new(terms.var(0), terms.var(1), terms.var(2));
    graph.find_data(&any).unwrap().into_iter().collect()
}

fn edges_strategy() -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0..NODES, 0..NODES), 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn incremental_delete_matches_rebuild(
        edges in edges_strategy(),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..4),
    ) {
        let terms = Arc::new(TermStore::new());
        let graph = build(&terms, &edges);
        graph.prepare().unwrap();

        let mut remaining: Vec<(u32, u32)> = edges.clone();
        for pick in picks {
            if remaining.is_empty() {
                break;
            }
            let removed = remaining.swap_remove(pick.index(remaining.len()));
            if !remaining.contains(&removed) {
                graph.delete(&edge(&terms, removed));
            }
        }

        let rebuilt = build(&terms, &remaining);
        prop_assert_eq!(closure(&graph, &terms), closure(&rebuilt, &terms));
    }

    #[test]
    fn delete_then_add_is_identity(
        edges in edges_strategy(),
        pick in any::<prop::sample::Index>(),
    ) {
        let terms = Arc::new(TermStore::new());
        let graph = build(&terms, &edges);
        let before = closure(&graph, &terms);

        let target = edge(&terms, edges[pick.index(edges.len())]);
        graph.delete(&target);
        graph.add(target);
        prop_assert_eq!(closure(&graph, &terms), before);
    }

    #[test]
    fn adding_known_triple_is_noop(edges in edges_strategy(), pick in any::<prop::sample::Index>()) {
        let terms = Arc::new(TermStore::new());
        let graph = build(&terms, &edges);
        let before = closure(&graph, &terms);
        let fired = graph.rules_fired();

        graph.add(edge(&terms, edges[pick.index(edges.len())]));
        prop_assert_eq!(closure(&graph, &terms), before);
        prop_assert_eq!(graph.rules_fired(), fired);
    }
}

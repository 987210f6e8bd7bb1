//! Reasoner benchmarks using Criterion.
//!
//! Run with: `cargo bench`
//!
//! - Forward closure of a transitive property over a chain
//! - Incremental retraction from the middle of that chain
//! - Tabled ancestor queries over a chain of parents

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rulesys::graph::MemGraph;
use rulesys::{InfGraph, ReasonerConfig, Rule, TermStore, Triple, TriplePattern};
use std::sync::Arc;

fn chain(terms: &TermStore, predicate: &str, len: u32) -> MemGraph {
    let p = terms.iri(predicate);
    let mut graph = MemGraph::new();
    for i in 0..len {
        let s = terms.iri(&format!("ex:n{}", i));
        let o = terms.iri(&format!("ex:n{}", i + 1));
        graph.add(Triple::new(s, p, o));
    }
    graph
}

fn transitive(terms: &TermStore) -> Rule {
    let p = terms.iri("ex:p");
    let v = |i| terms.var(i);
    Rule::forward(
        "p-transitive",
        vec![
            TriplePattern::new(v(0), p, v(1)).into(),
            TriplePattern::new(v(1), p, v(2)).into(),
        ],
        vec![TriplePattern::new(v(0), p, v(2)).into()],
        terms,
    )
}

fn ancestor(terms: &TermStore) -> Vec<Rule> {
    let parent = terms.iri("ex:parent");
    let anc = terms.iri("ex:ancestor");
    let v = |i| terms.var(i);
    vec![
        Rule::backward(
            "ancestor-base",
            vec![TriplePattern::new(v(0), parent, v(1)).into()],
            vec![TriplePattern::new(v(0), anc, v(1)).into()],
            terms,
        ),
        Rule::backward(
            "ancestor-step",
            vec![
                TriplePattern::new(v(0), parent, v(2)).into(),
                TriplePattern::new(v(2), anc, v(1)).into(),
            ],
            vec![TriplePattern::new(v(0), anc, v(1)).into()],
            terms,
        ),
    ]
}

fn bench_forward_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_closure");
    for len in [10u32, 25, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let terms = Arc::new(TermStore::new());
                let base = chain(&terms, "ex:p", len);
                let graph = InfGraph::new(
                    terms.clone(),
                    base,
                    vec![transitive(&terms)],
                    ReasonerConfig::default(),
                )
                .unwrap();
                graph.prepare().unwrap();
                black_box(graph.rules_fired())
            })
        });
    }
    group.finish();
}

fn bench_retraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("retraction");
    for len in [10u32, 25] {
        let terms = Arc::new(TermStore::new());
        let graph = InfGraph::new(
            terms.clone(),
            chain(&terms, "ex:p", len),
            vec![transitive(&terms)],
            ReasonerConfig::default(),
        )
        .unwrap();
        graph.prepare().unwrap();
        let p = terms.iri("ex:p");
        let middle = Triple::new(
            terms.iri(&format!("ex:n{}", len / 2)),
            p,
            terms.iri(&format!("ex:n{}", len / 2 + 1)),
        );
        group.bench_with_input(BenchmarkId::from_parameter(len), &middle, |b, &middle| {
            b.iter(|| {
                graph.delete(&middle);
                graph.add(middle);
                black_box(graph.version())
            })
        });
    }
    group.finish();
}

fn bench_tabled_ancestor(c: &mut Criterion) {
    let mut group = c.benchmark_group("tabled_ancestor");
    for len in [10u32, 50, 100] {
        let terms = Arc::new(TermStore::new());
        let graph = InfGraph::new(
            terms.clone(),
            chain(&terms, "ex:parent", len),
            ancestor(&terms),
            ReasonerConfig::default(),
        )
        .unwrap();
        let goal = TriplePattern::new(terms.iri("ex:n0"), terms.iri("ex:ancestor"), terms.var(0));
        group.bench_with_input(BenchmarkId::from_parameter(len), &goal, |b, goal| {
            b.iter(|| {
                // Drop the tables so every iteration solves from scratch.
                graph.reset();
                black_box(graph.find_all(goal).unwrap().len())
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_forward_closure,
    bench_retraction,
    bench_tabled_ancestor
);
criterion_main!(benches);

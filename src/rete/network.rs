//! Compiled match network.
//!
//! Each forward rule becomes a linear chain: one clause filter per body
//! pattern, a pair of sibling join queues for every pattern after the first,
//! and a terminal. A token carries the bindings of a partial match plus its
//! support, the matched triples in body order. Queues key tokens by support,
//! so a remove-token undoes exactly the joins its add-token made, even when
//! two supports produce equal bindings.

use crate::metrics::EngineMetrics;
use crate::rule::{ClauseEntry, Rule};
use crate::subst::BindingEnv;
use crate::term::{TermId, TermStore};
use crate::triple::{Triple, TriplePattern};
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use std::collections::VecDeque;
use std::sync::Arc;

/// Matched triples of a partial or full rule match, in body order.
pub(crate) type Support = SmallVec<[Triple; 4]>;

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub env: BindingEnv,
    pub support: Support,
}

/// A full match reaching a terminal.
#[derive(Debug, Clone)]
pub(crate) struct Activation {
    pub terminal: usize,
    pub token: Token,
    pub is_add: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Queue(usize),
    Terminal(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

#[derive(Debug)]
struct ClauseFilter {
    pattern: TriplePattern,
    num_vars: usize,
    next: Option<Node>,
}

#[derive(Debug)]
struct JoinQueue {
    side: Side,
    sibling: usize,
    /// Slots bound on both sides; tokens join only if these agree.
    shared: SmallVec<[u32; 4]>,
    tokens: FxHashMap<Support, BindingEnv>,
    next: Option<Node>,
}

#[derive(Debug)]
pub(crate) struct Terminal {
    pub rule: Arc<Rule>,
    pub monotonic: bool,
    /// Head triples produced for each support that has fired.
    pub live: FxHashMap<Support, SmallVec<[Triple; 2]>>,
}

#[derive(Clone, Copy)]
enum Tail {
    Filter(usize),
    Queue(usize),
}

#[derive(Debug, Default)]
pub(crate) struct Network {
    filters: Vec<ClauseFilter>,
    queues: Vec<JoinQueue>,
    terminals: Vec<Terminal>,
    by_predicate: FxHashMap<TermId, SmallVec<[usize; 4]>>,
    wildcard: Vec<usize>,
}

impl Network {
    /// Compile rules with at least one body pattern. `monotonic` reports,
    /// per rule, whether it can fire synchronously.
    pub fn compile(
        rules: &[Arc<Rule>],
        terms: &TermStore,
        monotonic: impl Fn(&Rule) -> bool,
    ) -> Network {
        let mut net = Network::default();
        for rule in rules {
            let mut seen: SmallVec<[u32; 8]> = SmallVec::new();
            let mut tail: Option<Tail> = None;
            for clause in rule.body() {
                let ClauseEntry::Pattern(pattern) = clause else {
                    continue;
                };
                let filter = net.filters.len();
                net.filters.push(ClauseFilter {
                    pattern: *pattern,
                    num_vars: rule.num_vars(),
                    next: None,
                });
                match pattern.ground_predicate(terms) {
                    Some(p) => net.by_predicate.entry(p).or_default().push(filter),
                    None => net.wildcard.push(filter),
                }

                let vars = pattern.vars(terms);
                let shared: SmallVec<[u32; 4]> =
                    vars.iter().copied().filter(|v| seen.contains(v)).collect();
                for v in vars {
                    if !seen.contains(&v) {
                        seen.push(v);
                    }
                }

                tail = Some(match tail {
                    None => Tail::Filter(filter),
                    Some(prev) => {
                        let left = net.queues.len();
                        let right = left + 1;
                        net.queues.push(JoinQueue {
                            side: Side::Left,
                            sibling: right,
                            shared: shared.clone(),
                            tokens: FxHashMap::default(),
                            next: None,
                        });
                        net.queues.push(JoinQueue {
                            side: Side::Right,
                            sibling: left,
                            shared,
                            tokens: FxHashMap::default(),
                            next: None,
                        });
                        net.link(prev, Node::Queue(left));
                        net.filters[filter].next = Some(Node::Queue(right));
                        Tail::Queue(left)
                    }
                });
            }
            if let Some(prev) = tail {
                let terminal = net.terminals.len();
                net.terminals.push(Terminal {
                    rule: rule.clone(),
                    monotonic: monotonic(rule),
                    live: FxHashMap::default(),
                });
                net.link(prev, Node::Terminal(terminal));
            }
        }
        net
    }

    fn link(&mut self, from: Tail, to: Node) {
        match from {
            Tail::Filter(f) => self.filters[f].next = Some(to),
            Tail::Queue(q) => {
                self.queues[q].next = Some(to);
                let sibling = self.queues[q].sibling;
                self.queues[sibling].next = Some(to);
            }
        }
    }

    /// True if some filter has an open predicate, so every triple is relevant.
    pub fn has_wildcard(&self) -> bool {
        !self.wildcard.is_empty()
    }

    /// Predicates mentioned by filters, in id order.
    pub fn predicates(&self) -> Vec<TermId> {
        let mut preds: Vec<TermId> = self.by_predicate.keys().copied().collect();
        preds.sort();
        preds
    }

    pub fn terminal(&self, index: usize) -> &Terminal {
        &self.terminals[index]
    }

    pub fn terminal_mut(&mut self, index: usize) -> &mut Terminal {
        &mut self.terminals[index]
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }

    /// Push one added or removed triple through the network, collecting the
    /// activations that reach terminals.
    pub fn inject(
        &mut self,
        triple: Triple,
        is_add: bool,
        terms: &TermStore,
        metrics: &EngineMetrics,
        out: &mut Vec<Activation>,
    ) {
        let mut work: VecDeque<(Node, Token)> = VecDeque::new();
        let indexed = self
            .by_predicate
            .get(&triple.predicate)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        for &f in indexed.iter().chain(self.wildcard.iter()) {
            let filter = &self.filters[f];
            let mut env = BindingEnv::new(filter.num_vars);
            if !env.match_triple(&filter.pattern, &triple, terms) {
                continue;
            }
            env.commit();
            if let Some(next) = filter.next {
                work.push_back((
                    next,
                    Token {
                        env,
                        support: smallvec![triple],
                    },
                ));
            }
        }

        while let Some((node, token)) = work.pop_front() {
            match node {
                Node::Terminal(terminal) => out.push(Activation {
                    terminal,
                    token,
                    is_add,
                }),
                Node::Queue(q) => self.join(q, token, is_add, metrics, &mut work),
            }
        }
    }

    fn join(
        &mut self,
        q: usize,
        token: Token,
        is_add: bool,
        metrics: &EngineMetrics,
        work: &mut VecDeque<(Node, Token)>,
    ) {
        let queue = &mut self.queues[q];
        if is_add {
            if queue.tokens.contains_key(&token.support) {
                return;
            }
            queue.tokens.insert(token.support.clone(), token.env.clone());
        } else if queue.tokens.remove(&token.support).is_none() {
            return;
        }

        let (side, sibling) = (queue.side, queue.sibling);
        let Some(next) = queue.next else {
            return;
        };
        let shared = &self.queues[q].shared;
        for (support, env) in &self.queues[sibling].tokens {
            if !token.env.agrees_on(env, shared) {
                continue;
            }
            metrics.record_join();
            let mut merged = token.env.clone();
            merged.merge(env);
            let joined: Support = match side {
                Side::Left => token.support.iter().chain(support.iter()).copied().collect(),
                Side::Right => support.iter().chain(token.support.iter()).copied().collect(),
            };
            work.push_back((
                next,
                Token {
                    env: merged,
                    support: joined,
                },
            ));
        }
    }
}

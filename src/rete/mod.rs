//! Incremental forward engine.
//!
//! Triples enter through [`ReteEngine::add`] or [`ReteEngine::delete`], are
//! queued, and propagate through the compiled [`network::Network`] one at a
//! time. Monotonic terminals fire synchronously; rules with non-monotonic
//! head actions go through a conflict set and fire only when the queues are
//! empty.
//!
//! Every firing records the head triples it produced against the support
//! that caused it, and each deduction keeps a count of its live supports.
//! Deleting a triple over-deletes everything derived through it, then
//! re-derives the over-deleted triples whose count is still positive.

mod conflict;
mod network;

use crate::builtin::BuiltinRegistry;
use crate::context::{ForwardSink, ImmediateContext, RuleContext};
use crate::error::ReasonerError;
use crate::graph::{FactBase, Finder};
use crate::metrics::EngineMetrics;
use crate::rule::{ClauseEntry, Rule};
use crate::subst::BindingEnv;
use crate::term::TermStore;
use crate::trace::{debug, warn};
use crate::triple::Triple;
use conflict::ConflictSet;
use network::{Activation, Network, Support, Token};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;

/// One recorded rule firing that concluded a triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub rule: String,
    pub conclusion: Triple,
    /// Body matches, in body order.
    pub matches: Vec<Triple>,
}

#[derive(Debug, Default)]
struct PendingQueue {
    adds: VecDeque<Triple>,
    add_set: FxHashSet<Triple>,
    deletes: VecDeque<Triple>,
}

impl PendingQueue {
    fn push_add(&mut self, triple: Triple) {
        if self.add_set.insert(triple) {
            self.adds.push_back(triple);
        }
    }

    fn pop_add(&mut self) -> Option<Triple> {
        let triple = self.adds.pop_front()?;
        self.add_set.remove(&triple);
        Some(triple)
    }

    fn clear(&mut self) {
        self.adds.clear();
        self.add_set.clear();
        self.deletes.clear();
    }
}

/// [`ForwardSink`] over the fact base and the engine's pending queue.
struct Propagator<'a> {
    facts: &'a mut FactBase,
    queue: &'a mut PendingQueue,
}

impl ForwardSink for Propagator<'_> {
    fn facts(&self) -> &FactBase {
        self.facts
    }

    fn is_pending(&self, triple: &Triple) -> bool {
        self.queue.add_set.contains(triple)
    }

    fn assert_deduction(&mut self, triple: Triple) {
        if self.facts.deductions.add(triple) {
            self.queue.push_add(triple);
        }
    }

    fn retract(&mut self, triple: Triple) {
        let removed_base = self.facts.base.remove(&triple);
        let removed_deduced = self.facts.deductions.remove(&triple);
        if removed_base || removed_deduced {
            self.queue.deletes.push_back(triple);
        }
    }

    fn retract_silently(&mut self, triple: Triple) {
        self.facts.base.remove(&triple);
        self.facts.deductions.remove(&triple);
    }
}

pub struct ReteEngine {
    terms: Arc<TermStore>,
    builtins: Arc<BuiltinRegistry>,
    metrics: Arc<EngineMetrics>,
    network: Network,
    queue: PendingQueue,
    /// Triples whose add has been pushed through the network.
    in_network: FxHashSet<Triple>,
    support_counts: FxHashMap<Triple, u32>,
    overdeleted: FxHashSet<Triple>,
    conflict: ConflictSet,
    derivations: Option<FxHashMap<Triple, Vec<Derivation>>>,
}

impl ReteEngine {
    pub fn new(
        terms: Arc<TermStore>,
        builtins: Arc<BuiltinRegistry>,
        metrics: Arc<EngineMetrics>,
        record_derivations: bool,
    ) -> Self {
        Self {
            terms,
            builtins,
            metrics,
            network: Network::default(),
            queue: PendingQueue::default(),
            in_network: FxHashSet::default(),
            support_counts: FxHashMap::default(),
            overdeleted: FxHashSet::default(),
            conflict: ConflictSet::default(),
            derivations: record_derivations.then(FxHashMap::default),
        }
    }

    /// Compile `rules`, fire axioms and run the existing facts through the
    /// network.
    ///
    /// `permanent` lists deductions added before the engine ran (by
    /// preprocessing hooks); they keep a support that never retracts.
    pub fn init(
        &mut self,
        rules: &[Arc<Rule>],
        permanent: &[Triple],
        facts: &mut FactBase,
    ) -> Result<(), ReasonerError> {
        let forward: Vec<Arc<Rule>> = rules.iter().filter(|r| !r.is_backward()).cloned().collect();
        let builtins = self.builtins.clone();
        self.network = Network::compile(&forward, &self.terms, |r| r.is_monotonic(&builtins));
        self.queue.clear();
        self.in_network.clear();
        self.support_counts.clear();
        self.overdeleted.clear();
        self.conflict.clear();
        if let Some(log) = self.derivations.as_mut() {
            log.clear();
        }

        for &triple in permanent {
            *self.support_counts.entry(triple).or_insert(0) += 1;
            self.queue.push_add(triple);
        }

        for rule in forward.iter().filter(|r| r.is_axiom()) {
            self.fire_axiom(rule, facts)?;
        }

        let seeds: Vec<Triple> = if self.network.has_wildcard() {
            facts.find(None, None, None).collect()
        } else {
            let mut seeds = Vec::new();
            for predicate in self.network.predicates() {
                seeds.extend(facts.find(None, Some(predicate), None));
            }
            seeds
        };
        debug!(
            rules = forward.len(),
            terminals = self.network.terminal_count(),
            seeds = seeds.len(),
            "forward engine initialised"
        );
        for triple in seeds {
            self.queue.push_add(triple);
        }
        self.settle(facts);
        Ok(())
    }

    fn fire_axiom(&mut self, rule: &Rule, facts: &mut FactBase) -> Result<(), ReasonerError> {
        let mut propagator = Propagator {
            facts,
            queue: &mut self.queue,
        };
        let mut ctx = ImmediateContext::new(
            &mut propagator,
            &self.terms,
            BindingEnv::new(rule.num_vars()),
            rule,
        );
        let mut produced: SmallVec<[Triple; 2]> = SmallVec::new();
        for clause in rule.head() {
            match clause {
                ClauseEntry::Pattern(p) => {
                    if let Some(triple) = ctx.env().ground_triple(p, &self.terms) {
                        produced.push(triple);
                    }
                }
                ClauseEntry::Functor(f) => {
                    self.builtins.run_action(f, &mut ctx).map_err(|source| {
                        ReasonerError::BuiltinFailure {
                            name: f.name.clone(),
                            source,
                        }
                    })?;
                }
            }
        }
        drop(ctx);
        self.metrics.record_rule_fired();
        for triple in produced {
            *self.support_counts.entry(triple).or_insert(0) += 1;
            if !facts.contains(&triple) {
                facts.deductions.add(triple);
            }
            self.queue.push_add(triple);
            if let Some(log) = self.derivations.as_mut() {
                log.entry(triple).or_default().push(Derivation {
                    rule: rule.name().to_string(),
                    conclusion: triple,
                    matches: Vec::new(),
                });
            }
        }
        Ok(())
    }

    /// Propagate a triple the caller has just added to the base graph.
    pub fn add(&mut self, triple: Triple, facts: &mut FactBase) {
        self.queue.push_add(triple);
        self.settle(facts);
    }

    /// Retract a triple the caller has just removed from the base graph,
    /// along with everything that no longer has a live derivation.
    pub fn delete(&mut self, triple: Triple, facts: &mut FactBase) {
        facts.deductions.remove(&triple);
        if facts.contains(&triple) {
            return;
        }
        self.overdeleted.insert(triple);
        self.queue.deletes.push_back(triple);
        self.settle(facts);
    }

    /// Recorded derivations of `triple`; empty unless recording is on.
    pub fn derivations(&self, triple: &Triple) -> &[Derivation] {
        self.derivations
            .as_ref()
            .and_then(|log| log.get(triple))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Live support count of a deduction.
    pub fn support_count(&self, triple: &Triple) -> u32 {
        self.support_counts.get(triple).copied().unwrap_or(0)
    }

    fn settle(&mut self, facts: &mut FactBase) {
        self.run_all(facts);
        loop {
            let mut revived: Vec<Triple> = self
                .overdeleted
                .drain()
                .filter(|t| self.support_counts.get(t).is_some_and(|&c| c > 0) && !facts.contains(t))
                .collect();
            if revived.is_empty() {
                break;
            }
            revived.sort();
            for triple in revived {
                debug!(triple = %triple.display(&self.terms), "re-derived");
                self.metrics.record_rederive();
                facts.deductions.add(triple);
                self.queue.push_add(triple);
            }
            self.run_all(facts);
        }
        self.overdeleted.clear();
    }

    fn run_all(&mut self, facts: &mut FactBase) {
        loop {
            if let Some(triple) = self.queue.deletes.pop_front() {
                self.inject(triple, false, facts);
            } else if let Some(triple) = self.queue.pop_add() {
                self.inject(triple, true, facts);
            } else if let Some(activation) = self.conflict.pop() {
                self.fire(activation.terminal, activation.token, facts);
            } else {
                break;
            }
        }
    }

    fn inject(&mut self, triple: Triple, is_add: bool, facts: &mut FactBase) {
        if is_add {
            if !facts.contains(&triple) || !self.in_network.insert(triple) {
                return;
            }
        } else if facts.contains(&triple) || !self.in_network.remove(&triple) {
            return;
        }
        self.metrics.record_injection();

        let mut activations = Vec::new();
        self.network
            .inject(triple, is_add, &self.terms, &self.metrics, &mut activations);
        for activation in activations {
            self.process(activation, facts);
        }
    }

    fn process(&mut self, activation: Activation, facts: &mut FactBase) {
        let Activation {
            terminal,
            token,
            is_add,
        } = activation;
        let node = self.network.terminal(terminal);
        if is_add {
            if node.live.contains_key(&token.support) {
                return;
            }
            if !node.monotonic {
                self.conflict.push(Activation {
                    terminal,
                    token,
                    is_add,
                });
                return;
            }
            self.fire(terminal, token, facts);
        } else {
            if !node.monotonic && self.conflict.cancel(terminal, &token.support) {
                return;
            }
            self.unfire(terminal, &token.support, facts);
        }
    }

    fn fire(&mut self, terminal: usize, token: Token, facts: &mut FactBase) {
        let rule = self.network.terminal(terminal).rule.clone();
        let Token { env, support } = token;
        let mut propagator = Propagator {
            facts,
            queue: &mut self.queue,
        };
        let mut ctx = ImmediateContext::new(&mut propagator, &self.terms, env, &rule);

        for clause in rule.body() {
            let ClauseEntry::Functor(call) = clause else {
                continue;
            };
            match self.builtins.call_body(call, &mut ctx) {
                Ok(true) => {}
                Ok(false) => return,
                Err(err) => {
                    warn!(
                        rule = rule.name(),
                        builtin = %call.name,
                        error = %err,
                        "guard failed, skipping binding"
                    );
                    self.metrics.record_guard_error();
                    return;
                }
            }
        }

        let mut produced: SmallVec<[Triple; 2]> = SmallVec::new();
        for clause in rule.head() {
            match clause {
                ClauseEntry::Pattern(p) => match ctx.env().ground_triple(p, &self.terms) {
                    Some(triple) if self.terms.is_literal(triple.subject) => {
                        debug!(rule = rule.name(), "dropping head triple with literal subject");
                    }
                    Some(triple) => produced.push(triple),
                    None => warn!(rule = rule.name(), "head pattern left unbound"),
                },
                ClauseEntry::Functor(call) => {
                    if let Err(err) = self.builtins.run_action(call, &mut ctx) {
                        warn!(
                            rule = rule.name(),
                            builtin = %call.name,
                            error = %err,
                            "head action failed"
                        );
                    }
                }
            }
        }
        drop(ctx);

        self.metrics.record_rule_fired();
        debug!(rule = rule.name(), produced = produced.len(), "rule fired");
        for &triple in &produced {
            *self.support_counts.entry(triple).or_insert(0) += 1;
            if !facts.contains(&triple) {
                facts.deductions.add(triple);
                self.queue.push_add(triple);
            }
            if let Some(log) = self.derivations.as_mut() {
                log.entry(triple).or_default().push(Derivation {
                    rule: rule.name().to_string(),
                    conclusion: triple,
                    matches: support.to_vec(),
                });
            }
        }
        let node = self.network.terminal_mut(terminal);
        // Non-monotonic firings are not undone by retraction.
        if !node.monotonic {
            produced.clear();
        }
        node.live.insert(support, produced);
    }

    fn unfire(&mut self, terminal: usize, support: &Support, facts: &mut FactBase) {
        let Some(produced) = self.network.terminal_mut(terminal).live.remove(support) else {
            return;
        };
        for triple in produced {
            if let Some(count) = self.support_counts.get_mut(&triple) {
                *count -= 1;
                if *count == 0 {
                    self.support_counts.remove(&triple);
                }
            }
            if let Some(records) = self.derivations.as_mut().and_then(|log| log.get_mut(&triple)) {
                if let Some(pos) = records.iter().position(|d| d.matches.as_slice() == support.as_slice()) {
                    records.remove(pos);
                }
            }
            if facts.deductions.remove(&triple) {
                self.metrics.record_over_delete();
                self.overdeleted.insert(triple);
                self.queue.deletes.push_back(triple);
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/rete.rs"]
mod tests;

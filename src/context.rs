//! Rule execution contexts.
//!
//! A [`RuleContext`] is what a running rule body (including builtin calls)
//! sees of the world: the current bindings, a membership test that also
//! consults not-yet-flushed derivations, and a way to stage additions and
//! removals. Two flavours exist:
//!
//! * [`BufferedContext`] collects derivations and applies them on
//!   [`RuleContext::flush`]. Used by the scan engine, where a flush happens
//!   after each matched rule so lookups never observe a half-applied batch.
//! * [`ImmediateContext`] hands every addition and removal straight to a
//!   [`ForwardSink`]. Used by RETE terminals, where each change re-enters
//!   the network right away.

use crate::graph::{DeductionSink, FactBase, Finder, TripleIter};
use crate::rule::Rule;
use crate::subst::BindingEnv;
use crate::term::{TermId, TermStore};
use crate::triple::Triple;
use rustc_hash::FxHashSet;
use std::sync::Arc;

pub trait RuleContext {
    fn terms(&self) -> &TermStore;

    fn env(&self) -> &BindingEnv;

    fn env_mut(&mut self) -> &mut BindingEnv;

    /// Rule currently executing, if any.
    fn rule(&self) -> Option<&Rule>;

    /// Offset at which the current rule's variables live in the environment.
    fn var_offset(&self) -> u32 {
        0
    }

    /// True if the triple is known, either stored or pending.
    fn contains(&self, triple: &Triple) -> bool;

    fn find(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> TripleIter<'_>;

    fn stage_add(&mut self, triple: Triple);

    fn stage_remove(&mut self, triple: Triple);

    /// Remove a triple without propagating the removal to dependent
    /// derivations.
    fn silent_remove(&mut self, triple: Triple) {
        self.stage_remove(triple);
    }

    /// Apply staged changes. Returns the number of triples added.
    fn flush(&mut self) -> usize;
}

/// Context that batches derivations until [`RuleContext::flush`].
pub struct BufferedContext<'a> {
    facts: &'a mut FactBase,
    terms: &'a TermStore,
    env: BindingEnv,
    rule: Option<Arc<Rule>>,
    pending: Vec<Triple>,
    pending_set: FxHashSet<Triple>,
    removals: Vec<Triple>,
    agenda: Vec<Triple>,
}

impl<'a> BufferedContext<'a> {
    pub fn new(facts: &'a mut FactBase, terms: &'a TermStore) -> Self {
        Self {
            facts,
            terms,
            env: BindingEnv::default(),
            rule: None,
            pending: Vec::new(),
            pending_set: FxHashSet::default(),
            removals: Vec::new(),
            agenda: Vec::new(),
        }
    }

    pub fn facts(&self) -> &FactBase {
        &*self.facts
    }

    /// Start a fresh activation of `rule`.
    pub fn begin(&mut self, rule: Arc<Rule>) {
        self.env = BindingEnv::new(rule.num_vars());
        self.rule = Some(rule);
    }

    /// Queue a triple for processing without adding it to the graph.
    pub fn push_triple(&mut self, triple: Triple) {
        self.agenda.push(triple);
    }

    /// Next triple awaiting processing, most recent first.
    pub fn next_triple(&mut self) -> Option<Triple> {
        self.agenda.pop()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl RuleContext for BufferedContext<'_> {
    fn terms(&self) -> &TermStore {
        self.terms
    }

    fn env(&self) -> &BindingEnv {
        &self.env
    }

    fn env_mut(&mut self) -> &mut BindingEnv {
        &mut self.env
    }

    fn rule(&self) -> Option<&Rule> {
        self.rule.as_deref()
    }

    fn contains(&self, triple: &Triple) -> bool {
        self.pending_set.contains(triple) || self.facts.contains(triple)
    }

    fn find(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> TripleIter<'_> {
        self.facts.find(s, p, o)
    }

    fn stage_add(&mut self, triple: Triple) {
        if self.pending_set.insert(triple) {
            self.pending.push(triple);
        }
    }

    fn stage_remove(&mut self, triple: Triple) {
        self.removals.push(triple);
    }

    fn flush(&mut self) -> usize {
        let mut added = 0;
        for triple in self.pending.drain(..) {
            if !self.facts.contains(&triple) && self.facts.deductions.add_deduction(triple) {
                self.agenda.push(triple);
                added += 1;
            }
        }
        self.pending_set.clear();
        for triple in self.removals.drain(..) {
            self.facts.deductions.delete(&triple);
            self.facts.base.delete(&triple);
        }
        added
    }
}

/// Write side used by [`ImmediateContext`]: every call takes effect at once.
pub trait ForwardSink {
    fn facts(&self) -> &FactBase;

    /// True if the triple is queued for insertion but not yet processed.
    fn is_pending(&self, triple: &Triple) -> bool;

    /// Add a deduction and queue it for propagation.
    fn assert_deduction(&mut self, triple: Triple);

    /// Remove a triple from storage and propagate the removal.
    fn retract(&mut self, triple: Triple);

    /// Remove a triple from storage only.
    fn retract_silently(&mut self, triple: Triple);
}

/// Unbuffered context for RETE terminals.
pub struct ImmediateContext<'a> {
    sink: &'a mut dyn ForwardSink,
    terms: &'a TermStore,
    env: BindingEnv,
    rule: &'a Rule,
}

impl<'a> ImmediateContext<'a> {
    pub fn new(
        sink: &'a mut dyn ForwardSink,
        terms: &'a TermStore,
        env: BindingEnv,
        rule: &'a Rule,
    ) -> Self {
        Self {
            sink,
            terms,
            env,
            rule,
        }
    }
}

impl RuleContext for ImmediateContext<'_> {
    fn terms(&self) -> &TermStore {
        self.terms
    }

    fn env(&self) -> &BindingEnv {
        &self.env
    }

    fn env_mut(&mut self) -> &mut BindingEnv {
        &mut self.env
    }

    fn rule(&self) -> Option<&Rule> {
        Some(self.rule)
    }

    fn contains(&self, triple: &Triple) -> bool {
        self.sink.is_pending(triple) || self.sink.facts().contains(triple)
    }

    fn find(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> TripleIter<'_> {
        self.sink.facts().find(s, p, o)
    }

    fn stage_add(&mut self, triple: Triple) {
        if !self.contains(&triple) {
            self.sink.assert_deduction(triple);
        }
    }

    fn stage_remove(&mut self, triple: Triple) {
        self.sink.retract(triple);
    }

    fn silent_remove(&mut self, triple: Triple) {
        self.sink.retract_silently(triple);
    }

    fn flush(&mut self) -> usize {
        0
    }
}

//! Hybrid inference graph.
//!
//! An [`InfGraph`] owns a base graph and a rule set. Preparation runs the
//! preprocessing hooks, validates the rules, drives the forward engine to
//! a fixpoint and loads the backward rules. Queries go through the
//! backward engine over base facts plus forward deductions. Adds and
//! deletes are applied incrementally to the forward state; every change
//! drops the backward tables and bumps the version, which invalidates open
//! answer streams.

use crate::backward::{Backchainer, QueryId};
use crate::builtin::BuiltinRegistry;
use crate::config::{ForwardStrategy, ReasonerConfig};
use crate::error::ReasonerError;
use crate::forward::ScanEngine;
use crate::graph::{FactBase, Finder, MemGraph};
use crate::hooks::{PreprocessHook, PreprocessSink};
use crate::metrics::{EngineMetrics, MetricsReport};
use crate::rete::{Derivation, ReteEngine};
use crate::rule::Rule;
use crate::subst::BindingEnv;
use crate::term::TermStore;
use crate::trace::{debug, info};
use crate::triple::{Triple, TriplePattern};
use parking_lot::Mutex;
use std::sync::Arc;

enum ForwardEngine {
    Rete(ReteEngine),
    Scan(ScanEngine),
}

struct Inner {
    terms: Arc<TermStore>,
    builtins: Arc<BuiltinRegistry>,
    config: ReasonerConfig,
    rules: Vec<Arc<Rule>>,
    facts: FactBase,
    hooks: Vec<Box<dyn PreprocessHook>>,
    forward: ForwardEngine,
    backward: Backchainer,
    prepared: bool,
    version: u64,
    metrics: Arc<EngineMetrics>,
}

impl Inner {
    fn prepare(&mut self) -> Result<(), ReasonerError> {
        if self.prepared {
            return Ok(());
        }
        self.facts.deductions.clear();

        let mut sink = PreprocessSink::new();
        for hook in &self.hooks {
            hook.run(&self.facts.base, &self.terms, &mut sink)?;
        }
        let (hook_triples, hook_rules) = sink.into_parts();

        let mut rules = self.rules.clone();
        rules.extend(hook_rules.into_iter().map(Arc::new));
        for rule in &rules {
            rule.validate(&self.terms, &self.builtins)?;
        }

        for &triple in &hook_triples {
            if !self.facts.contains(&triple) {
                self.facts.deductions.add(triple);
            }
        }
        match &mut self.forward {
            ForwardEngine::Rete(engine) => engine.init(&rules, &hook_triples, &mut self.facts)?,
            ForwardEngine::Scan(engine) => engine.init(&rules, &mut self.facts)?,
        }
        self.backward.set_rules(&rules);
        self.prepared = true;
        self.version += 1;
        info!(
            rules = rules.len(),
            base = self.facts.base.len(),
            deductions = self.facts.deductions.len(),
            "inference graph prepared"
        );
        Ok(())
    }

    fn unprepare(&mut self) {
        self.prepared = false;
        self.backward.reset();
        self.version += 1;
    }

    fn hooks_need_rerun(&self, triple: &Triple) -> bool {
        self.hooks
            .iter()
            .any(|h| h.needs_rerun(&self.facts.base, triple, &self.terms))
    }

    /// Stored triples (base and deductions) unifying with `pattern`.
    fn matching_data(&self, pattern: &TriplePattern) -> Vec<Triple> {
        self.facts
            .find_pattern(pattern, &self.terms)
            .filter(|t| {
                let mut env = BindingEnv::default();
                env.match_triple(pattern, t, &self.terms)
            })
            .filter(|t| !(self.config.filter_functors && self.terms.is_functor(t.object)))
            .collect()
    }
}

/// Forward/backward reasoner over a base graph. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct InfGraph {
    inner: Arc<Mutex<Inner>>,
}

impl InfGraph {
    pub fn new(
        terms: Arc<TermStore>,
        base: MemGraph,
        rules: Vec<Rule>,
        config: ReasonerConfig,
    ) -> Result<Self, ReasonerError> {
        Self::with_builtins(terms, base, rules, config, BuiltinRegistry::standard())
    }

    pub fn with_builtins(
        terms: Arc<TermStore>,
        base: MemGraph,
        rules: Vec<Rule>,
        config: ReasonerConfig,
        builtins: BuiltinRegistry,
    ) -> Result<Self, ReasonerError> {
        config.validate()?;
        let builtins = Arc::new(builtins);
        let metrics = Arc::new(EngineMetrics::new());
        let forward = match config.forward {
            ForwardStrategy::Rete => ForwardEngine::Rete(ReteEngine::new(
                terms.clone(),
                builtins.clone(),
                metrics.clone(),
                config.record_derivations,
            )),
            ForwardStrategy::Scan => ForwardEngine::Scan(ScanEngine::new(
                terms.clone(),
                builtins.clone(),
                metrics.clone(),
            )),
        };
        let backward = Backchainer::new(terms.clone(), builtins.clone(), metrics.clone(), &config);
        let inner = Inner {
            terms,
            builtins,
            config,
            rules: rules.into_iter().map(Arc::new).collect(),
            facts: FactBase::new(base),
            hooks: Vec::new(),
            forward,
            backward,
            prepared: false,
            version: 0,
            metrics,
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    pub fn terms(&self) -> Arc<TermStore> {
        self.inner.lock().terms.clone()
    }

    /// Register a preprocessing hook. Takes effect at the next preparation.
    pub fn add_hook(&self, hook: impl PreprocessHook + 'static) {
        let mut inner = self.inner.lock();
        inner.hooks.push(Box::new(hook));
        inner.unprepare();
    }

    /// Run hooks and forward inference if not already done. Idempotent.
    pub fn prepare(&self) -> Result<(), ReasonerError> {
        self.inner.lock().prepare()
    }

    pub fn is_prepared(&self) -> bool {
        self.inner.lock().prepared
    }

    /// Add a base triple and propagate its consequences.
    pub fn add(&self, triple: Triple) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.facts.base.add(triple) {
            return;
        }
        inner.version += 1;
        if !inner.prepared {
            return;
        }
        if inner.hooks_need_rerun(&triple) {
            debug!(triple = %triple.display(&inner.terms), "hook rerun required");
            inner.unprepare();
            return;
        }
        match &mut inner.forward {
            ForwardEngine::Rete(engine) => engine.add(triple, &mut inner.facts),
            ForwardEngine::Scan(engine) => engine.add(triple, &mut inner.facts),
        }
        inner.backward.reset();
    }

    /// Remove a base triple and retract what depended on it.
    pub fn delete(&self, triple: &Triple) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.facts.base.remove(triple) {
            return;
        }
        inner.version += 1;
        if !inner.prepared {
            return;
        }
        if inner.hooks_need_rerun(triple) {
            inner.unprepare();
            return;
        }
        if let ForwardEngine::Rete(engine) = &mut inner.forward {
            engine.delete(*triple, &mut inner.facts);
            inner.backward.reset();
        } else {
            // The scan engine keeps no provenance to retract with.
            inner.unprepare();
        }
    }

    /// Force re-preparation on next use.
    pub fn reset(&self) {
        self.inner.lock().unprepare();
    }

    /// Replace the base graph and force re-preparation.
    pub fn rebind(&self, base: MemGraph) {
        let mut inner = self.inner.lock();
        inner.facts = FactBase::new(base);
        inner.unprepare();
    }

    /// Entailed triples matching `pattern`, answered by the backward engine.
    pub fn find(&self, pattern: &TriplePattern) -> Result<AnswerStream, ReasonerError> {
        let mut guard = self.inner.lock();
        guard.prepare()?;
        let inner = &mut *guard;
        let query = inner.backward.start_query(pattern, &inner.facts);
        Ok(AnswerStream {
            graph: self.inner.clone(),
            query,
            version: inner.version,
            filter_functors: inner.config.filter_functors,
            state: StreamState::Open,
        })
    }

    pub fn find_all(&self, pattern: &TriplePattern) -> Result<Vec<Triple>, ReasonerError> {
        self.find(pattern)?.collect()
    }

    /// Base facts and forward deductions matching `pattern`, without
    /// backward rules.
    pub fn find_data(&self, pattern: &TriplePattern) -> Result<Vec<Triple>, ReasonerError> {
        let mut inner = self.inner.lock();
        inner.prepare()?;
        Ok(inner.matching_data(pattern))
    }

    pub fn contains(&self, triple: &Triple) -> Result<bool, ReasonerError> {
        {
            let mut inner = self.inner.lock();
            inner.prepare()?;
            if inner.facts.contains(triple) {
                return Ok(true);
            }
        }
        let mut stream = self.find(&triple.as_pattern())?;
        stream.next().transpose().map(|t| t.is_some())
    }

    /// Forward deductions, in derivation order.
    pub fn deductions(&self) -> Result<Vec<Triple>, ReasonerError> {
        let mut inner = self.inner.lock();
        inner.prepare()?;
        Ok(inner.facts.deductions.iter().collect())
    }

    /// Recorded forward derivations of `triple`. Empty unless
    /// `record_derivations` is set and the RETE engine is in use.
    pub fn explain(&self, triple: &Triple) -> Vec<Derivation> {
        let inner = self.inner.lock();
        match &inner.forward {
            ForwardEngine::Rete(engine) => engine.derivations(triple).to_vec(),
            ForwardEngine::Scan(_) => Vec::new(),
        }
    }

    pub fn rules_fired(&self) -> u64 {
        self.inner.lock().metrics.rules_fired()
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    pub fn metrics(&self) -> MetricsReport {
        self.inner.lock().metrics.report()
    }

    /// Number of tabled generators currently held by the backward engine.
    pub fn generator_count(&self) -> usize {
        self.inner.lock().backward.generator_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Closed,
    Fused,
}

/// Answers to one backward query.
///
/// Yields `Err(ConcurrentModification)` once if the graph changes while it
/// is open, and `Err(IteratorClosed)` once if used after [`close`]; after
/// either it is fused.
///
/// [`close`]: AnswerStream::close
pub struct AnswerStream {
    graph: Arc<Mutex<Inner>>,
    query: QueryId,
    version: u64,
    filter_functors: bool,
    state: StreamState,
}

impl AnswerStream {
    pub fn close(&mut self) {
        if self.state == StreamState::Open {
            self.release();
            self.state = StreamState::Closed;
        }
    }

    fn release(&mut self) {
        let mut inner = self.graph.lock();
        if inner.version == self.version {
            inner.backward.close_query(self.query);
        }
    }
}

impl Iterator for AnswerStream {
    type Item = Result<Triple, ReasonerError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            StreamState::Fused => return None,
            StreamState::Closed => {
                self.state = StreamState::Fused;
                return Some(Err(ReasonerError::IteratorClosed));
            }
            StreamState::Open => {}
        }

        let mut guard = self.graph.lock();
        if guard.version != self.version {
            self.state = StreamState::Fused;
            return Some(Err(ReasonerError::ConcurrentModification));
        }
        let inner = &mut *guard;
        loop {
            match inner.backward.next_answer(self.query, &inner.facts) {
                Ok(Some(triple)) => {
                    if self.filter_functors && inner.terms.is_functor(triple.object) {
                        continue;
                    }
                    return Some(Ok(triple));
                }
                Ok(None) => {
                    inner.backward.close_query(self.query);
                    self.state = StreamState::Fused;
                    return None;
                }
                Err(err) => {
                    self.state = StreamState::Fused;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl Drop for AnswerStream {
    fn drop(&mut self) {
        if self.state == StreamState::Open {
            self.release();
        }
    }
}

#[cfg(test)]
#[path = "tests/infgraph.rs"]
mod tests;

//! Tabled backward chaining.
//!
//! Every tabled subgoal, canonicalised so that variants share an entry,
//! gets one [`Generator`] holding its answers in discovery order. Callers
//! read a generator through consumer frames; a frame that has read every
//! current answer suspends, and is resumed from the agenda when the
//! generator produces more. Generators whose frames can never be resumed
//! are completed by the check in `completion`.
//!
//! Generators, frames and queries live in arenas addressed by integer
//! handles, so the cyclic generator/frame graph has no owning cycles.

mod completion;
mod frame;
mod generator;
mod interpreter;
mod query;

pub use frame::{ChoicePointId, Context};
pub use generator::{Generator, GeneratorId, GeneratorState};
pub use interpreter::Interpreter;
pub use query::QueryId;

use crate::builtin::BuiltinRegistry;
use crate::config::{ReasonerConfig, TablingPolicy};
use crate::graph::Finder;
use crate::metrics::EngineMetrics;
use crate::rule::Rule;
use crate::term::{TermId, TermStore};
use crate::trace::debug;
use crate::triple::TriplePattern;
use frame::{AgendaEntry, ConsumerFrame, Consumed};
use query::TopQuery;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::Arc;

/// One head pattern of a backward rule.
#[derive(Debug, Clone)]
pub(crate) struct ClauseHead {
    pub rule: Arc<Rule>,
    pub head: usize,
}

/// Backward clauses by head predicate, each list in declaration order.
#[derive(Debug)]
struct RuleIndex {
    all: Arc<[ClauseHead]>,
    by_predicate: FxHashMap<TermId, Arc<[ClauseHead]>>,
    /// Clauses whose head predicate is a variable.
    wildcard: Arc<[ClauseHead]>,
}

impl Default for RuleIndex {
    fn default() -> Self {
        Self {
            all: Arc::from(Vec::new()),
            by_predicate: FxHashMap::default(),
            wildcard: Arc::from(Vec::new()),
        }
    }
}

impl RuleIndex {
    fn build(rules: &[Arc<Rule>], terms: &TermStore) -> Self {
        let mut all = Vec::new();
        for rule in rules.iter().filter(|r| r.is_backward()) {
            for (head, clause) in rule.head().iter().enumerate() {
                if clause.as_pattern().is_some() {
                    all.push(ClauseHead {
                        rule: rule.clone(),
                        head,
                    });
                }
            }
        }
        let head_predicate =
            |c: &ClauseHead| c.rule.head()[c.head].as_pattern().and_then(|p| p.ground_predicate(terms));

        let mut predicates: Vec<TermId> = all.iter().filter_map(head_predicate).collect();
        predicates.sort();
        predicates.dedup();
        let by_predicate = predicates
            .into_iter()
            .map(|p| {
                let list: Vec<ClauseHead> = all
                    .iter()
                    .filter(|c| head_predicate(*c).map_or(true, |hp| hp == p))
                    .cloned()
                    .collect();
                (p, Arc::from(list))
            })
            .collect();
        let wildcard: Vec<ClauseHead> = all
            .iter()
            .filter(|c| head_predicate(*c).is_none())
            .cloned()
            .collect();
        Self {
            all: Arc::from(all),
            by_predicate,
            wildcard: Arc::from(wildcard),
        }
    }

    fn matching(&self, predicate: TermId, terms: &TermStore) -> Arc<[ClauseHead]> {
        if terms.is_var(predicate).is_some() {
            return self.all.clone();
        }
        self.by_predicate
            .get(&predicate)
            .cloned()
            .unwrap_or_else(|| self.wildcard.clone())
    }

    fn len(&self) -> usize {
        self.all.len()
    }
}

pub struct Backchainer {
    terms: Arc<TermStore>,
    builtins: Arc<BuiltinRegistry>,
    metrics: Arc<EngineMetrics>,
    rules: RuleIndex,
    /// `None` tables every goal.
    tabled: Option<FxHashSet<TermId>>,
    generators: Vec<Generator>,
    table: FxHashMap<TriplePattern, GeneratorId>,
    frames: Vec<Option<ConsumerFrame>>,
    free_frames: Vec<ChoicePointId>,
    queries: Vec<Option<TopQuery>>,
    agenda: VecDeque<AgendaEntry>,
    check_interval: usize,
    trace: bool,
}

impl Backchainer {
    pub fn new(
        terms: Arc<TermStore>,
        builtins: Arc<BuiltinRegistry>,
        metrics: Arc<EngineMetrics>,
        config: &ReasonerConfig,
    ) -> Self {
        let tabled = match &config.tabling {
            TablingPolicy::All => None,
            TablingPolicy::Predicates(names) => {
                Some(names.iter().map(|n| terms.iri(n)).collect())
            }
        };
        Self {
            terms,
            builtins,
            metrics,
            rules: RuleIndex::default(),
            tabled,
            generators: Vec::new(),
            table: FxHashMap::default(),
            frames: Vec::new(),
            free_frames: Vec::new(),
            queries: Vec::new(),
            agenda: VecDeque::new(),
            check_interval: config.completion_check_interval,
            trace: config.trace,
        }
    }

    /// Replace the backward rule set. Drops all tables.
    pub fn set_rules(&mut self, rules: &[Arc<Rule>]) {
        self.rules = RuleIndex::build(rules, &self.terms);
        self.reset();
        debug!(clauses = self.rules.len(), "backward rules loaded");
    }

    /// Drop every generator, frame, query and agenda entry.
    pub fn reset(&mut self) {
        self.generators.clear();
        self.table.clear();
        self.frames.clear();
        self.free_frames.clear();
        self.queries.clear();
        self.agenda.clear();
    }

    pub fn generator(&self, id: GeneratorId) -> &Generator {
        &self.generators[id.index()]
    }

    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }

    /// Generator for a goal, if one has been created. Variants of the goal
    /// share one generator.
    pub fn lookup_generator(&self, goal: &TriplePattern) -> Option<GeneratorId> {
        let (canonical, _) = goal.canonical(&self.terms);
        self.table.get(&canonical).copied()
    }

    fn is_tabled(&self, call: &TriplePattern) -> bool {
        match &self.tabled {
            None => true,
            Some(predicates) => predicates.contains(&call.predicate),
        }
    }

    /// Existing generator for a canonical goal, or a new one scheduled to
    /// start.
    fn generator_for(
        &mut self,
        canonical: TriplePattern,
        num_vars: u32,
        data: &dyn Finder,
    ) -> GeneratorId {
        if let Some(&id) = self.table.get(&canonical) {
            return id;
        }
        let interpreter = self.new_interpreter(canonical, num_vars, data);
        let id = GeneratorId(self.generators.len() as u32);
        self.generators
            .push(Generator::new(canonical, num_vars, interpreter));
        self.table.insert(canonical, id);
        self.agenda.push_back(AgendaEntry::Start(id));
        self.metrics.record_generator_created();
        debug!(
            generator = id.0,
            goal = %canonical.display(&self.terms),
            "generator created"
        );
        id
    }

    fn alloc_frame(&mut self, frame: ConsumerFrame) -> ChoicePointId {
        let producer = frame.generator;
        let id = match self.free_frames.pop() {
            Some(id) => {
                self.frames[id.index()] = Some(frame);
                id
            }
            None => {
                self.frames.push(Some(frame));
                ChoicePointId(self.frames.len() as u32 - 1)
            }
        };
        self.generators[producer.index()].consumers.insert(id);
        id
    }

    /// Read the next matching answer through a frame. A frame that has read
    /// everything from an unfinished producer is parked in its owner's
    /// blocked set.
    fn consume(&mut self, cp: ChoicePointId) -> Consumed {
        let Some(frame) = self.frames.get_mut(cp.index()).and_then(Option::as_mut) else {
            return Consumed::Exhausted;
        };
        let producer = &self.generators[frame.generator.index()];
        while frame.index < producer.results.len() {
            let triple = producer.results[frame.index];
            frame.index += 1;
            let mut branch = frame.branch.clone();
            if branch.env.match_triple(&frame.call, &triple, &self.terms) {
                return Consumed::Branch(branch);
            }
        }
        if producer.is_complete() {
            return Consumed::Exhausted;
        }
        frame.suspended = true;
        if let Context::Generator(owner) = frame.owner {
            self.generators[owner.index()].blocked.insert(cp);
        }
        Consumed::Suspend
    }

    /// True if a frame has unread answers or its producer has finished.
    fn frame_ready(&self, cp: ChoicePointId) -> bool {
        match self.frames.get(cp.index()).and_then(Option::as_ref) {
            Some(frame) => {
                let producer = &self.generators[frame.generator.index()];
                frame.index < producer.results.len() || producer.is_complete()
            }
            None => true,
        }
    }

    fn release_frame(&mut self, cp: ChoicePointId) {
        let Some(frame) = self.frames.get_mut(cp.index()).and_then(Option::take) else {
            return;
        };
        self.generators[frame.generator.index()].consumers.remove(&cp);
        if let Context::Generator(owner) = frame.owner {
            self.generators[owner.index()].blocked.remove(&cp);
        }
        self.free_frames.push(cp);
    }

    fn release_interpreter(&mut self, interp: Interpreter) {
        for frame in interp.stack {
            if let interpreter::Frame::Consumer(cp) = frame {
                self.release_frame(cp);
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/backward.rs"]
mod tests;

use super::frame::ChoicePointId;
use super::interpreter::Interpreter;
use crate::triple::{Triple, TriplePattern};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;

/// Handle into the generator arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeneratorId(pub(crate) u32);

impl GeneratorId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Scheduled or currently running.
    Ready,
    /// Out of alternatives but waiting on results from other generators.
    Blocked,
    /// No further results. Never left once entered.
    Complete,
}

/// Memoized answers for one canonical subgoal.
#[derive(Debug)]
pub struct Generator {
    pub(super) goal: TriplePattern,
    pub(super) num_vars: u32,
    pub(super) results: Vec<Triple>,
    /// Absent for ground goals, which hold at most one result.
    pub(super) result_set: Option<FxHashSet<Triple>>,
    pub(super) interpreter: Option<Interpreter>,
    pub(super) state: GeneratorState,
    /// Frames reading this generator's results.
    pub(super) consumers: BTreeSet<ChoicePointId>,
    /// This generator's own suspended frames.
    pub(super) blocked: BTreeSet<ChoicePointId>,
}

impl Generator {
    pub(super) fn new(goal: TriplePattern, num_vars: u32, interpreter: Interpreter) -> Self {
        Self {
            goal,
            num_vars,
            results: Vec::new(),
            result_set: (num_vars > 0).then(FxHashSet::default),
            interpreter: Some(interpreter),
            state: GeneratorState::Ready,
            consumers: BTreeSet::new(),
            blocked: BTreeSet::new(),
        }
    }

    pub fn goal(&self) -> &TriplePattern {
        &self.goal
    }

    pub fn results(&self) -> &[Triple] {
        &self.results
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == GeneratorState::Complete
    }

    pub fn is_ground(&self) -> bool {
        self.num_vars == 0
    }

    /// Append a result. Returns false for a duplicate, or for any result
    /// after the first of a ground goal.
    pub(super) fn add_result(&mut self, triple: Triple) -> bool {
        if self.is_complete() {
            return false;
        }
        match self.result_set.as_mut() {
            Some(seen) => {
                if !seen.insert(triple) {
                    return false;
                }
            }
            None => {
                if !self.results.is_empty() {
                    return false;
                }
            }
        }
        self.results.push(triple);
        true
    }
}

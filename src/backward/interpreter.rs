//! Resolution engine driving one generator.
//!
//! The interpreter is an explicit choice-point stack. A [`Branch`] is one
//! partial proof: bindings plus the goals still to solve, kept as a shared
//! cons list so alternatives can fork without copying the tail. Solving a
//! triple goal either pushes a consumer frame on the goal's generator
//! (tabled) or pushes its matching clauses and stored triples (untabled).

use super::frame::{ConsumerFrame, Consumed, Context};
use super::generator::GeneratorId;
use super::{Backchainer, ClauseHead};
use crate::context::RuleContext;
use crate::graph::{Finder, TripleIter};
use crate::rule::{ClauseEntry, Functor, Rule};
use crate::subst::BindingEnv;
use crate::term::{TermId, TermStore};
use crate::trace::{trace, warn};
use crate::triple::{Triple, TriplePattern};
use crate::unify::unify_patterns;
use std::sync::Arc;

/// A body clause of `rule` still to be solved, with the rule's variables
/// living at `offset` in the branch environment.
#[derive(Debug)]
pub(crate) struct PendingGoal {
    pub rule: Arc<Rule>,
    pub index: usize,
    pub offset: u32,
}

#[derive(Debug)]
pub(crate) struct GoalCell {
    pub goal: PendingGoal,
    pub next: Goals,
}

pub(crate) type Goals = Option<Arc<GoalCell>>;

#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub env: BindingEnv,
    pub goals: Goals,
}

impl Branch {
    pub fn new(num_vars: usize) -> Self {
        Self {
            env: BindingEnv::new(num_vars),
            goals: None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Frame {
    /// Backward clauses whose head may match `call`.
    Clauses {
        call: TriplePattern,
        clauses: Arc<[ClauseHead]>,
        next: usize,
        branch: Branch,
    },
    /// Stored triples matching `call`.
    Matches {
        call: TriplePattern,
        matches: Vec<Triple>,
        next: usize,
        branch: Branch,
    },
    Consumer(super::frame::ChoicePointId),
}

#[derive(Debug)]
pub struct Interpreter {
    pub(super) goal: TriplePattern,
    pub(super) stack: Vec<Frame>,
}

pub(super) enum Step {
    Answer(Triple),
    Fail,
}

enum Advance {
    Answer(Triple),
    Continue(Branch),
    Backtrack,
}

fn push_body(rule: &Arc<Rule>, offset: u32, rest: Goals) -> Goals {
    let mut goals = rest;
    for index in (0..rule.body().len()).rev() {
        goals = Some(Arc::new(GoalCell {
            goal: PendingGoal {
                rule: rule.clone(),
                index,
                offset,
            },
            next: goals,
        }));
    }
    goals
}

/// Read-only context for builtins called from backward rule bodies.
struct BackwardContext<'a> {
    terms: &'a TermStore,
    data: &'a dyn Finder,
    env: BindingEnv,
    rule: &'a Rule,
    offset: u32,
}

impl RuleContext for BackwardContext<'_> {
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

    fn var_offset(&self) -> u32 {
        self.offset
    }

    fn contains(&self, triple: &Triple) -> bool {
        self.data.contains(triple)
    }

    fn find(&self, s: Option<TermId>, p: Option<TermId>, o: Option<TermId>) -> TripleIter<'_> {
        self.data.find(s, p, o)
    }

    // Backward bodies cannot change the graph.
    fn stage_add(&mut self, _triple: Triple) {}

    fn stage_remove(&mut self, _triple: Triple) {}

    fn flush(&mut self) -> usize {
        0
    }
}

impl Backchainer {
    pub(super) fn new_interpreter(
        &self,
        goal: TriplePattern,
        num_vars: u32,
        data: &dyn Finder,
    ) -> Interpreter {
        let mut interp = Interpreter {
            goal,
            stack: Vec::new(),
        };
        self.push_alternatives(&mut interp.stack, goal, Branch::new(num_vars as usize), data);
        interp
    }

    /// Clauses below, stored triples on top: data answers come first.
    fn push_alternatives(
        &self,
        stack: &mut Vec<Frame>,
        call: TriplePattern,
        branch: Branch,
        data: &dyn Finder,
    ) {
        let clauses = self.rules.matching(call.predicate, &self.terms);
        if !clauses.is_empty() {
            stack.push(Frame::Clauses {
                call,
                clauses,
                next: 0,
                branch: branch.clone(),
            });
        }
        let matches: Vec<Triple> = data.find_pattern(&call, &self.terms).collect();
        if !matches.is_empty() {
            stack.push(Frame::Matches {
                call,
                matches,
                next: 0,
                branch,
            });
        }
    }

    /// Run until the next answer for `owner`, or until every alternative
    /// left on the stack is exhausted or suspended.
    pub(super) fn solve(
        &mut self,
        owner: GeneratorId,
        interp: &mut Interpreter,
        data: &dyn Finder,
    ) -> Step {
        let mut current: Option<Branch> = None;
        loop {
            let branch = match current.take() {
                Some(branch) => branch,
                None => match self.backtrack(owner, interp) {
                    Some(branch) => branch,
                    None => return Step::Fail,
                },
            };
            match self.advance(owner, interp, branch, data) {
                Advance::Answer(triple) => return Step::Answer(triple),
                Advance::Continue(branch) => current = Some(branch),
                Advance::Backtrack => {}
            }
        }
    }

    fn advance(
        &mut self,
        owner: GeneratorId,
        interp: &mut Interpreter,
        mut branch: Branch,
        data: &dyn Finder,
    ) -> Advance {
        let Some(cell) = branch.goals.take() else {
            return match branch.env.ground_triple(&interp.goal, &self.terms) {
                Some(triple) => Advance::Answer(triple),
                None => {
                    warn!(
                        goal = %interp.goal.display(&self.terms),
                        "skipping non-ground answer"
                    );
                    Advance::Backtrack
                }
            };
        };
        branch.goals = cell.next.clone();
        let PendingGoal {
            rule,
            index,
            offset,
        } = &cell.goal;

        match &rule.body()[*index] {
            ClauseEntry::Functor(call) => {
                let args = call.args.iter().map(|&a| self.terms.offset_vars(a, *offset));
                let call = Functor::new(call.name.clone(), args);
                let mut ctx = BackwardContext {
                    terms: &self.terms,
                    data,
                    env: branch.env,
                    rule,
                    offset: *offset,
                };
                let outcome = self.builtins.call_body(&call, &mut ctx);
                branch.env = ctx.env;
                match outcome {
                    Ok(true) => Advance::Continue(branch),
                    Ok(false) => Advance::Backtrack,
                    Err(err) => {
                        warn!(
                            rule = rule.name(),
                            builtin = %call.name,
                            error = %err,
                            "guard failed, skipping binding"
                        );
                        self.metrics.record_guard_error();
                        Advance::Backtrack
                    }
                }
            }
            ClauseEntry::Pattern(pattern) => {
                let call = branch
                    .env
                    .resolve_pattern(&pattern.offset_vars(*offset, &self.terms), &self.terms);
                if self.trace {
                    trace!(goal = %call.display(&self.terms), rule = rule.name(), "call");
                }
                if self.is_tabled(&call) {
                    let (canonical, num_vars) = call.canonical(&self.terms);
                    let producer = self.generator_for(canonical, num_vars, data);
                    let cp = self.alloc_frame(ConsumerFrame {
                        generator: producer,
                        owner: Context::Generator(owner),
                        index: 0,
                        call,
                        branch,
                        suspended: false,
                        scheduled: false,
                    });
                    interp.stack.push(Frame::Consumer(cp));
                } else {
                    self.push_alternatives(&mut interp.stack, call, branch, data);
                }
                Advance::Backtrack
            }
        }
    }

    /// Next branch from the most recent choice point, popping exhausted
    /// and suspended ones.
    fn backtrack(&mut self, owner: GeneratorId, interp: &mut Interpreter) -> Option<Branch> {
        loop {
            match interp.stack.last_mut()? {
                Frame::Matches {
                    call,
                    matches,
                    next,
                    branch,
                } => {
                    while *next < matches.len() {
                        let triple = matches[*next];
                        *next += 1;
                        let mut b = branch.clone();
                        if b.env.match_triple(call, &triple, &self.terms) {
                            if self.trace {
                                trace!(triple = %triple.display(&self.terms), "triple match");
                            }
                            return Some(b);
                        }
                    }
                }
                Frame::Clauses {
                    call,
                    clauses,
                    next,
                    branch,
                } => {
                    while *next < clauses.len() {
                        let clause = clauses[*next].clone();
                        *next += 1;
                        let Some(head) = clause.rule.head()[clause.head].as_pattern() else {
                            continue;
                        };
                        let mut b = branch.clone();
                        let offset = b.env.extend(clause.rule.num_vars());
                        let head = head.offset_vars(offset, &self.terms);
                        if unify_patterns(&head, call, &mut b.env, &self.terms) {
                            if self.trace {
                                trace!(rule = clause.rule.name(), "enter clause");
                            }
                            b.goals = push_body(&clause.rule, offset, b.goals.take());
                            return Some(b);
                        }
                    }
                }
                Frame::Consumer(cp) => {
                    let cp = *cp;
                    match self.consume(cp) {
                        Consumed::Branch(b) => return Some(b),
                        Consumed::Exhausted => self.release_frame(cp),
                        Consumed::Suspend => {
                            if self.trace {
                                trace!(generator = owner.0, frame = cp.0, "suspend");
                            }
                        }
                    }
                }
            }
            interp.stack.pop();
        }
    }
}

use super::frame::{ChoicePointId, ConsumerFrame, Consumed, Context};
use super::generator::{GeneratorId, GeneratorState};
use super::interpreter::Branch;
use super::Backchainer;
use crate::error::ReasonerError;
use crate::graph::Finder;
use crate::trace::warn;
use crate::triple::{Triple, TriplePattern};
use rustc_hash::FxHashSet;

/// Handle for an open top-level query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub(crate) u32);

impl QueryId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A top-level consumer: reads its goal's generator through one frame,
/// driving the agenda whenever it runs out of answers.
#[derive(Debug)]
pub(crate) struct TopQuery {
    generator: GeneratorId,
    frame: Option<ChoicePointId>,
    seen: FxHashSet<Triple>,
}

impl Backchainer {
    pub fn start_query(&mut self, goal: &TriplePattern, data: &dyn Finder) -> QueryId {
        let (canonical, num_vars) = goal.canonical(&self.terms);
        let generator = self.generator_for(canonical, num_vars, data);
        let id = QueryId(self.queries.len() as u32);
        let cp = self.alloc_frame(ConsumerFrame {
            generator,
            owner: Context::Top(id),
            index: 0,
            call: canonical,
            branch: Branch::new(num_vars as usize),
            suspended: false,
            scheduled: false,
        });
        self.queries.push(Some(TopQuery {
            generator,
            frame: Some(cp),
            seen: FxHashSet::default(),
        }));
        id
    }

    /// Next distinct answer, or `None` once the goal's generator is
    /// complete and fully read.
    pub fn next_answer(
        &mut self,
        q: QueryId,
        data: &dyn Finder,
    ) -> Result<Option<Triple>, ReasonerError> {
        loop {
            let query = self
                .queries
                .get(q.index())
                .and_then(Option::as_ref)
                .ok_or(ReasonerError::IteratorClosed)?;
            let Some(cp) = query.frame else {
                return Ok(None);
            };
            let generator = query.generator;

            match self.consume(cp) {
                Consumed::Branch(branch) => {
                    let Some(call) = self
                        .frames
                        .get(cp.index())
                        .and_then(Option::as_ref)
                        .map(|f| f.call)
                    else {
                        continue;
                    };
                    let Some(triple) = branch.env.ground_triple(&call, &self.terms) else {
                        continue;
                    };
                    if let Some(query) = self.queries.get_mut(q.index()).and_then(Option::as_mut) {
                        if query.seen.insert(triple) {
                            self.metrics.record_answer();
                            return Ok(Some(triple));
                        }
                    }
                }
                Consumed::Exhausted => {
                    self.release_frame(cp);
                    if let Some(query) = self.queries.get_mut(q.index()).and_then(Option::as_mut) {
                        query.frame = None;
                    }
                    return Ok(None);
                }
                Consumed::Suspend => {
                    if !self.run_until(generator, data, |b| b.frame_ready(cp)) {
                        warn!(generator = generator.0, "no progress possible, completing");
                        self.set_complete(generator);
                    }
                }
            }
        }
    }

    /// Detach a query and settle whatever it left blocked. Further
    /// `next_answer` calls on it fail with `IteratorClosed`.
    pub fn close_query(&mut self, q: QueryId) {
        let query = self.queries.get_mut(q.index()).and_then(Option::take);
        if let Some(cp) = query.and_then(|query| query.frame) {
            self.release_frame(cp);
        }
        let blocked: Vec<GeneratorId> = self
            .generators
            .iter()
            .enumerate()
            .filter(|(_, g)| g.state == GeneratorState::Blocked)
            .map(|(i, _)| GeneratorId(i as u32))
            .collect();
        if !blocked.is_empty() {
            self.check_for_completions(&blocked);
        }
    }
}

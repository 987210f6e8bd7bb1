//! Pumping, completion and deadlock detection.
//!
//! A generator is pumped until its interpreter has nothing left to try.
//! If none of its frames are suspended it completes; otherwise it blocks
//! until a producer it waits on yields or completes. Groups of blocked
//! generators that only wait on each other are found by
//! [`Backchainer::check_for_completions`] and completed together.

use super::frame::{AgendaEntry, ChoicePointId, Context};
use super::generator::{GeneratorId, GeneratorState};
use super::interpreter::{Frame, Step};
use super::Backchainer;
use crate::graph::Finder;
use crate::trace::{debug, trace};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unknown,
    Live,
}

impl Backchainer {
    /// Run a generator's interpreter, optionally re-entering it through a
    /// frame whose producer has new results.
    pub(super) fn pump_generator(
        &mut self,
        g: GeneratorId,
        resume: Option<ChoicePointId>,
        data: &dyn Finder,
    ) {
        let Some(mut interp) = self.generators[g.index()].interpreter.take() else {
            if let Some(cp) = resume {
                self.release_frame(cp);
            }
            return;
        };
        if let Some(cp) = resume {
            if let Some(frame) = self.frames.get_mut(cp.index()).and_then(Option::as_mut) {
                frame.suspended = false;
                frame.scheduled = false;
            }
            self.generators[g.index()].blocked.remove(&cp);
            interp.stack.push(Frame::Consumer(cp));
            if self.trace {
                trace!(generator = g.0, frame = cp.0, "resume");
            }
        }
        self.generators[g.index()].state = GeneratorState::Ready;

        loop {
            match self.solve(g, &mut interp, data) {
                Step::Answer(triple) => {
                    let generator = &mut self.generators[g.index()];
                    if !generator.add_result(triple) {
                        continue;
                    }
                    let ground = generator.is_ground();
                    self.notify_consumers(g);
                    if ground {
                        self.release_interpreter(interp);
                        self.set_complete(g);
                        return;
                    }
                }
                Step::Fail => {
                    let generator = &mut self.generators[g.index()];
                    if generator.blocked.is_empty() {
                        self.release_interpreter(interp);
                        self.set_complete(g);
                    } else {
                        generator.state = GeneratorState::Blocked;
                        generator.interpreter = Some(interp);
                    }
                    return;
                }
            }
        }
    }

    /// Schedule every suspended generator-owned frame reading `g`.
    fn notify_consumers(&mut self, g: GeneratorId) {
        let consumers: Vec<ChoicePointId> =
            self.generators[g.index()].consumers.iter().copied().collect();
        for cp in consumers {
            self.schedule(cp);
        }
    }

    fn schedule(&mut self, cp: ChoicePointId) {
        let Some(frame) = self.frames.get_mut(cp.index()).and_then(Option::as_mut) else {
            return;
        };
        if frame.suspended && !frame.scheduled && matches!(frame.owner, Context::Generator(_)) {
            frame.scheduled = true;
            self.agenda.push_back(AgendaEntry::Resume(cp));
        }
    }

    /// Mark `g` complete, release its frames and wake its consumers.
    /// Blocked owners left with nothing to wait on complete in turn.
    pub(super) fn set_complete(&mut self, g: GeneratorId) {
        let mut work = vec![g];
        while let Some(g) = work.pop() {
            let generator = &mut self.generators[g.index()];
            if generator.is_complete() {
                continue;
            }
            generator.state = GeneratorState::Complete;
            let interp = generator.interpreter.take();
            let blocked = std::mem::take(&mut generator.blocked);
            let results = generator.results.len();
            if let Some(interp) = interp {
                self.release_interpreter(interp);
            }
            for cp in blocked {
                self.release_frame(cp);
            }
            self.metrics.record_generator_completed();
            debug!(generator = g.0, results, "generator complete");

            let consumers: Vec<ChoicePointId> =
                self.generators[g.index()].consumers.iter().copied().collect();
            for cp in consumers {
                let Some(frame) = self.frames.get(cp.index()).and_then(Option::as_ref) else {
                    continue;
                };
                if !frame.suspended {
                    continue;
                }
                if frame.index < results {
                    self.schedule(cp);
                    continue;
                }
                let owner = frame.owner;
                if let Context::Generator(o) = owner {
                    self.release_frame(cp);
                    let waiting = &self.generators[o.index()];
                    if waiting.state == GeneratorState::Blocked && waiting.blocked.is_empty() {
                        work.push(o);
                    }
                }
            }
        }
    }

    /// Generators a blocked generator is waiting on.
    fn producers_of(&self, g: GeneratorId) -> Vec<GeneratorId> {
        self.generators[g.index()]
            .blocked
            .iter()
            .filter_map(|cp| self.frames.get(cp.index()).and_then(Option::as_ref))
            .map(|frame| frame.generator)
            .collect()
    }

    fn directly_live(&self, g: GeneratorId) -> bool {
        let generator = &self.generators[g.index()];
        generator.state == GeneratorState::Ready
            || generator.blocked.iter().any(|&cp| self.frame_ready(cp))
    }

    /// Complete every generator reachable from `seeds` that can no longer
    /// make progress. Returns how many were completed.
    ///
    /// A depth-first walk over the waits-on graph marks each visited node
    /// `Unknown` before descending, so cycles terminate; a node is `Live` if
    /// it can run now or waits on a `Live` node. Liveness is then pushed
    /// forward to the owners of suspended frames until nothing changes.
    /// Whatever is still `Unknown` is deadlocked.
    pub(crate) fn check_for_completions(&mut self, seeds: &[GeneratorId]) -> usize {
        self.metrics.record_completion_check();
        let mut marks: FxHashMap<GeneratorId, Mark> = FxHashMap::default();
        let mut visited: Vec<GeneratorId> = Vec::new();

        for &seed in seeds {
            if seed.index() >= self.generators.len()
                || self.generators[seed.index()].is_complete()
                || marks.contains_key(&seed)
            {
                continue;
            }
            // (node, producers, next producer)
            let mut stack: Vec<(GeneratorId, Vec<GeneratorId>, usize)> = Vec::new();
            marks.insert(seed, Mark::Unknown);
            visited.push(seed);
            if self.directly_live(seed) {
                marks.insert(seed, Mark::Live);
                continue;
            }
            stack.push((seed, self.producers_of(seed), 0));

            while let Some((node, producers, next)) = stack.last_mut() {
                let node = *node;
                if marks.get(&node) == Some(&Mark::Live) || *next >= producers.len() {
                    stack.pop();
                    if marks.get(&node) == Some(&Mark::Live) {
                        if let Some((parent, _, _)) = stack.last() {
                            marks.insert(*parent, Mark::Live);
                        }
                    }
                    continue;
                }
                let p = producers[*next];
                *next += 1;
                if self.generators[p.index()].is_complete() {
                    continue;
                }
                match marks.get(&p) {
                    Some(Mark::Live) => {
                        marks.insert(node, Mark::Live);
                    }
                    Some(Mark::Unknown) => {}
                    None => {
                        marks.insert(p, Mark::Unknown);
                        visited.push(p);
                        if self.directly_live(p) {
                            marks.insert(p, Mark::Live);
                            marks.insert(node, Mark::Live);
                        } else {
                            let producers = self.producers_of(p);
                            stack.push((p, producers, 0));
                        }
                    }
                }
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &g in &visited {
                if marks.get(&g) != Some(&Mark::Live) {
                    continue;
                }
                for cp in &self.generators[g.index()].consumers {
                    let Some(frame) = self.frames.get(cp.index()).and_then(Option::as_ref) else {
                        continue;
                    };
                    if let Context::Generator(owner) = frame.owner {
                        if frame.suspended && marks.get(&owner) == Some(&Mark::Unknown) {
                            marks.insert(owner, Mark::Live);
                            changed = true;
                        }
                    }
                }
            }
        }

        let dead: Vec<GeneratorId> = visited
            .into_iter()
            .filter(|g| marks.get(g) == Some(&Mark::Unknown))
            .filter(|g| !self.generators[g.index()].is_complete())
            .collect();
        if !dead.is_empty() {
            debug!(count = dead.len(), "completing deadlocked generators");
            self.metrics.record_deadlock_completions(dead.len() as u64);
        }
        for &g in &dead {
            self.set_complete(g);
        }
        dead.len()
    }

    /// Work the agenda until `ready` holds. Falls back to a completion check
    /// whenever the agenda drains. Returns false if no further progress is
    /// possible.
    pub(super) fn run_until(
        &mut self,
        target: GeneratorId,
        data: &dyn Finder,
        ready: impl Fn(&Backchainer) -> bool,
    ) -> bool {
        let mut pumped: Vec<GeneratorId> = Vec::new();
        let mut since_check = 0usize;
        loop {
            if ready(self) {
                return true;
            }
            let Some(entry) = self.agenda.pop_front() else {
                pumped.push(target);
                let completed = self.check_for_completions(&pumped);
                pumped.clear();
                if completed == 0 && self.agenda.is_empty() {
                    return ready(self);
                }
                continue;
            };
            self.metrics.observe_agenda_len(self.agenda.len() as u64 + 1);
            match entry {
                AgendaEntry::Start(g) => {
                    self.pump_generator(g, None, data);
                    pumped.push(g);
                }
                AgendaEntry::Resume(cp) => {
                    let owner = match self.frames.get(cp.index()).and_then(Option::as_ref) {
                        Some(frame) if frame.scheduled => frame.owner,
                        _ => continue,
                    };
                    if let Context::Generator(o) = owner {
                        self.pump_generator(o, Some(cp), data);
                        pumped.push(o);
                    }
                }
            }
            since_check += 1;
            if self.check_interval > 0 && since_check >= self.check_interval {
                since_check = 0;
                pumped.push(target);
                self.check_for_completions(&pumped);
                pumped.clear();
            }
        }
    }
}

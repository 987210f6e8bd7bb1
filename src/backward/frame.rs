use super::generator::GeneratorId;
use super::interpreter::Branch;
use super::query::QueryId;
use crate::triple::TriplePattern;

/// Handle into the consumer frame arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChoicePointId(pub(crate) u32);

impl ChoicePointId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Who receives the results a consumer frame reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Generator(GeneratorId),
    Top(QueryId),
}

/// A subgoal being solved by reading another generator's results.
#[derive(Debug)]
pub(crate) struct ConsumerFrame {
    /// Producer being read.
    pub generator: GeneratorId,
    pub owner: Context,
    /// Next unread result.
    pub index: usize,
    /// The call, in the owner's variable space.
    pub call: TriplePattern,
    /// Owner's continuation after the call succeeds.
    pub branch: Branch,
    /// Parked in the owner's blocked set, waiting for results.
    pub suspended: bool,
    /// A resume entry for this frame is on the agenda.
    pub scheduled: bool,
}

/// Result of stepping a consumer frame.
#[derive(Debug)]
pub(crate) enum Consumed {
    Branch(Branch),
    Exhausted,
    Suspend,
}

/// Unit of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AgendaEntry {
    /// First pump of a new generator.
    Start(GeneratorId),
    /// Re-enter the owner of a frame whose producer has new results.
    Resume(ChoicePointId),
}

use super::network::Activation;
use std::collections::VecDeque;

/// Deferred activations of non-monotonic rules, fired one at a time once the
/// network is otherwise quiet.
#[derive(Debug, Default)]
pub(crate) struct ConflictSet {
    pending: VecDeque<Activation>,
}

impl ConflictSet {
    pub fn push(&mut self, activation: Activation) {
        self.pending.push_back(activation);
    }

    pub fn pop(&mut self) -> Option<Activation> {
        self.pending.pop_front()
    }

    /// Drop a queued activation whose support has been retracted.
    /// Returns true if one was found.
    pub fn cancel(&mut self, terminal: usize, support: &[crate::triple::Triple]) -> bool {
        let found = self
            .pending
            .iter()
            .position(|a| a.terminal == terminal && a.token.support.as_slice() == support);
        match found {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

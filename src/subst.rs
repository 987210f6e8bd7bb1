use crate::term::{Term, TermId, TermStore};
use crate::triple::{Triple, TriplePattern};
use smallvec::SmallVec;

/// Variable bindings for one rule activation or one resolution branch.
///
/// Slots are dense (`Var(i)` reads slot `i`). Every `bind` is recorded on a
/// trail so a failed match can be undone with [`BindingEnv::rollback`]
/// without cloning the whole vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingEnv {
    slots: Vec<Option<TermId>>,
    trail: Vec<u32>,
}

/// Trail position returned by [`BindingEnv::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

impl BindingEnv {
    pub fn new(num_vars: usize) -> Self {
        Self {
            slots: vec![None; num_vars],
            trail: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append `n` fresh unbound slots and return the index of the first.
    /// Used to rename a rule's variables apart from the caller's.
    pub fn extend(&mut self, n: usize) -> u32 {
        let offset = self.slots.len() as u32;
        self.slots.resize(self.slots.len() + n, None);
        offset
    }

    pub fn get(&self, slot: u32) -> Option<TermId> {
        self.slots.get(slot as usize).copied().flatten()
    }

    pub fn is_bound(&self, slot: u32) -> bool {
        self.get(slot).is_some()
    }

    pub fn bind(&mut self, slot: u32, value: TermId) {
        let idx = slot as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, None);
        }
        self.slots[idx] = Some(value);
        self.trail.push(slot);
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.trail.len())
    }

    /// Undo every binding made since `mark`.
    pub fn rollback(&mut self, mark: Checkpoint) {
        while self.trail.len() > mark.0 {
            if let Some(slot) = self.trail.pop() {
                self.slots[slot as usize] = None;
            }
        }
    }

    /// Forget the trail. Bindings stay; they just can no longer be rolled back.
    pub fn commit(&mut self) {
        self.trail.clear();
    }

    /// Follow variable bindings until reaching an unbound variable or a
    /// non-variable node. Functor arguments are not visited.
    pub fn deref(&self, term: TermId, terms: &TermStore) -> TermId {
        let mut current = term;
        // Binding chains cannot be longer than the number of slots.
        for _ in 0..=self.slots.len() {
            match terms.resolve(current) {
                Some(Term::Var(idx)) => match self.get(idx) {
                    Some(bound) if bound != current => current = bound,
                    _ => return current,
                },
                _ => return current,
            }
        }
        current
    }

    /// Fully instantiate a node, including inside functors. Unbound
    /// variables remain as variables.
    pub fn resolve(&self, term: TermId, terms: &TermStore) -> TermId {
        let head = self.deref(term, terms);
        match terms.resolve(head) {
            Some(Term::Functor(name, args)) => {
                let mut changed = false;
                let resolved: SmallVec<[TermId; 4]> = args
                    .iter()
                    .map(|&arg| {
                        let out = self.resolve(arg, terms);
                        changed |= out != arg;
                        out
                    })
                    .collect();
                if changed {
                    terms.functor_sym(name, resolved)
                } else {
                    head
                }
            }
            _ => head,
        }
    }

    /// The fully resolved value of `term` if it is ground.
    pub fn ground_value(&self, term: TermId, terms: &TermStore) -> Option<TermId> {
        let value = self.resolve(term, terms);
        terms.is_ground(value).then_some(value)
    }

    pub fn resolve_pattern(&self, pattern: &TriplePattern, terms: &TermStore) -> TriplePattern {
        pattern.map_nodes(|n| self.resolve(n, terms))
    }

    /// Instantiate a pattern into a triple; `None` if any position stays open.
    pub fn ground_triple(&self, pattern: &TriplePattern, terms: &TermStore) -> Option<Triple> {
        self.resolve_pattern(pattern, terms).as_triple(terms)
    }

    /// Match a pattern against a ground triple, extending the bindings.
    /// On failure the environment is left unchanged.
    pub fn match_triple(
        &mut self,
        pattern: &TriplePattern,
        triple: &Triple,
        terms: &TermStore,
    ) -> bool {
        crate::unify::unify_patterns(pattern, &triple.as_pattern(), self, terms)
    }

    /// Copy every slot bound in `other` into `self` where `self` is unbound.
    pub fn merge(&mut self, other: &BindingEnv) {
        if other.slots.len() > self.slots.len() {
            self.slots.resize(other.slots.len(), None);
        }
        for (i, value) in other.slots.iter().enumerate() {
            if self.slots[i].is_none() {
                self.slots[i] = *value;
            }
        }
    }

    /// True if both environments hold the same value for every listed slot.
    pub fn agrees_on(&self, other: &BindingEnv, slots: &[u32]) -> bool {
        slots.iter().all(|&s| self.get(s) == other.get(s))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, TermId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|t| (i as u32, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn bind_and_rollback() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let mut env = BindingEnv::new(2);
        env.bind(0, a);
        let mark = env.checkpoint();
        env.bind(1, a);
        assert!(env.is_bound(1));
        env.rollback(mark);
        assert!(!env.is_bound(1), "Binding after checkpoint is undone");
        assert_eq!(env.get(0), Some(a), "Binding before checkpoint survives");
    }

    #[test]
    fn extend_returns_offset() {
        let mut env = BindingEnv::new(3);
        assert_eq!(env.extend(2), 3);
        assert_eq!(env.len(), 5);
    }

    #[test]
    fn deref_follows_chain() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let mut env = BindingEnv::new(3);
        env.bind(2, terms.var(1));
        env.bind(1, terms.var(0));
        env.bind(0, a);
        assert_eq!(env.deref(terms.var(2), &terms), a);
    }

    #[test]
    fn resolve_rebuilds_functor() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let f = terms.functor("f", smallvec![terms.var(0), terms.var(1)]);
        let mut env = BindingEnv::new(2);
        env.bind(0, a);
        let partly = env.resolve(f, &terms);
        assert_eq!(partly, terms.functor("f", smallvec![a, terms.var(1)]));
        assert!(env.ground_value(f, &terms).is_none());
        env.bind(1, a);
        assert_eq!(
            env.ground_value(f, &terms),
            Some(terms.functor("f", smallvec![a, a]))
        );
    }

    #[test]
    fn match_triple_leaves_env_on_failure() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let b = terms.iri("ex:b");
        let p = terms.iri("ex:p");
        let pattern = TriplePattern::new(terms.var(0), p, terms.var(0));
        let mut env = BindingEnv::new(1);
        assert!(!env.match_triple(&pattern, &Triple::new(a, p, b), &terms));
        assert!(!env.is_bound(0), "Failed match must not leak bindings");
        assert!(env.match_triple(&pattern, &Triple::new(a, p, a), &terms));
        assert_eq!(env.get(0), Some(a));
    }

    #[test]
    fn merge_and_agree() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let b = terms.iri("ex:b");
        let mut left = BindingEnv::new(3);
        left.bind(0, a);
        let mut right = BindingEnv::new(3);
        right.bind(0, a);
        right.bind(2, b);
        assert!(left.agrees_on(&right, &[0]));
        left.merge(&right);
        assert_eq!(left.get(2), Some(b));
        assert_eq!(left.iter().count(), 2);
    }
}

use crate::subst::BindingEnv;
use crate::term::{Term, TermId, TermStore};
use crate::triple::TriplePattern;
use smallvec::SmallVec;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Unify two nodes under `env`, extending it with new bindings.
///
/// Uses an explicit worklist and an occurs check. On failure every binding
/// made by this call is rolled back.
pub fn unify(a: TermId, b: TermId, env: &mut BindingEnv, terms: &TermStore) -> bool {
    let mark = env.checkpoint();
    let mut worklist: SmallVec<[(TermId, TermId); 16]> = SmallVec::new();
    worklist.push((a, b));
    if unify_worklist(&mut worklist, env, terms) {
        true
    } else {
        env.rollback(mark);
        false
    }
}

/// Unify the three positions of two patterns as one transaction.
pub fn unify_patterns(
    a: &TriplePattern,
    b: &TriplePattern,
    env: &mut BindingEnv,
    terms: &TermStore,
) -> bool {
    let mark = env.checkpoint();
    let mut worklist: SmallVec<[(TermId, TermId); 16]> = SmallVec::new();
    // Predicates first: they fail fastest.
    worklist.push((a.object, b.object));
    worklist.push((a.subject, b.subject));
    worklist.push((a.predicate, b.predicate));
    if unify_worklist(&mut worklist, env, terms) {
        true
    } else {
        env.rollback(mark);
        false
    }
}

fn unify_worklist(
    worklist: &mut SmallVec<[(TermId, TermId); 16]>,
    env: &mut BindingEnv,
    terms: &TermStore,
) -> bool {
    while let Some((a, b)) = worklist.pop() {
        let a = env.deref(a, terms);
        let b = env.deref(b, terms);
        if a == b {
            continue;
        }

        match (terms.resolve(a), terms.resolve(b)) {
            (Some(Term::Var(ia)), Some(Term::Var(ib))) => {
                // Bind the higher slot to the lower so chains point outward
                // from renamed-apart rule variables to the caller's.
                if ia < ib {
                    env.bind(ib, a);
                } else {
                    env.bind(ia, b);
                }
            }
            (Some(Term::Var(idx)), Some(_)) => {
                if occurs(idx, b, env, terms) {
                    #[cfg(feature = "tracing")]
                    trace!(var = idx, "unify_occurs_check_failed");
                    return false;
                }
                env.bind(idx, b);
            }
            (Some(_), Some(Term::Var(idx))) => {
                if occurs(idx, a, env, terms) {
                    #[cfg(feature = "tracing")]
                    trace!(var = idx, "unify_occurs_check_failed");
                    return false;
                }
                env.bind(idx, a);
            }
            (Some(Term::Functor(f1, args1)), Some(Term::Functor(f2, args2))) => {
                if f1 != f2 || args1.len() != args2.len() {
                    return false;
                }
                for (x, y) in args1.iter().zip(args2.iter()) {
                    worklist.push((*x, *y));
                }
            }
            // Distinct ground nodes: ids differ so the nodes differ.
            _ => return false,
        }
    }
    true
}

/// Does variable `var` occur in `term` under `env`?
fn occurs(var: u32, term: TermId, env: &BindingEnv, terms: &TermStore) -> bool {
    let mut stack: SmallVec<[TermId; 16]> = SmallVec::new();
    stack.push(term);
    while let Some(t) = stack.pop() {
        let t = env.deref(t, terms);
        match terms.resolve(t) {
            Some(Term::Var(idx)) if idx == var => return true,
            Some(Term::Functor(_, args)) => stack.extend(args.iter().copied()),
            _ => {}
        }
    }
    false
}

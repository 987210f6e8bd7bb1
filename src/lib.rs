//! Hybrid rule engine over triple graphs: an incremental RETE forward
//! engine and a tabled backward reasoner sharing one term store.

pub mod backward;
pub mod builtin;
pub mod config;
pub mod context;
pub mod error;
pub mod forward;
pub mod graph;
pub mod hooks;
pub mod infgraph;
pub mod metrics;
pub mod rete;
pub mod rule;
pub mod subst;
pub mod symbol;
pub mod term;
pub mod trace;
pub mod triple;
pub mod unify;
pub mod vocab;

pub use config::ReasonerConfig;
pub use error::{BuiltinError, ReasonerError};
pub use infgraph::{AnswerStream, InfGraph};
pub use rule::{ClauseEntry, Functor, Rule};
pub use term::{TermId, TermStore};
pub use triple::{Triple, TriplePattern};

#[cfg(test)]
pub(crate) mod test_utils;

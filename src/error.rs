use thiserror::Error;

/// Errors surfaced to callers of the reasoner.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReasonerError {
    #[error("malformed rule {rule}: {reason}")]
    MalformedRule { rule: String, reason: String },

    #[error("rule {rule} calls undefined builtin {name}")]
    UndefinedBuiltin { name: String, rule: String },

    #[error("malformed list: {reason}")]
    MalformedList { reason: String },

    #[error("graph modified while a query iterator was open")]
    ConcurrentModification,

    #[error("query iterator used after close")]
    IteratorClosed,

    #[error("builtin {name} failed: {source}")]
    BuiltinFailure {
        name: String,
        #[source]
        source: BuiltinError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors raised while evaluating a builtin call.
///
/// In rule bodies these are logged and treated as a failed guard; they
/// never abort the surrounding run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuiltinError {
    #[error("division by zero")]
    DivideByZero,

    #[error("argument {index} of {name} is not numeric")]
    NotNumeric { name: String, index: usize },

    #[error("{name} expects {expected} arguments, found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of {name} must be bound")]
    Unbound { name: String, index: usize },

    #[error("{name} refers to body clause {index}, which is not a triple pattern")]
    InvalidClauseIndex { name: String, index: usize },

    #[error("{name} cannot be used in a rule {position}")]
    Unsupported { name: String, position: &'static str },
}

impl From<serde_json::Error> for ReasonerError {
    fn from(err: serde_json::Error) -> Self {
        ReasonerError::Config(err.to_string())
    }
}

//! Feature-gated logging facade.
//!
//! With the `tracing` feature (on by default) this re-exports the tracing
//! crate's macros. Without it every macro expands to nothing, so engine code
//! can log unconditionally:
//!
//! ```rust,ignore
//! use crate::trace::{debug, warn};
//!
//! debug!(rule = %name, "rule fired");
//! warn!(error = %err, "guard failed, skipping binding");
//! ```

#[cfg(feature = "tracing")]
pub use tracing::{debug, debug_span, error, info, info_span, trace, trace_span, warn, Level, Span};

#[cfg(not(feature = "tracing"))]
mod noop {
    pub struct Span;

    impl Span {
        pub fn none() -> Self {
            Span
        }

        pub fn entered(self) -> SpanGuard {
            SpanGuard
        }
    }

    pub struct SpanGuard;

    #[derive(Clone, Copy, Debug)]
    pub struct Level;

    impl Level {
        pub const TRACE: Level = Level;
        pub const DEBUG: Level = Level;
        pub const INFO: Level = Level;
        pub const WARN: Level = Level;
        pub const ERROR: Level = Level;
    }

    #[macro_export]
    macro_rules! trace {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! debug {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! info {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! warn {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! error {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! trace_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    #[macro_export]
    macro_rules! debug_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    #[macro_export]
    macro_rules! info_span {
        ($($tt:tt)*) => {
            $crate::trace::Span::none()
        };
    }

    pub use crate::{debug, debug_span, error, info, info_span, trace, trace_span, warn};
}

#[cfg(not(feature = "tracing"))]
pub use noop::*;

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "rulesys=info";

/// Install a stderr subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Safe to call more than once.
#[cfg(feature = "tracing")]
pub fn init_subscriber_with(default_filter: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_ansi(false),
        )
        .with(filter)
        .try_init()
        .ok();
}

#[cfg(not(feature = "tracing"))]
pub fn init_subscriber_with(_default_filter: &str) {}

pub fn init_subscriber() {
    init_subscriber_with(DEFAULT_FILTER);
}

/// Install a subscriber at the verbosity a configuration asks for:
/// per-step interpreter events when `trace` is set, info otherwise.
pub fn init_for(config: &crate::config::ReasonerConfig) {
    if config.trace {
        init_subscriber_with("rulesys=trace");
    } else {
        init_subscriber();
    }
}

#[cfg(test)]
#[path = "tests/trace.rs"]
mod tests;

use super::*;
use crate::config::ReasonerConfig;

#[test]
fn trace_macros_compile() {
    trace!("trace message");
    debug!(rule = "r1", "debug message");
    info!("info message");
    warn!(error = %"boom", "warn message");
    error!("error message");

    let _entered = debug_span!("entered_span").entered();
}

#[test]
fn init_subscriber_is_idempotent() {
    init_subscriber();
    init_subscriber();
}

#[test]
fn init_for_trace_config_does_not_panic() {
    let config = ReasonerConfig {
        trace: true,
        ..ReasonerConfig::default()
    };
    init_for(&config);
    init_for(&ReasonerConfig::default());
}

//! Reasoner counters.
//!
//! One [`EngineMetrics`] is shared (behind an `Arc`) by the forward and
//! backward engines of an inference graph. `rules_fired` backs the public
//! rule-firing count, so the counters are always compiled in.
//!
//! ```rust,ignore
//! let report = graph.metrics();
//! println!("{}", report);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate counters. All use relaxed ordering; a report taken after the
/// engine is idle is exact.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub triples_injected: AtomicU64,
    pub rules_fired: AtomicU64,
    pub tokens_joined: AtomicU64,
    pub guard_errors: AtomicU64,
    pub over_deleted: AtomicU64,
    pub rederived: AtomicU64,
    pub generators_created: AtomicU64,
    pub generators_completed: AtomicU64,
    pub deadlock_completions: AtomicU64,
    pub completion_checks: AtomicU64,
    pub answers_yielded: AtomicU64,
    pub max_agenda_len: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_injection(&self) {
        self.triples_injected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rule_fired(&self) {
        self.rules_fired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_join(&self) {
        self.tokens_joined.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_guard_error(&self) {
        self.guard_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_over_delete(&self) {
        self.over_deleted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rederive(&self) {
        self.rederived.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_generator_created(&self) {
        self.generators_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_generator_completed(&self) {
        self.generators_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_deadlock_completions(&self, count: u64) {
        self.deadlock_completions.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_completion_check(&self) {
        self.completion_checks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_answer(&self) {
        self.answers_yielded.fetch_add(1, Ordering::Relaxed);
    }

    /// Raise the agenda high-water mark if `len` exceeds it.
    #[inline]
    pub fn observe_agenda_len(&self, len: u64) {
        let mut current = self.max_agenda_len.load(Ordering::Relaxed);
        while len > current {
            match self.max_agenda_len.compare_exchange_weak(
                current,
                len,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }

    pub fn rules_fired(&self) -> u64 {
        self.rules_fired.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            triples_injected: self.triples_injected.load(Ordering::Relaxed),
            rules_fired: self.rules_fired.load(Ordering::Relaxed),
            tokens_joined: self.tokens_joined.load(Ordering::Relaxed),
            guard_errors: self.guard_errors.load(Ordering::Relaxed),
            over_deleted: self.over_deleted.load(Ordering::Relaxed),
            rederived: self.rederived.load(Ordering::Relaxed),
            generators_created: self.generators_created.load(Ordering::Relaxed),
            generators_completed: self.generators_completed.load(Ordering::Relaxed),
            deadlock_completions: self.deadlock_completions.load(Ordering::Relaxed),
            completion_checks: self.completion_checks.load(Ordering::Relaxed),
            answers_yielded: self.answers_yielded.load(Ordering::Relaxed),
            max_agenda_len: self.max_agenda_len.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.triples_injected,
            &self.rules_fired,
            &self.tokens_joined,
            &self.guard_errors,
            &self.over_deleted,
            &self.rederived,
            &self.generators_created,
            &self.generators_completed,
            &self.deadlock_completions,
            &self.completion_checks,
            &self.answers_yielded,
            &self.max_agenda_len,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of the counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    pub triples_injected: u64,
    pub rules_fired: u64,
    pub tokens_joined: u64,
    pub guard_errors: u64,
    pub over_deleted: u64,
    pub rederived: u64,
    pub generators_created: u64,
    pub generators_completed: u64,
    pub deadlock_completions: u64,
    pub completion_checks: u64,
    pub answers_yielded: u64,
    pub max_agenda_len: u64,
}

impl MetricsReport {
    /// Fraction of created generators that have completed.
    pub fn completion_rate(&self) -> f64 {
        if self.generators_created == 0 {
            1.0
        } else {
            self.generators_completed as f64 / self.generators_created as f64
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Reasoner Metrics ===")?;
        writeln!(f, "Triples injected:   {}", self.triples_injected)?;
        writeln!(
            f,
            "Rules fired:        {} ({} guard errors)",
            self.rules_fired, self.guard_errors
        )?;
        writeln!(f, "Tokens joined:      {}", self.tokens_joined)?;
        writeln!(
            f,
            "Retraction:         {} over-deleted, {} re-derived",
            self.over_deleted, self.rederived
        )?;
        writeln!(
            f,
            "Generators:         {} created, {} completed ({:.1}%)",
            self.generators_created,
            self.generators_completed,
            self.completion_rate() * 100.0
        )?;
        writeln!(
            f,
            "Completion checks:  {} ({} deadlocked generators completed)",
            self.completion_checks, self.deadlock_completions
        )?;
        writeln!(f, "Max agenda length:  {}", self.max_agenda_len)?;
        writeln!(f, "Answers yielded:    {}", self.answers_yielded)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/metrics.rs"]
mod tests;

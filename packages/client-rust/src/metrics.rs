//! Flush and persistence metrics.
//!
//! Emitted through the `metrics` facade; nothing is recorded until the host
//! application installs a recorder.

use std::time::Duration;

/// Transactions handed to their mutation function.
pub const FLUSHES_TOTAL: &str = "pacer_flushes_total";
/// Mutation function calls that returned an error.
pub const PERSIST_FAILURES_TOTAL: &str = "pacer_persist_failures_total";
/// Wall time spent in the mutation function.
pub const PERSIST_DURATION_MS: &str = "pacer_persist_duration_ms";

/// Registers descriptions for every metric above.
pub fn describe() {
    ::metrics::describe_counter!(FLUSHES_TOTAL, "Transactions flushed to persistence");
    ::metrics::describe_counter!(PERSIST_FAILURES_TOTAL, "Persistence calls that failed");
    ::metrics::describe_histogram!(
        PERSIST_DURATION_MS,
        ::metrics::Unit::Milliseconds,
        "Duration of persistence calls"
    );
}

pub(crate) fn record_flush(strategy: &'static str) {
    ::metrics::counter!(FLUSHES_TOTAL, "strategy" => strategy).increment(1);
}

pub(crate) fn record_persist(strategy: &'static str, elapsed: Duration, ok: bool) {
    ::metrics::histogram!(PERSIST_DURATION_MS, "strategy" => strategy)
        .record(elapsed.as_secs_f64() * 1000.0);
    if !ok {
        ::metrics::counter!(PERSIST_FAILURES_TOTAL, "strategy" => strategy).increment(1);
    }
}

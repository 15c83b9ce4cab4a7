//! Sweep metrics.
//!
//! Counters and histograms for the statistics sweep. They complement the
//! structured logs emitted at each phase.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

// ============================================================================
// Cycle Metrics
// ============================================================================

/// Completed cycles, labelled by outcome.
pub const CYCLES_TOTAL: &str = "statsweep_cycles_total";

/// Cycle duration histogram.
pub const CYCLE_DURATION: &str = "statsweep_cycle_duration_seconds";

/// Unix timestamp of the last completed cycle.
pub const LAST_SUCCESS_TIMESTAMP: &str = "statsweep_last_success_timestamp_seconds";

// ============================================================================
// Sweep Metrics
// ============================================================================

/// Statistics rows scanned.
pub const ROWS_SCANNED: &str = "statsweep_rows_scanned_total";

/// Expired keys collected, labelled by level.
pub const KEYS_EXPIRED: &str = "statsweep_keys_expired_total";

/// Delete statements executed.
pub const DELETES_EXECUTED: &str = "statsweep_deletes_executed_total";

/// Table-level registry entries removed.
pub const REGISTRY_ENTRIES_REMOVED: &str = "statsweep_registry_entries_removed_total";

/// Errors, labelled by phase.
pub const ERRORS_TOTAL: &str = "statsweep_errors_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all sweep metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(CYCLES_TOTAL, "Total sweep cycles by outcome");
    describe_histogram!(CYCLE_DURATION, "Duration of sweep cycles in seconds");
    describe_gauge!(
        LAST_SUCCESS_TIMESTAMP,
        "Unix timestamp of the last completed sweep cycle"
    );
    describe_counter!(ROWS_SCANNED, "Total statistics rows scanned");
    describe_counter!(KEYS_EXPIRED, "Total expired keys collected by level");
    describe_counter!(DELETES_EXECUTED, "Total delete statements executed");
    describe_counter!(
        REGISTRY_ENTRIES_REMOVED,
        "Total table-level statistics registry entries removed"
    );
    describe_counter!(ERRORS_TOTAL, "Total sweep errors by phase");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records the end of a cycle.
pub fn record_cycle(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];

    counter!(CYCLES_TOTAL, &labels).increment(1);
    histogram!(CYCLE_DURATION, &labels).record(duration_secs);
}

/// Records a skipped cycle.
pub fn record_cycle_skipped(reason: &'static str) {
    counter!(CYCLES_TOTAL, "outcome" => "skipped", "reason" => reason).increment(1);
}

/// Records the timestamp of a completed cycle.
#[allow(clippy::cast_precision_loss)]
pub fn record_last_success(unix_secs: i64) {
    gauge!(LAST_SUCCESS_TIMESTAMP).set(unix_secs as f64);
}

/// Records rows scanned from one statistics table.
pub fn record_rows_scanned(table: &str, rows: u64) {
    counter!(ROWS_SCANNED, "table" => table.to_string()).increment(rows);
}

/// Records an expired key of the given level.
pub fn record_key_expired(level: &'static str) {
    counter!(KEYS_EXPIRED, "level" => level).increment(1);
}

/// Records an executed delete statement.
pub fn record_delete(table: &str, column: &'static str) {
    counter!(DELETES_EXECUTED, "table" => table.to_string(), "column" => column).increment(1);
}

/// Records removed registry entries.
pub fn record_registry_removed(count: u64) {
    counter!(REGISTRY_ENTRIES_REMOVED).increment(count);
}

/// Records an error in the given phase.
pub fn record_error(phase: &'static str) {
    counter!(ERRORS_TOTAL, "phase" => phase).increment(1);
}

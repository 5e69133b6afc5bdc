//! Metric name constants and descriptions.
//!
//! Every metric deploycheck records is named here. Recording goes through the
//! `metrics` facade, so nothing is exported unless the host process installs a
//! recorder.
//!
//! # Naming convention
//!
//! - prefix: `deploycheck_`
//! - suffix: `_total` (counter), `_seconds` (histogram)
//!
//! # Example
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(deploycheck_core::metrics::COMMANDS_TOTAL,
//!     deploycheck_core::metrics::LABEL_PROGRAM => "helm").increment(1);
//! ```

// ─── label keys ───────────────────────────────────────────────────

/// Program label key (helm, kubectl)
pub const LABEL_PROGRAM: &str = "program";

/// Result label key (success, failure)
pub const LABEL_RESULT: &str = "result";

/// Scenario label key (install-upgrade, failure-recovery, load, scaling)
pub const LABEL_SCENARIO: &str = "scenario";

// ─── commands ─────────────────────────────────────────────────────

/// External commands executed (counter, labels: program, result)
pub const COMMANDS_TOTAL: &str = "deploycheck_commands_total";

/// External command wall-clock duration (histogram, seconds, label: program)
pub const COMMAND_DURATION_SECONDS: &str = "deploycheck_command_duration_seconds";

// ─── polling ──────────────────────────────────────────────────────

/// Observation queries issued while waiting for a state (counter)
pub const POLL_ATTEMPTS_TOTAL: &str = "deploycheck_poll_attempts_total";

/// Waits that hit their deadline (counter)
pub const POLL_TIMEOUTS_TOTAL: &str = "deploycheck_poll_timeouts_total";

// ─── load ─────────────────────────────────────────────────────────

/// HTTP requests issued by the load driver (counter, label: result)
pub const LOAD_REQUESTS_TOTAL: &str = "deploycheck_load_requests_total";

// ─── scenarios ────────────────────────────────────────────────────

/// Scenarios finished (counter, labels: scenario, result)
pub const SCENARIOS_TOTAL: &str = "deploycheck_scenarios_total";

/// Scenario wall-clock duration (histogram, seconds, label: scenario)
pub const SCENARIO_DURATION_SECONDS: &str = "deploycheck_scenario_duration_seconds";

/// Cleanup commands that failed and were suppressed (counter)
pub const CLEANUP_FAILURES_TOTAL: &str = "deploycheck_cleanup_failures_total";

/// Registers descriptions for all metrics with the installed recorder.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(COMMANDS_TOTAL, "External helm/kubectl commands executed");
    describe_histogram!(
        COMMAND_DURATION_SECONDS,
        "Wall-clock duration of external commands in seconds"
    );
    describe_counter!(
        POLL_ATTEMPTS_TOTAL,
        "Observation queries issued while waiting for cluster state"
    );
    describe_counter!(POLL_TIMEOUTS_TOTAL, "Waits that reached their deadline");
    describe_counter!(LOAD_REQUESTS_TOTAL, "HTTP requests issued by the load driver");
    describe_counter!(SCENARIOS_TOTAL, "Verification scenarios finished");
    describe_histogram!(
        SCENARIO_DURATION_SECONDS,
        "Wall-clock duration of verification scenarios in seconds"
    );
    describe_counter!(
        CLEANUP_FAILURES_TOTAL,
        "Best-effort cleanup commands that failed"
    );
}

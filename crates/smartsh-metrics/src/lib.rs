//! Thread-safe in-memory counters for run/job outcomes, rendered as
//! Prometheus text exposition. Grounded on the pack's metrics crate: a
//! `definitions` module of name constants plus a thin `recorder` wrapper
//! around `metrics-exporter-prometheus`.
//!
//! Unlike the teacher, which makes the exporter optional behind a
//! `prometheus` cargo feature (it serves many call sites that may or may not
//! want metrics), this crate has exactly one consumer -- the daemon's
//! `/metrics` route -- so the exporter is always compiled in.

pub mod definitions;
pub mod recorder;

pub use recorder::{init_metrics, MetricsHandle};

use smartsh_core::RunStatus;

/// Record one completed run: increments the run counter, adds to the
/// duration sum, and tallies the error type if the run failed.
pub fn record_run(duration_ms: u64, error_type: &str) {
    metrics::counter!(definitions::run::RUNS_TOTAL).increment(1);
    metrics::counter!(definitions::run::DURATION_MS_SUM).increment(duration_ms);
    if error_type != "none" {
        metrics::counter!(
            definitions::run::ERRORS_BY_TYPE_TOTAL,
            definitions::labels::ERROR_TYPE => error_type.to_string()
        )
        .increment(1);
    }
}

/// Record a job's settlement into a terminal status.
pub fn record_job_settled(status: RunStatus) {
    metrics::counter!(definitions::run::JOBS_TOTAL).increment(1);
    match status {
        RunStatus::Completed => {
            metrics::counter!(definitions::run::JOBS_COMPLETED_TOTAL).increment(1);
        },
        RunStatus::Failed => {
            metrics::counter!(definitions::run::JOBS_FAILED_TOTAL).increment(1);
        },
        RunStatus::Blocked => {
            metrics::counter!(definitions::run::JOBS_BLOCKED_TOTAL).increment(1);
        },
        RunStatus::Queued | RunStatus::Running | RunStatus::NeedsApproval => {},
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_run_and_job_settled_do_not_panic_without_a_recorder() {
        // With no global recorder installed, the `metrics` facade falls
        // back to a no-op recorder -- these calls should be inert, not
        // an error.
        record_run(42, "test");
        record_run(10, "none");
        record_job_settled(RunStatus::Completed);
        record_job_settled(RunStatus::Blocked);
    }
}

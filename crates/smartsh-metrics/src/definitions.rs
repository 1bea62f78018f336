//! Metric name and label definitions.
//!
//! Centralizing these as constants (rather than building name strings ad
//! hoc at each call site) keeps the `/metrics` exposition stable across
//! call sites that increment the same series.

/// Run/job counters and histograms.
pub mod run {
    /// Total runs dispatched through the executor.
    pub const RUNS_TOTAL: &str = "smartsh_runs_total";
    /// Run duration, summed, in milliseconds.
    pub const DURATION_MS_SUM: &str = "smartsh_run_duration_ms_sum";
    /// Total jobs ever created.
    pub const JOBS_TOTAL: &str = "smartsh_jobs_total";
    /// Jobs that reached `completed`.
    pub const JOBS_COMPLETED_TOTAL: &str = "smartsh_jobs_completed_total";
    /// Jobs that reached `failed`.
    pub const JOBS_FAILED_TOTAL: &str = "smartsh_jobs_failed_total";
    /// Jobs that reached `blocked`.
    pub const JOBS_BLOCKED_TOTAL: &str = "smartsh_jobs_blocked_total";
    /// Errors classified by the output summarizer, labeled by `error_type`.
    pub const ERRORS_BY_TYPE_TOTAL: &str = "smartsh_errors_by_type_total";
}

/// Label keys shared across the metrics above.
pub mod labels {
    pub const ERROR_TYPE: &str = "error_type";
}

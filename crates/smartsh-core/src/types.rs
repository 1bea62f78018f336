//! Wire and persistence types shared by every smartsh crate.
//!
//! These are the exact schemas a caller (agent, CLI, or the stdio bridge)
//! sees on the wire — field names and casing are load-bearing, not cosmetic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// Allowlist enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowlistMode {
    #[default]
    Off,
    Warn,
    Enforce,
}

/// A submitted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(rename = "unsafe", default, skip_serializing_if = "is_false")]
    pub r#unsafe: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub require_approval: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub dry_run: bool,

    #[serde(rename = "async", default, skip_serializing_if = "is_false")]
    pub r#async: bool,

    /// Defaults to `true` at the `/run` handler per spec §4.6.1 step 8, not
    /// here — this field distinguishes "caller said nothing" from "caller
    /// said false" via `Option`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolated: Option<bool>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeout_sec: u64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_output_kb: u64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_memory_mb: u64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_cpu_seconds: u64,

    #[serde(default)]
    pub allowlist_mode: AllowlistMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowlist_file: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allowed_env: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub open_external_terminal: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_app: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_session_key: Option<String>,
}

impl RunRequest {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            r#unsafe: false,
            require_approval: false,
            dry_run: false,
            r#async: false,
            isolated: None,
            timeout_sec: 0,
            max_output_kb: 0,
            max_memory_mb: 0,
            max_cpu_seconds: 0,
            allowlist_mode: AllowlistMode::Off,
            allowlist_file: None,
            allowed_env: BTreeSet::new(),
            env: BTreeMap::new(),
            open_external_terminal: false,
            terminal_app: None,
            terminal_session_key: None,
        }
    }
}

/// Terminal (and in-flight) run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Blocked,
    NeedsApproval,
}

/// Deterministic-or-LLM output classification, embedded in `RunResponse`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,

    #[serde(default)]
    pub error_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failing_tests: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_issues: Vec<String>,

    /// Not part of spec §3's literal field list, but needed to satisfy
    /// scenario 3 of spec §8 ("summary_source=\"deterministic\""); harmless
    /// additive wire field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_source: Option<String>,
}

impl Summary {
    #[must_use]
    pub fn success() -> Self {
        Self {
            summary: "command completed successfully".to_string(),
            error_type: "none".to_string(),
            summary_source: Some("deterministic".to_string()),
            ..Default::default()
        }
    }
}

/// The invariant result schema returned by `/run` and polled via `/jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(default = "default_true")]
    pub must_use: bool,

    pub job_id: String,
    pub status: RunStatus,
    pub executed: bool,
    pub resolved_command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(flatten)]
    pub summary: Summary,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_approval: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_howto: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_targets: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_tail: String,
}

fn default_true() -> bool {
    true
}

impl RunResponse {
    #[must_use]
    pub fn new(job_id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            must_use: true,
            job_id: job_id.into(),
            status,
            executed: false,
            resolved_command: String::new(),
            exit_code: None,
            summary: Summary::default(),
            blocked_reason: None,
            requires_approval: false,
            approval_id: None,
            approval_message: None,
            approval_howto: None,
            risk_reason: None,
            risk_targets: Vec::new(),
            error: None,
            duration_ms: 0,
            output_tail: String::new(),
        }
    }
}

/// A server-side record of one submitted run and its latest result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub request: RunRequest,
    pub result: Option<RunResponse>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Approval lifecycle state for a risky command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    ApprovedFailed,
}

impl ApprovalStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Executed | Self::ApprovedFailed
        )
    }
}

/// A persisted decision-gate for a risky command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    pub request: RunRequest,
    pub resolved_command: String,
    pub resolved_risk: String,
    pub risk_reason: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_targets: Vec<String>,

    pub status: ApprovalStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Live session state for an interactive PTY, as seen over the HTTP API.
///
/// The daemon owns the non-serializable runtime handles (the PTY master/
/// file pair, the cancellation token, the subscriber set); this is the
/// projection of that state that can cross the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtySessionView {
    pub id: String,
    pub command: String,
    pub cwd: String,
    pub status: RunStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    pub started_at: i64,
    pub updated_at: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_tail: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_summary: Option<Summary>,
}

/// Monotonic id allocator: `{prefix}_{nanos}`, collision-free within a
/// process because `Instant`/epoch nanos only move forward and we hold a
/// process-wide `Mutex` around the last-issued value (see `smartsh_core::ids`).
#[must_use]
pub fn job_id(nanos: u128) -> String {
    format!("job_{nanos}")
}

#[must_use]
pub fn approval_id(nanos: u128) -> String {
    format!("approval_{nanos}")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_summary_matches_round_trip_law() {
        let s = Summary::success();
        assert_eq!(s.summary, "command completed successfully");
        assert_eq!(s.error_type, "none");
    }

    #[test]
    fn run_request_round_trips_through_json() {
        let mut req = RunRequest::new("echo hi");
        req.r#unsafe = true;
        req.r#async = true;
        let json = serde_json::to_string(&req).expect("serialize");
        assert!(json.contains("\"unsafe\":true"));
        assert!(json.contains("\"async\":true"));
        let back: RunRequest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.command, "echo hi");
        assert!(back.r#unsafe);
        assert!(back.r#async);
    }

    #[test]
    fn job_and_approval_ids_use_expected_prefixes() {
        assert_eq!(job_id(42), "job_42");
        assert_eq!(approval_id(42), "approval_42");
    }
}

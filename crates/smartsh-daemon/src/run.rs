//! The `/run` orchestration: resolves cwd, runs the safety pipeline,
//! handles approval gating and dry-run short-circuits, executes the
//! resolved command, and assembles the final `RunResponse`.
//!
//! Implements the twelve-step sequence documented on the handler itself;
//! synchronous and asynchronous (`async=true`) callers share this function,
//! differing only in how the caller awaits the result.

use std::path::{Path, PathBuf};
use std::time::Instant;

use smartsh_core::{
    approval_id, job_id, AllowlistMode, Approval, ApprovalStatus, Job, Result as CoreResult,
    RunRequest, RunResponse, RunStatus,
};
use smartsh_exec::{executor, ExecOpts};
use smartsh_safety::{allowlist, pipeline, policy, risk_targets};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::AppState;

const DEFAULT_MAX_OUTPUT_KB: u64 = 48;
const BLOCKED_OUTPUT_TAIL_CHARS: usize = 1200;

/// Outcome of running one `/run` request to completion (or to a
/// non-executing terminal state: blocked or needs-approval).
pub struct RunOutcome {
    pub response: RunResponse,
    /// Present only when an approval was persisted (`needs_approval`).
    pub approval: Option<Approval>,
}

fn resolve_cwd(requested: Option<&str>) -> CoreResult<PathBuf> {
    let cwd = requested.map_or_else(
        || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        PathBuf::from,
    );
    std::fs::create_dir_all(&cwd)?;
    Ok(cwd)
}

fn load_allowlist(
    mode: AllowlistMode,
    file: Option<&str>,
) -> (Vec<allowlist::Entry>, Option<String>) {
    if mode == AllowlistMode::Off {
        return (Vec::new(), None);
    }
    let Some(path) = file else {
        return (Vec::new(), None);
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => match allowlist::parse(&contents) {
            Ok(entries) => (entries, None),
            Err(e) => (Vec::new(), Some(format!("invalid allowlist file {path}: {e}"))),
        },
        Err(_) if mode == AllowlistMode::Warn => {
            (Vec::new(), Some(format!("allowlist file not found: {path}")))
        },
        Err(e) => (Vec::new(), Some(format!("allowlist file not found: {path}: {e}"))),
    }
}

fn blocked_response(job_id: String, reason: String) -> RunResponse {
    let mut response = RunResponse::new(job_id, RunStatus::Blocked);
    response.blocked_reason = Some(reason);
    response.error = Some("policy".to_string());
    response.exit_code = Some(2);
    response
}

/// Run one `/run` request synchronously to completion. Callers in async
/// mode persist a `queued` job first and invoke this on a background task.
pub async fn execute(state: &AppState, request: RunRequest) -> CoreResult<RunOutcome> {
    let started = Instant::now();
    let id = job_id(smartsh_core::ids::next_nanos());

    if request.command.trim().is_empty() {
        return Ok(RunOutcome {
            response: blocked_response(id, "command must not be empty".to_string()),
            approval: None,
        });
    }

    let cwd = match resolve_cwd(request.cwd.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            return Ok(RunOutcome {
                response: blocked_response(id, format!("could not resolve cwd: {e}")),
                approval: None,
            });
        },
    };

    let (allowlist_entries, allowlist_load_warning) =
        load_allowlist(request.allowlist_mode, request.allowlist_file.as_deref());
    if let Some(reason) = &allowlist_load_warning {
        // An empty entry list already makes enforce mode reject everything
        // via stage 5; this is purely diagnostic.
        warn!(reason, "allowlist file could not be loaded");
    }

    let input = pipeline::PipelineInput {
        command: &request.command,
        cwd: &cwd,
        is_unsafe: request.r#unsafe,
        model_risk: None,
        allowlist_mode: request.allowlist_mode,
        allowlist_entries: &allowlist_entries,
    };

    let outcome = match pipeline::run(&input) {
        Ok(outcome) => outcome,
        Err(blocked) => {
            return Ok(RunOutcome {
                response: blocked_response(id, blocked.blocked_reason),
                approval: None,
            });
        },
    };

    if outcome.requires_confirmation && !request.r#unsafe {
        if !request.require_approval {
            let mut response = blocked_response(
                id,
                outcome.risk_reason.clone().unwrap_or_else(|| "command requires confirmation".to_string()),
            );
            response.risk_reason = outcome.risk_reason;
            return Ok(RunOutcome { response, approval: None });
        }

        let targets = risk_targets::extract(&request.command, &cwd);
        let approval = Approval {
            id: approval_id(smartsh_core::ids::next_nanos()),
            job_id: Some(id.clone()),
            request: request.clone(),
            resolved_command: request.command.clone(),
            resolved_risk: format!("{:?}", outcome.risk_level).to_lowercase(),
            risk_reason: outcome.risk_reason.clone().unwrap_or_default(),
            risk_targets: targets.clone(),
            status: ApprovalStatus::Pending,
            created_at: now_ms(),
            updated_at: now_ms(),
        };

        let mut response = RunResponse::new(id, RunStatus::NeedsApproval);
        response.requires_approval = true;
        response.approval_id = Some(approval.id.clone());
        response.risk_reason = outcome.risk_reason;
        response.risk_targets = targets;
        response.approval_message = Some(format!(
            "command requires approval: {}",
            request.command
        ));
        response.approval_howto =
            Some(format!("POST /approvals/{} {{\"approved\": true}}", approval.id));

        return Ok(RunOutcome { response, approval: Some(approval) });
    }

    if request.dry_run {
        let mut response = RunResponse::new(id, RunStatus::Completed);
        response.executed = false;
        response.exit_code = Some(0);
        response.resolved_command = request.command.clone();
        response.summary.summary = format!("dry run: would execute `{}`", request.command);
        response.summary.error_type = "none".to_string();
        return Ok(RunOutcome { response, approval: None });
    }

    let project_policy = policy::find(&cwd)?.unwrap_or_default();
    let ambient_env: std::collections::BTreeMap<String, String> = std::env::vars().collect();
    let env = project_policy.resolve_env(&ambient_env, &request.allowed_env, &request.env);

    let isolated = request.isolated.unwrap_or(!request.r#unsafe);
    let exec_opts = ExecOpts {
        cwd: Some(cwd.clone()),
        env,
        timeout: (request.timeout_sec > 0).then(|| std::time::Duration::from_secs(request.timeout_sec)),
        max_output_bytes: usize::try_from(
            if request.max_output_kb > 0 { request.max_output_kb } else { DEFAULT_MAX_OUTPUT_KB } * 1024,
        )
        .unwrap_or(usize::MAX),
        isolated,
        max_cpu_seconds: (request.max_cpu_seconds > 0).then_some(request.max_cpu_seconds),
        max_memory_mb: (request.max_memory_mb > 0).then_some(request.max_memory_mb),
    };

    let exec_outcome = if request.open_external_terminal {
        run_in_external_terminal(state, &request, &cwd).await
    } else {
        executor::run(&request.command, &exec_opts, CancellationToken::new())
            .await
            .map(|o| (o.output, o.exit_code, o.duration.as_millis()))
    };

    let (output, exit_code, duration_ms) = match exec_outcome {
        Ok(v) => v,
        Err(e) => {
            let mut response = RunResponse::new(id, RunStatus::Failed);
            response.executed = true;
            response.resolved_command = request.command.clone();
            response.error = Some(e.to_string());
            response.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            smartsh_metrics::record_run(response.duration_ms, "runtime");
            return Ok(RunOutcome { response, approval: None });
        },
    };

    let summary = smartsh_summarize::classify(&request.command, exit_code, &output);

    let status = if exit_code == 0 { RunStatus::Completed } else { RunStatus::Failed };
    let mut response = RunResponse::new(id, status);
    response.executed = true;
    response.resolved_command = request.command.clone();
    response.exit_code = Some(exit_code);
    response.summary = summary;
    response.duration_ms = u64::try_from(duration_ms).unwrap_or(u64::MAX);
    if status == RunStatus::Failed {
        response.output_tail = tail(&output, BLOCKED_OUTPUT_TAIL_CHARS);
    }

    smartsh_metrics::record_run(response.duration_ms, &response.summary.error_type);
    info!(job = %response.job_id, status = ?response.status, exit_code, "run completed");

    Ok(RunOutcome { response, approval: None })
}

async fn run_in_external_terminal(
    state: &AppState,
    request: &RunRequest,
    cwd: &Path,
) -> smartsh_core::Result<(String, i32, u128)> {
    let session_key = request
        .terminal_session_key
        .clone()
        .unwrap_or_else(|| format!("default-{}", smartsh_core::ids::next_nanos()));
    let work_dir = state.config.data_dir.join("terminal-sessions").join(&session_key);
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let started = Instant::now();
    let outcome =
        smartsh_exec::terminal::run(&request.command, Some(cwd), &session_key, &work_dir, rx).await?;
    Ok((outcome.output, outcome.exit_code, started.elapsed().as_millis()))
}

fn tail(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    chars[chars.len() - max_chars..].iter().collect()
}

fn now_ms() -> i64 {
    i64::try_from(smartsh_core::ids::next_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Drive one job's execution and persist+publish every transition:
/// `running` immediately, then the terminal result. Used by both the
/// async `/run` path and approval resolution's background worker.
pub async fn run_job_in_background(state: AppState, mut job: Job) {
    job.result = Some(RunResponse::new(job.id.clone(), RunStatus::Running));
    job.updated_at = now_ms();
    if state.store.save_job(&job).await.is_ok() {
        state.publish(&job).await;
    }

    let outcome = execute(&state, job.request.clone()).await;
    job.result = Some(match outcome {
        Ok(run_outcome) => run_outcome.response,
        Err(e) => {
            let mut response = RunResponse::new(job.id.clone(), RunStatus::Failed);
            response.error = Some(e.to_string());
            response
        },
    });
    job.updated_at = now_ms();

    if let Err(e) = state.store.save_job(&job).await {
        warn!(job_id = %job.id, error = %e, "failed to persist job result");
    }
    if let Some(result) = job.result.as_ref() {
        smartsh_metrics::record_job_settled(result.status);
    }
    state.publish(&job).await;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::dummy_state;

    #[tokio::test]
    async fn plain_command_executes_and_completes() {
        let state = dummy_state(None).await;
        let outcome = execute(&state, RunRequest::new("echo hello")).await.expect("execute");
        assert_eq!(outcome.response.status, RunStatus::Completed);
        assert_eq!(outcome.response.exit_code, Some(0));
        assert!(outcome.approval.is_none());
    }

    #[tokio::test]
    async fn empty_command_is_blocked() {
        let state = dummy_state(None).await;
        let outcome = execute(&state, RunRequest::new("   ")).await.expect("execute");
        assert_eq!(outcome.response.status, RunStatus::Blocked);
        assert_eq!(outcome.response.exit_code, Some(2));
    }

    #[tokio::test]
    async fn block_listed_command_is_blocked_with_exit_2() {
        let state = dummy_state(None).await;
        let outcome = execute(&state, RunRequest::new("rm -rf /")).await.expect("execute");
        assert_eq!(outcome.response.status, RunStatus::Blocked);
        assert_eq!(outcome.response.exit_code, Some(2));
        assert_eq!(outcome.response.error.as_deref(), Some("policy"));
    }

    #[tokio::test]
    async fn risky_command_without_require_approval_is_blocked() {
        let state = dummy_state(None).await;
        let request = RunRequest::new("cat a | grep b");
        let outcome = execute(&state, request).await.expect("execute");
        assert_eq!(outcome.response.status, RunStatus::Blocked);
    }

    #[tokio::test]
    async fn risky_command_with_require_approval_persists_pending_approval() {
        let state = dummy_state(None).await;
        let mut request = RunRequest::new("rm -rf ./build");
        request.require_approval = true;
        let outcome = execute(&state, request).await.expect("execute");
        assert_eq!(outcome.response.status, RunStatus::NeedsApproval);
        assert!(outcome.response.requires_approval);
        assert!(outcome.response.approval_id.is_some());
        let approval = outcome.approval.expect("approval persisted in outcome");
        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert!(!approval.risk_targets.is_empty());
    }

    #[tokio::test]
    async fn unsafe_bypasses_confirmation_and_executes() {
        let state = dummy_state(None).await;
        let mut request = RunRequest::new("cat a.txt | grep b");
        request.r#unsafe = true;
        let outcome = execute(&state, request).await.expect("execute");
        assert!(outcome.response.status == RunStatus::Completed || outcome.response.status == RunStatus::Failed);
    }

    #[tokio::test]
    async fn dry_run_short_circuits_without_executing() {
        let state = dummy_state(None).await;
        let mut request = RunRequest::new("echo hi");
        request.dry_run = true;
        let outcome = execute(&state, request).await.expect("execute");
        assert_eq!(outcome.response.status, RunStatus::Completed);
        assert!(!outcome.response.executed);
        assert_eq!(outcome.response.exit_code, Some(0));
    }

    #[tokio::test]
    async fn failing_command_reports_failed_with_output_tail() {
        let state = dummy_state(None).await;
        let outcome = execute(&state, RunRequest::new("exit 3")).await.expect("execute");
        assert_eq!(outcome.response.status, RunStatus::Failed);
        assert_eq!(outcome.response.exit_code, Some(3));
    }
}

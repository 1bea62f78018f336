//! Approval resolution: the two legal transitions out of `pending`.
//!
//! `pending -> approved` re-executes the original command with
//! `unsafe=true, require_approval=false` on a background worker (or
//! inline, for a job-less synchronous approval). `pending -> rejected`
//! settles the associated job, if any, as blocked. Any other transition
//! attempt is a conflict.

use smartsh_core::{Approval, ApprovalStatus, Result as CoreResult, RunResponse, RunStatus};
use tracing::info;

use crate::run;
use crate::state::AppState;

/// An attempted transition away from a non-pending approval.
pub struct NotPending {
    pub current_status: ApprovalStatus,
}

fn now_ms() -> i64 {
    i64::try_from(smartsh_core::ids::next_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Resolve `approval` as approved or rejected, driving job resumption (or
/// inline execution) as appropriate. Returns the updated `Approval`.
pub async fn resolve(
    state: &AppState,
    mut approval: Approval,
    approved: bool,
) -> CoreResult<Result<Approval, NotPending>> {
    if approval.status != ApprovalStatus::Pending {
        return Ok(Err(NotPending { current_status: approval.status }));
    }

    if !approved {
        approval.status = ApprovalStatus::Rejected;
        approval.updated_at = now_ms();
        state.store.save_approval(&approval).await?;

        if let Some(job_id) = approval.job_id.clone()
            && let Some(mut job) = state.store.get_job(&job_id).await?
        {
            let mut response = RunResponse::new(job_id, RunStatus::Blocked);
            response.blocked_reason = Some("risky command rejected by user".to_string());
            response.error = Some("policy".to_string());
            response.exit_code = Some(1);
            job.result = Some(response);
            job.updated_at = now_ms();
            state.store.save_job(&job).await?;
            smartsh_metrics::record_job_settled(RunStatus::Blocked);
            state.publish(&job).await;
        }

        info!(approval_id = %approval.id, "approval rejected");
        return Ok(Ok(approval));
    }

    approval.status = ApprovalStatus::Approved;
    approval.updated_at = now_ms();
    state.store.save_approval(&approval).await?;

    let mut rerun_request = approval.request.clone();
    rerun_request.r#unsafe = true;
    rerun_request.require_approval = false;

    match approval.job_id.clone() {
        Some(job_id) => {
            if let Some(job) = state.store.get_job(&job_id).await? {
                let mut job = job;
                job.request = rerun_request;
                let background_state = state.clone();
                tokio::spawn(run::run_job_in_background(background_state, job));
            }
        },
        None => {
            let outcome = run::execute(state, rerun_request).await?;
            let _ = outcome;
        },
    }

    mark_executed(state, &mut approval).await?;
    info!(approval_id = %approval.id, "approval granted");
    Ok(Ok(approval))
}

/// Once a job-bearing approval's execution has been dispatched, the
/// approval itself moves straight to `executed` -- the job record, not the
/// approval, tracks the actual outcome from here.
async fn mark_executed(state: &AppState, approval: &mut Approval) -> CoreResult<()> {
    approval.status = ApprovalStatus::Executed;
    approval.updated_at = now_ms();
    state.store.save_approval(approval).await
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use smartsh_core::{Job, RunRequest};

    use super::*;
    use crate::state::test_support::dummy_state;

    fn sample_approval(job_id: Option<String>) -> Approval {
        Approval {
            id: "approval_1".to_string(),
            job_id,
            request: RunRequest::new("rm -rf ./build"),
            resolved_command: "rm -rf ./build".to_string(),
            resolved_risk: "medium".to_string(),
            risk_reason: "pipeline".to_string(),
            risk_targets: vec!["./build".to_string()],
            status: ApprovalStatus::Pending,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn rejecting_a_jobless_approval_just_settles_it() {
        let state = dummy_state(None).await;
        let approval = sample_approval(None);
        let result = resolve(&state, approval, false).await.expect("resolve").expect("pending");
        assert_eq!(result.status, ApprovalStatus::Rejected);
    }

    #[tokio::test]
    async fn rejecting_a_job_bearing_approval_blocks_the_job() {
        let state = dummy_state(None).await;
        let job = Job {
            id: "job_1".to_string(),
            request: RunRequest::new("rm -rf ./build"),
            result: Some(RunResponse::new("job_1", RunStatus::NeedsApproval)),
            created_at: 0,
            updated_at: 0,
        };
        state.store.save_job(&job).await.expect("save job");

        let approval = sample_approval(Some("job_1".to_string()));
        resolve(&state, approval, false).await.expect("resolve").expect("pending");

        let updated = state.store.get_job("job_1").await.expect("get").expect("present");
        assert_eq!(updated.result.expect("result").status, RunStatus::Blocked);
    }

    #[tokio::test]
    async fn approving_a_jobless_approval_executes_inline() {
        let state = dummy_state(None).await;
        let mut approval = sample_approval(None);
        approval.request = RunRequest::new("echo hi");
        let result = resolve(&state, approval, true).await.expect("resolve").expect("pending");
        assert_eq!(result.status, ApprovalStatus::Executed);
    }

    #[tokio::test]
    async fn resolving_a_non_pending_approval_is_a_conflict() {
        let state = dummy_state(None).await;
        let mut approval = sample_approval(None);
        approval.status = ApprovalStatus::Rejected;
        let result = resolve(&state, approval, true).await.expect("resolve");
        assert!(result.is_err());
    }
}

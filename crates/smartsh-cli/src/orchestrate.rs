//! Drives one invocation's worth of `/run` submission, approval gating,
//! and polling to a terminal result. Always submits with `async=true` so a
//! job record exists to resolve against even for a risky command approved
//! mid-flight -- the job-less synchronous-approval path the daemon exposes
//! has no useful result to hand back to an HTTP caller (see `approval.rs`
//! on the daemon side), so the CLI sidesteps it entirely, the same way the
//! tool bridge does.

use std::time::Duration;

use smartsh_bridge::DaemonClient;
use smartsh_core::{Result, RunRequest, RunResponse, RunStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(300);

pub struct CliOutcome {
    pub response: RunResponse,
    pub exit_code: i32,
}

/// `ask` is called once per pending approval to get the user's decision;
/// it receives the in-flight response so callers can render risk targets.
pub async fn run_once<F>(
    client: &DaemonClient,
    mut request: RunRequest,
    auto_yes: bool,
    mut ask: F,
) -> Result<CliOutcome>
where
    F: FnMut(&RunResponse) -> std::io::Result<bool>,
{
    request.r#async = true;
    let submitted = client.run(&request).await?;

    let mut response = poll_until_settled(client, &submitted.job_id).await?;

    while response.status == RunStatus::NeedsApproval {
        let Some(approval_id) = response.approval_id.clone() else {
            break;
        };
        let approved = if auto_yes {
            true
        } else {
            ask(&response).map_err(smartsh_core::Error::from)?
        };
        client.resolve_approval(&approval_id, approved).await?;
        response = poll_until_settled(client, &submitted.job_id).await?;
    }

    let exit_code = exit_code_for(&response);
    Ok(CliOutcome { response, exit_code })
}

async fn poll_until_settled(client: &DaemonClient, job_id: &str) -> Result<RunResponse> {
    loop {
        let job = client.get_job(job_id).await?;
        if let Some(result) = job.result
            && !matches!(result.status, RunStatus::Queued | RunStatus::Running)
        {
            return Ok(result);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn exit_code_for(response: &RunResponse) -> i32 {
    match response.status {
        RunStatus::Completed if response.exit_code.unwrap_or(0) == 0 => 0,
        RunStatus::Blocked => 2,
        RunStatus::Completed | RunStatus::Failed | RunStatus::NeedsApproval | RunStatus::Queued
        | RunStatus::Running => 1,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_completion_exits_zero() {
        let response = RunResponse { exit_code: Some(0), ..RunResponse::new("job_1", RunStatus::Completed) };
        assert_eq!(exit_code_for(&response), 0);
    }

    #[test]
    fn nonzero_exit_completion_exits_one() {
        let response = RunResponse { exit_code: Some(3), ..RunResponse::new("job_1", RunStatus::Completed) };
        assert_eq!(exit_code_for(&response), 1);
    }

    #[test]
    fn blocked_status_exits_two() {
        let response = RunResponse::new("job_1", RunStatus::Blocked);
        assert_eq!(exit_code_for(&response), 2);
    }

    #[test]
    fn failed_status_exits_one() {
        let response = RunResponse::new("job_1", RunStatus::Failed);
        assert_eq!(exit_code_for(&response), 1);
    }
}

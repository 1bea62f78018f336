//! The two tools this bridge exposes over `tools/list`/`tools/call`:
//! `smartsh_run` and `smartsh_approve`.
//!
//! Tool-definition shape (`name`/`description`/`inputSchema`) mirrors
//! `moltis-mcp::types::McpToolDef`, reversed from a type the teacher
//! *consumes* (tools advertised by a server it talks to) to one this
//! crate *produces* (tools it advertises about itself).

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use smartsh_core::{Error, Result, RunRequest, RunStatus};
use tokio::sync::Mutex;

use crate::client::DaemonClient;

const POLL_INTERVAL: Duration = Duration::from_millis(400);
const DEFAULT_MAX_WAIT_SEC: u64 = 25;

/// Per-connection bridge state: the daemon client and the last approval id
/// this connection has observed, so a bare `y`/`n` follow-up can resolve
/// without repeating the id.
pub struct BridgeState {
    client: DaemonClient,
    last_approval_id: Mutex<Option<String>>,
}

impl BridgeState {
    #[must_use]
    pub fn new(client: DaemonClient) -> Arc<Self> {
        Arc::new(Self { client, last_approval_id: Mutex::new(None) })
    }
}

#[must_use]
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "smartsh_run",
            "description": "Run a shell command through the smartsh safety pipeline and return its result.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "cwd": {"type": "string"},
                    "unsafe": {"type": "boolean"},
                    "require_approval": {"type": "boolean"},
                    "dry_run": {"type": "boolean"},
                    "timeout_sec": {"type": "integer"},
                    "approval_response": {
                        "type": "string",
                        "description": "Shortcut: y/yes/n/no, resolving the last approval this connection observed.",
                    },
                    "mcp_max_wait_sec": {"type": "integer"},
                },
                "required": ["command"],
            },
        }),
        json!({
            "name": "smartsh_approve",
            "description": "Approve or reject a pending risky-command approval.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "approval_id": {"type": "string"},
                    "approved": {"type": "boolean"},
                    "decision": {"type": "string", "description": "y/yes/approve/approved or n/no/reject/rejected"},
                },
                "required": ["approval_id"],
            },
        }),
    ]
}

/// Dispatches a `tools/call` by name. Returns the MCP `tools/call` result
/// content (a single text block with the JSON result serialized inline, per
/// spec's job-less/job-bearing response shapes).
pub async fn call(state: &Arc<BridgeState>, name: &str, arguments: Value) -> Result<Value> {
    match name {
        "smartsh_run" => smartsh_run(state, arguments).await,
        "smartsh_approve" => smartsh_approve(state, arguments).await,
        other => Err(Error::message(format!("unknown tool: {other}"))),
    }
}

async fn smartsh_run(state: &Arc<BridgeState>, arguments: Value) -> Result<Value> {
    let approval_response = arguments.get("approval_response").and_then(Value::as_str).map(str::to_string);
    let max_wait_sec =
        arguments.get("mcp_max_wait_sec").and_then(Value::as_u64).unwrap_or(DEFAULT_MAX_WAIT_SEC);

    if let Some(decision) = approval_response {
        let approved = parse_decision(&decision)?;
        let last_id = state.last_approval_id.lock().await.clone();
        let Some(approval_id) = last_id else {
            return Err(Error::message("no prior approval observed on this connection"));
        };
        return resolve_approval(state, &approval_id, approved).await;
    }

    let mut request: RunRequest = serde_json::from_value(arguments).map_err(Error::from)?;
    request.r#async = true;

    let response = state.client.run(&request).await?;
    if response.status == RunStatus::NeedsApproval
        && let Some(id) = &response.approval_id
    {
        *state.last_approval_id.lock().await = Some(id.clone());
    }

    if matches!(response.status, RunStatus::Queued | RunStatus::Running) {
        let job_id = response.job_id.clone();
        return poll_job(state, &job_id, Duration::from_secs(max_wait_sec)).await;
    }

    Ok(decorate(serde_json::to_value(response).map_err(Error::from)?))
}

async fn poll_job(state: &Arc<BridgeState>, job_id: &str, max_wait: Duration) -> Result<Value> {
    let deadline = tokio::time::Instant::now() + max_wait;
    loop {
        let job = state.client.get_job(job_id).await?;
        if let Some(result) = &job.result
            && !matches!(result.status, RunStatus::Queued | RunStatus::Running)
        {
            if result.status == RunStatus::NeedsApproval
                && let Some(id) = &result.approval_id
            {
                *state.last_approval_id.lock().await = Some(id.clone());
            }
            return Ok(decorate(serde_json::to_value(result).map_err(Error::from)?));
        }

        if tokio::time::Instant::now() >= deadline {
            let mut value = serde_json::to_value(&job.result).map_err(Error::from)?;
            if let Value::Object(map) = &mut value {
                map.insert(
                    "summary".to_string(),
                    json!("job still running; use job_id to poll status"),
                );
                map.insert("job_id".to_string(), json!(job_id));
            }
            return Ok(value);
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn smartsh_approve(state: &Arc<BridgeState>, arguments: Value) -> Result<Value> {
    let approval_id = arguments
        .get("approval_id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::message("smartsh_approve requires approval_id"))?
        .to_string();

    let approved = if let Some(approved) = arguments.get("approved").and_then(Value::as_bool) {
        approved
    } else if let Some(decision) = arguments.get("decision").and_then(Value::as_str) {
        parse_decision(decision)?
    } else {
        return Err(Error::message("smartsh_approve requires approved or decision"));
    };

    resolve_approval(state, &approval_id, approved).await
}

async fn resolve_approval(state: &Arc<BridgeState>, approval_id: &str, approved: bool) -> Result<Value> {
    let approval = state.client.resolve_approval(approval_id, approved).await?;
    Ok(serde_json::to_value(approval).map_err(Error::from)?)
}

fn parse_decision(decision: &str) -> Result<bool> {
    match decision.to_ascii_lowercase().as_str() {
        "y" | "yes" | "approve" | "approved" => Ok(true),
        "n" | "no" | "reject" | "rejected" => Ok(false),
        other => Err(Error::message(format!("unrecognized approval decision: {other}"))),
    }
}

/// When a `/run` response carries `needs_approval`, replace `approval_howto`
/// with the literal `tools/call` invocation form and enrich `summary` with
/// a yes/no prompt naming the risk targets, per spec's "Approval
/// decoration" paragraph.
fn decorate(mut response: Value) -> Value {
    let Value::Object(map) = &mut response else { return response };
    let Some(status) = map.get("status").and_then(Value::as_str) else { return response };
    if status != "needs_approval" {
        return response;
    }
    let Some(approval_id) = map.get("approval_id").and_then(Value::as_str).map(str::to_string) else {
        return response;
    };

    let targets = map
        .get("risk_targets")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", "))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "the current directory".to_string());

    let approve_call = json!({
        "jsonrpc": "2.0", "id": 1, "method": "tools/call",
        "params": {"name": "smartsh_approve", "arguments": {"approval_id": approval_id, "approved": true}},
    });
    let reject_call = json!({
        "jsonrpc": "2.0", "id": 1, "method": "tools/call",
        "params": {"name": "smartsh_approve", "arguments": {"approval_id": approval_id, "approved": false}},
    });

    map.insert(
        "approval_howto".to_string(),
        json!(format!(
            "to approve: {approve_call}\nto reject: {reject_call}"
        )),
    );

    let existing_summary = map.get("summary").and_then(Value::as_str).unwrap_or_default();
    map.insert(
        "summary".to_string(),
        json!(format!(
            "{existing_summary}You are about to modify: {targets}. Approve? (y/n) "
        )),
    );

    response
}

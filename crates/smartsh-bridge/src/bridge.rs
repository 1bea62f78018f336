//! The stdio JSON-RPC server loop: read a frame, dispatch by method, write
//! a response frame. Output is always newline-delimited JSON regardless of
//! which framing the input used -- the protocol only requires auto-detecting
//! *input* framing (spec.md §4.7); replying in kind adds complexity with no
//! client-visible benefit over a single consistent output format.
//!
//! The single-write-mutex requirement (spec.md §5: "single-threaded with a
//! write mutex serializing outbound frames") is satisfied trivially here
//! since one task owns the stdout handle for the process's lifetime; the
//! mutex exists for the day a second writer (e.g. a server-initiated
//! notification) is added.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::framing::FrameReader;
use crate::rpc::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};
use crate::tools::{self, BridgeState};

pub struct Bridge {
    state: Arc<BridgeState>,
    stdout: AsyncMutex<Stdout>,
}

impl Bridge {
    #[must_use]
    pub fn new(state: Arc<BridgeState>) -> Self {
        Self { state, stdout: AsyncMutex::new(tokio::io::stdout()) }
    }

    /// Runs the read-dispatch-write loop until stdin closes or an `exit`
    /// notification is received.
    pub async fn serve<R>(&self, input: R) -> std::io::Result<()>
    where
        R: tokio::io::AsyncBufRead + Unpin,
    {
        let mut reader = FrameReader::new(input);
        loop {
            let Some(frame) = reader.next_frame().await? else {
                debug!("stdin closed, shutting down bridge");
                return Ok(());
            };

            let request: JsonRpcRequest = match serde_json::from_str(&frame) {
                Ok(req) => req,
                Err(e) => {
                    warn!(error = %e, "received malformed JSON-RPC frame");
                    self.write_response(&JsonRpcResponse::failure(
                        Value::Null,
                        PARSE_ERROR,
                        format!("parse error: {e}"),
                    ))
                    .await?;
                    continue;
                },
            };

            if request.method == "exit" {
                info!("received exit notification, shutting down bridge");
                return Ok(());
            }

            let is_notification = request.is_notification();
            let id = request.id.clone().unwrap_or(Value::Null);
            let response = self.dispatch(request).await;

            if is_notification {
                continue;
            }

            let framed = match response {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err((code, message)) => JsonRpcResponse::failure(id, code, message),
            };
            self.write_response(&framed).await?;
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Result<Value, (i64, String)> {
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": "smartsh-bridge", "version": env!("CARGO_PKG_VERSION")},
            })),
            "ping" => Ok(json!({})),
            "notifications/initialized" => Ok(Value::Null),
            "tools/list" => Ok(json!({"tools": tools::tool_definitions()})),
            "tools/call" => self.handle_tools_call(request.params).await,
            other => Err((METHOD_NOT_FOUND, format!("unknown method: {other}"))),
        }
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, (i64, String)> {
        let params = params.ok_or((INVALID_PARAMS, "tools/call requires params".to_string()))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or((INVALID_PARAMS, "tools/call requires a name".to_string()))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match tools::call(&self.state, &name, arguments).await {
            Ok(result) => Ok(json!({
                "content": [{"type": "text", "text": result.to_string()}],
                "isError": false,
            })),
            Err(e) => Ok(json!({
                "content": [{"type": "text", "text": e.to_string()}],
                "isError": true,
            })),
        }
    }

    async fn write_response(&self, response: &JsonRpcResponse) -> std::io::Result<()> {
        let mut payload = serde_json::to_string(response)?;
        payload.push('\n');
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DaemonClient;

    fn bridge() -> Bridge {
        let client = DaemonClient::new("http://127.0.0.1:1", None);
        Bridge::new(BridgeState::new(client))
    }

    #[tokio::test]
    async fn ping_is_handled_without_touching_the_daemon() {
        let bridge = bridge();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "ping".to_string(),
            params: None,
        };
        let result = bridge.dispatch(req).await.expect("ping result");
        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn initialize_reports_protocol_version() {
        let bridge = bridge();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "initialize".to_string(),
            params: None,
        };
        let result = bridge.dispatch(req).await.expect("initialize result");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn tools_list_reports_both_tools() {
        let bridge = bridge();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/list".to_string(),
            params: None,
        };
        let result = bridge.dispatch(req).await.expect("tools/list result");
        let tools = result["tools"].as_array().expect("tools array");
        assert_eq!(tools.len(), 2);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let bridge = bridge();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "bogus/method".to_string(),
            params: None,
        };
        let err = bridge.dispatch(req).await.expect_err("should fail");
        assert_eq!(err.0, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn tools_call_against_unreachable_daemon_reports_is_error() {
        let bridge = bridge();
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "smartsh_run", "arguments": {"command": "echo hi"}})),
        };
        let result = bridge.dispatch(req).await.expect("tools/call result");
        assert_eq!(result["isError"], json!(true));
    }

    #[tokio::test]
    async fn serve_processes_a_single_frame_then_exits() {
        let bridge = bridge();
        let input = tokio::io::BufReader::new(std::io::Cursor::new(
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n".to_vec(),
        ));
        bridge.serve(input).await.expect("serve");
    }
}

//! Route wiring for the daemon's HTTP surface.
//!
//! Handler bodies stay thin: cross-cutting concerns (auth, tracing) live in
//! middleware layers, and the substantial logic (safety pipeline, approval
//! resolution) lives in `run`/`approval`. SSE streams are built directly on
//! `axum::response::sse`, which has no precedent in the teacher's
//! WebSocket-based broadcast but is the natural fit for the text/event-stream
//! contract this spec requires.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use smartsh_core::{job_id, ApprovalStatus, Job, RunRequest, RunResponse, RunStatus};
use smartsh_exec::pty::PtySpawnOpts;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::require_auth;
use crate::sessions::SessionRegistry;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run_handler))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/stream", get(stream_job))
        .route("/approvals/{id}", get(get_approval).post(post_approval))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/input", post(session_input))
        .route("/sessions/{id}/stream", get(stream_session))
        .route("/sessions/{id}/close", post(close_session))
        .route("/metrics", get(metrics))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"ok": true, "service": "smartsh-daemon"}))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

async fn run_handler(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> impl IntoResponse {
    if request.r#async {
        let id = job_id(smartsh_core::ids::next_nanos());
        let now = now_ms();
        let job = Job {
            id: id.clone(),
            request,
            result: Some(RunResponse::new(id.clone(), RunStatus::Queued)),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = state.store.save_job(&job).await {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }

        tokio::spawn(crate::run::run_job_in_background(state, job));

        return (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"job_id": id, "status": "queued"})),
        )
            .into_response();
    }

    match crate::run::execute(&state, request).await {
        Ok(outcome) => {
            if let Some(approval) = &outcome.approval
                && let Err(e) = state.store.save_approval(approval).await
            {
                tracing::warn!(error = %e, "failed to persist approval");
            }
            Json(outcome.response).into_response()
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct ListJobsQuery {
    limit: Option<i64>,
}

async fn list_jobs(State(state): State<AppState>, Query(q): Query<ListJobsQuery>) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    match state.store.list_jobs(limit).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn get_job(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    match state.store.get_job(&id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

fn job_event(job: &Job) -> Event {
    Event::default()
        .event("status")
        .json_data(job)
        .unwrap_or_else(|_| Event::default())
}

/// `rx` is subscribed to before the initial fetch so no publication is
/// missed between the two. `AppState::publish` drops every sender for a
/// job once it reaches a terminal status, so the receiver stream ends on
/// its own right after the terminal event arrives -- no separate
/// terminal-status check is needed here.
async fn stream_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe(&id).await;
    let initial = state.store.get_job(&id).await.ok().flatten();

    let initial_stream = futures::stream::iter(initial.as_ref().map(job_event)).map(Ok);
    let updates = ReceiverStream::new(rx).map(|job| Ok(job_event(&job)));

    Sse::new(initial_stream.chain(updates)).keep_alive(KeepAlive::new().interval(Duration::from_secs(12)))
}

async fn get_approval(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    match state.store.get_approval(&id).await {
        Ok(Some(approval)) => Json(approval).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct ApprovalDecision {
    approved: bool,
}

async fn post_approval(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(decision): Json<ApprovalDecision>,
) -> impl IntoResponse {
    let Ok(Some(approval)) = state.store.get_approval(&id).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match crate::approval::resolve(&state, approval, decision.approved).await {
        Ok(Ok(approval)) => Json(approval).into_response(),
        Ok(Err(not_pending)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "approval is not pending",
                "status": status_str(not_pending.current_status),
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

fn status_str(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
        ApprovalStatus::Executed => "executed",
        ApprovalStatus::ApprovedFailed => "approved_failed",
    }
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    command: String,
    cwd: Option<String>,
    #[serde(default)]
    env: std::collections::BTreeMap<String, String>,
    #[serde(default = "default_cols")]
    cols: u16,
    #[serde(default = "default_rows")]
    rows: u16,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    if cfg!(windows) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "interactive sessions are unsupported on this platform"})),
        )
            .into_response();
    }

    let opts = PtySpawnOpts {
        command: req.command,
        cwd: req.cwd.map(std::path::PathBuf::from),
        env: req.env,
        cols: req.cols,
        rows: req.rows,
    };

    match SessionRegistry::create(&state.sessions, opts).await {
        Ok(id) => Json(serde_json::json!({"id": id})).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn get_session(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    let registry = state.sessions.read().await;
    match registry.get(&id) {
        Some(view) => Json(view.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
struct SessionInput {
    data: String,
}

async fn session_input(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(input): Json<SessionInput>,
) -> impl IntoResponse {
    let mut registry = state.sessions.write().await;
    match registry.write_input(&id, input.data.as_bytes()) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn stream_session(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> impl IntoResponse {
    let rx = {
        let mut registry = state.sessions.write().await;
        registry.subscribe(&id)
    };

    let Some(rx) = rx else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let stream = ReceiverStream::new(rx).map(|chunk| {
        Ok::<_, Infallible>(Event::default().event("output").data(String::from_utf8_lossy(&chunk).into_owned()))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(10)))
        .into_response()
}

async fn close_session(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    let mut registry = state.sessions.write().await;
    match registry.close(&id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

fn now_ms() -> i64 {
    i64::try_from(smartsh_core::ids::next_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::state::test_support::dummy_state;

    #[tokio::test]
    async fn health_reports_ok() {
        let state = dummy_state(None).await;
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_executes_synchronously_by_default() {
        let state = dummy_state(None).await;
        let app = router(state);
        let body = serde_json::to_vec(&RunRequest::new("echo hi")).expect("serialize");
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/run")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn async_run_returns_202_with_job_id() {
        let state = dummy_state(None).await;
        let app = router(state);
        let mut request = RunRequest::new("echo hi");
        request.r#async = true;
        let body = serde_json::to_vec(&request).expect("serialize");
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/run")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let state = dummy_state(None).await;
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/jobs/nope").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

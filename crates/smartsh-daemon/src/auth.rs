//! Bearer-token auth middleware.
//!
//! Grounded on `moltis-gateway::auth_middleware::require_auth`'s
//! `Authorization: Bearer` branch specifically -- the session-cookie and
//! passkey branches are chat-gateway-specific and have no counterpart here.
//! Disabled only when the daemon is configured with no token at all.

use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let Some(expected) = state.config.auth_token.as_deref() else {
        return next.run(request).await;
    };

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if let Some(token) = header_value.and_then(|v| v.strip_prefix("Bearer "))
        && token == expected
    {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "not authenticated"})),
    )
        .into_response()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::state::test_support::dummy_state;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/protected", get(ok_handler))
            .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    #[tokio::test]
    async fn rejects_missing_token_when_auth_is_configured() {
        let state = dummy_state(Some("secret".to_string())).await;
        let response = app(state)
            .oneshot(Request::builder().uri("/protected").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn accepts_matching_bearer_token() {
        let state = dummy_state(Some("secret".to_string())).await;
        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn passes_through_when_auth_disabled() {
        let state = dummy_state(None).await;
        let response = app(state)
            .oneshot(Request::builder().uri("/protected").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

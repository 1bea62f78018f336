//! HTTP client for the daemon's `/run`, `/jobs/{id}`, and `/approvals/{id}`
//! endpoints.
//!
//! `reqwest::Client` reuse and per-request timeout idiom grounded on
//! `smartsh_summarize::llm`'s Ollama client.

use std::time::Duration;

use smartsh_core::{Approval, Error, Job, Result, RunRequest, RunResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Health {
    pub ok: bool,
}

#[derive(Clone)]
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl DaemonClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), token }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let mut builder = self.http.request(method, url).timeout(REQUEST_TIMEOUT);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Probes `/health`, returning `true` only on a reachable, OK response.
    pub async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url.trim_end_matches('/'));
        let mut builder = self.http.get(url).timeout(HEALTH_TIMEOUT);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        match builder.send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<Health>().await.map(|h| h.ok).unwrap_or(false)
            },
            _ => false,
        }
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunResponse> {
        let resp = self
            .request(reqwest::Method::POST, "/run")
            .json(request)
            .send()
            .await
            .map_err(Error::other)?;
        decode(resp).await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/jobs/{job_id}"))
            .send()
            .await
            .map_err(Error::other)?;
        decode(resp).await
    }

    pub async fn resolve_approval(&self, approval_id: &str, approved: bool) -> Result<Approval> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/approvals/{approval_id}"))
            .json(&serde_json::json!({"approved": approved}))
            .send()
            .await
            .map_err(Error::other)?;
        decode(resp).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::other)?;
    if !status.is_success() {
        return Err(Error::message(format!("daemon returned {status}: {body}")));
    }
    serde_json::from_str(&body).map_err(Error::from)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_against_unreachable_daemon_is_false() {
        let client = DaemonClient::new("http://127.0.0.1:1", None);
        assert!(!client.is_healthy().await);
    }

    #[tokio::test]
    async fn run_against_unreachable_daemon_is_an_error() {
        let client = DaemonClient::new("http://127.0.0.1:1", None);
        let result = client.run(&RunRequest::new("echo hi")).await;
        assert!(result.is_err());
    }
}

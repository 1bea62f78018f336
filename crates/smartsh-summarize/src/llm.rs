//! Optional LLM pass: sends the deterministic pass's inputs to an
//! Ollama-compatible chat endpoint and asks for a strict JSON summary.
//!
//! HTTP client idiom grounded on the pack's provider crate: a short
//! per-request timeout, `reqwest::Client` reused across calls, and JSON
//! (de)serialization via `serde_json` rather than hand-rolled parsing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smartsh_core::Summary;

use crate::deterministic;
use crate::redact::redact;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const OUTPUT_TAIL_CHARS: usize = 4000;

/// How the summarizer should obtain its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Deterministic,
    Ollama,
    Hybrid,
}

pub struct OllamaConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/api/generate".to_string(),
            model: "llama3".to_string(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

fn tail(s: &str, max_chars: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_chars {
        s.to_string()
    } else {
        chars[chars.len() - max_chars..].iter().collect()
    }
}

fn build_prompt(command: &str, exit_code: i32, output: &str) -> String {
    let redacted_output = redact(&tail(output, OUTPUT_TAIL_CHARS));
    let redacted_command = redact(command);
    format!(
        "You are classifying the result of a shell command. Respond with a single \
         JSON object with fields: summary, error_type (one of none/test/compile/\
         dependency/runtime), primary_error, next_action, failing_tests (array), \
         failed_files (array), top_issues (array).\n\n\
         command: {redacted_command}\nexit_code: {exit_code}\noutput_tail:\n{redacted_output}"
    )
}

/// A deterministic result is "weak": non-zero exit with neither a primary
/// error nor a useful `error_type`. Per spec this is when `hybrid` escalates.
fn is_weak(summary: &Summary) -> bool {
    summary.error_type != "none"
        && (summary.primary_error.is_none()
            || summary.error_type.is_empty()
            || summary.error_type == "runtime")
}

async fn query_ollama(client: &reqwest::Client, config: &OllamaConfig, prompt: String) -> Option<Summary> {
    let request = OllamaRequest {
        model: &config.model,
        prompt,
        stream: false,
        format: "json",
    };

    let response = match client
        .post(&config.endpoint)
        .json(&request)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!("ollama request failed: {e}");
            return None;
        },
    };

    let body: OllamaResponse = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("ollama response was not valid json: {e}");
            return None;
        },
    };

    match serde_json::from_str::<Summary>(&body.response) {
        Ok(mut summary) => {
            summary.summary_source = Some("ollama".to_string());
            Some(summary)
        },
        Err(e) => {
            tracing::warn!("ollama reply did not match the summary schema: {e}");
            None
        },
    }
}

/// Produce the final summary for a completed run, honoring `provider`.
///
/// `required` controls what happens when `ollama` is requested but
/// unreachable: when `true` the deterministic result is annotated with an
/// explicit "model unavailable" advisory instead of silently downgrading.
pub async fn summarize(
    client: &reqwest::Client,
    config: &OllamaConfig,
    provider: Provider,
    required: bool,
    command: &str,
    exit_code: i32,
    output: &str,
) -> Summary {
    let baseline = deterministic::classify(command, exit_code, output);

    let should_call_model = match provider {
        Provider::Deterministic => false,
        Provider::Ollama => true,
        Provider::Hybrid => is_weak(&baseline),
    };

    if !should_call_model {
        return baseline;
    }

    let prompt = build_prompt(command, exit_code, output);
    match query_ollama(client, config, prompt).await {
        Some(summary) => summary,
        None if required => {
            let mut fallback = baseline;
            fallback.next_action = Some(
                "model unavailable: falling back to deterministic classification".to_string(),
            );
            fallback
        },
        None => baseline,
    }
}

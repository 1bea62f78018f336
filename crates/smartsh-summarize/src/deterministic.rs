//! The deterministic classification pass: always runs, never calls out to a
//! model, and is the fallback result whenever the optional LLM pass is
//! unavailable or disabled.

use std::sync::LazyLock;

use regex::Regex;
use smartsh_core::Summary;

use crate::extractors;

const MAX_TOP_ISSUES: usize = 5;
const SEED_ISSUES: usize = 3;

static ERROR_ISH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error|exception|panic|failed|TS\d+|ERR!|Cannot find module|BUILD FAILED")
        .expect("valid regex")
});

static COMPILE_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)compil|syntax error|cannot find symbol|undefined reference").expect("valid regex"));
static TEST_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btest(s|ing)?\b|assert|expect\(").expect("valid regex"));
static DEPENDENCY_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cannot find module|no matching package|dependency|unresolved import|package not found")
        .expect("valid regex")
});

/// Classify a completed run's output without any model involvement.
#[must_use]
pub fn classify(command: &str, exit_code: i32, output: &str) -> Summary {
    if exit_code == 0 {
        return Summary::success();
    }

    let mut summary = Summary {
        summary_source: Some("deterministic".to_string()),
        ..Summary::default()
    };

    let matched_lines: Vec<&str> = output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter(|l| ERROR_ISH.is_match(l))
        .take(MAX_TOP_ISSUES)
        .collect();

    if let Some(first) = matched_lines.first() {
        summary.summary = first.trim().to_string();
        summary.primary_error = Some(first.trim().to_string());
    } else {
        summary.summary = "command exited with a non-zero status".to_string();
    }
    summary.top_issues = matched_lines
        .iter()
        .take(SEED_ISSUES)
        .map(|l| l.trim().to_string())
        .collect();

    if extractors::apply(output, &mut summary) {
        return summary;
    }

    summary.error_type = fallback_classification(command, output).to_string();
    summary
}

/// Token-heuristic fallback used when no framework extractor matched.
fn fallback_classification(command: &str, output: &str) -> &'static str {
    let combined = format!("{command}\n{output}");
    if DEPENDENCY_TOKENS.is_match(&combined) {
        "dependency"
    } else if COMPILE_TOKENS.is_match(&combined) {
        "compile"
    } else if TEST_TOKENS.is_match(&combined) {
        "test"
    } else {
        "runtime"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_short_circuits_to_success() {
        let summary = classify("npm test", 0, "all good");
        assert_eq!(summary.error_type, "none");
        assert_eq!(summary.summary, "command completed successfully");
    }

    #[test]
    fn nonzero_exit_seeds_summary_from_error_ish_lines() {
        let summary = classify("npm test", 1, "running suite\nError: something broke\nmore context");
        assert_eq!(summary.primary_error.as_deref(), Some("Error: something broke"));
        assert!(!summary.top_issues.is_empty());
    }

    #[test]
    fn fallback_classification_detects_dependency_issues() {
        let summary = classify("npm install", 1, "Cannot find module 'left-pad'");
        assert_eq!(summary.error_type, "dependency");
    }

    #[test]
    fn fallback_classification_defaults_to_runtime() {
        let summary = classify("./app", 1, "segmentation fault (core dumped)");
        assert_eq!(summary.error_type, "runtime");
    }

    #[test]
    fn framework_extractor_takes_priority_over_fallback_heuristic() {
        let summary = classify("cargo test", 1, "running 2 tests\nnot ok 1 - addition\n");
        assert_eq!(summary.error_type, "test");
        assert!(!summary.failing_tests.is_empty());
    }
}

//! Framework-specific extractors tried, in order, against a failed run's
//! output. The first one that matches wins and sets `error_type`.

use std::sync::LazyLock;

use regex::Regex;
use smartsh_core::Summary;

const MAX_FAILING_TESTS: usize = 12;
const MAX_FAILED_FILES: usize = 6;

static POSIX_TEST_FAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:not ok|FAIL:?)\s+(.+)$").expect("valid regex"));

static JS_FAIL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:●|✕|×)\s*(.+)$|(?m)^\s*FAIL\s+(\S+)").expect("valid regex"));

static TYPED_COMPILE_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(.+?)\((\d+),(\d+)\):\s*error\s+(\S+):\s*(.+)$").expect("valid regex")
});

static JVM_BUILD_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:\[ERROR\]|BUILD FAILED|> Task.*FAILED)\s*(.*)$").expect("valid regex")
});

fn dedup_capped(items: impl Iterator<Item = String>, cap: usize) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for item in items {
        if item.is_empty() || !seen.insert(item.clone()) {
            continue;
        }
        out.push(item);
        if out.len() >= cap {
            break;
        }
    }
    out
}

/// Try each extractor in spec order; the first match populates `summary`.
pub fn apply(output: &str, summary: &mut Summary) -> bool {
    if let Some(caps) = POSIX_TEST_FAIL.captures_iter(output).next() {
        let _ = caps;
        let failing = dedup_capped(
            POSIX_TEST_FAIL
                .captures_iter(output)
                .map(|c| c[1].trim().to_string()),
            MAX_FAILING_TESTS,
        );
        summary.error_type = "test".to_string();
        summary.failing_tests = failing;
        summary.next_action = Some("inspect the failing test cases listed above".to_string());
        return true;
    }

    if JS_FAIL_LINE.is_match(output) {
        let failing = dedup_capped(
            JS_FAIL_LINE.captures_iter(output).map(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default()
            }),
            MAX_FAILING_TESTS,
        );
        summary.error_type = "test".to_string();
        summary.failing_tests = failing;
        summary.next_action = Some("re-run the failing test suite in isolation".to_string());
        return true;
    }

    if TYPED_COMPILE_ERROR.is_match(output) {
        let files = dedup_capped(
            TYPED_COMPILE_ERROR
                .captures_iter(output)
                .map(|c| c[1].trim().to_string()),
            MAX_FAILED_FILES,
        );
        summary.error_type = "compile".to_string();
        summary.failed_files = files;
        summary.next_action = Some("fix the type errors in the listed files".to_string());
        return true;
    }

    if JVM_BUILD_MARKER.is_match(output) {
        summary.error_type = "compile".to_string();
        summary.next_action = Some("inspect the build tool output for the failing task".to_string());
        return true;
    }

    false
}

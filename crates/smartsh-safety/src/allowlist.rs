//! Stage 5 of the safety pipeline: the operator-supplied allowlist.
//!
//! Entries are line-oriented, one per line, `#`-comments and blank lines
//! ignored, with three kinds distinguished by prefix: `exact:`, `prefix:`,
//! and `re:`; a bare line (no recognized prefix) defaults to `exact:`.

use regex::Regex;
use smartsh_core::{AllowlistMode, Error, Result};

/// A single parsed allowlist rule.
pub enum Entry {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

impl Entry {
    fn parse_line(line: &str) -> Result<Option<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        if let Some(rest) = trimmed.strip_prefix("exact:") {
            return Ok(Some(Self::Exact(rest.to_string())));
        }
        if let Some(rest) = trimmed.strip_prefix("prefix:") {
            return Ok(Some(Self::Prefix(rest.to_string())));
        }
        if let Some(rest) = trimmed.strip_prefix("re:") {
            let re = Regex::new(rest)
                .map_err(|e| Error::message(format!("invalid allowlist regex {rest:?}: {e}")))?;
            return Ok(Some(Self::Regex(re)));
        }
        Ok(Some(Self::Exact(trimmed.to_string())))
    }

    fn matches(&self, command: &str) -> bool {
        match self {
            Self::Exact(s) => command == s,
            Self::Prefix(p) => command.starts_with(p.as_str()),
            Self::Regex(re) => re.is_match(command),
        }
    }
}

/// Parse an allowlist file's contents into entries, one per non-blank,
/// non-comment line.
pub fn parse(contents: &str) -> Result<Vec<Entry>> {
    contents
        .lines()
        .filter_map(|line| Entry::parse_line(line).transpose())
        .collect()
}

#[must_use]
pub fn matches_any(command: &str, entries: &[Entry]) -> bool {
    entries.iter().any(|e| e.matches(command))
}

/// Outcome of the allowlist stage.
pub enum Outcome {
    /// Mode is `off`, or the command matched.
    Proceed,
    /// Mode is `warn` and the command did not match.
    Warn(String),
    /// Mode is `enforce` and the command did not match.
    Blocked(String),
}

#[must_use]
pub fn evaluate(mode: AllowlistMode, command: &str, entries: &[Entry]) -> Outcome {
    match mode {
        AllowlistMode::Off => Outcome::Proceed,
        AllowlistMode::Warn => {
            if matches_any(command, entries) {
                Outcome::Proceed
            } else {
                Outcome::Warn(format!(
                    "command does not match the allowlist: {command}"
                ))
            }
        },
        AllowlistMode::Enforce => {
            if matches_any(command, entries) {
                Outcome::Proceed
            } else {
                Outcome::Blocked(format!(
                    "command rejected by enforced allowlist: {command}"
                ))
            }
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_entry_kinds_and_skips_comments() {
        let entries = parse(
            "# comment\n\nexact:git status\nprefix:cargo \nre:^npm (run|test)\nls -la\n",
        )
        .expect("parse");
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn exact_matches_only_full_string() {
        let entries = parse("exact:git status").expect("parse");
        assert!(matches_any("git status", &entries));
        assert!(!matches_any("git status --short", &entries));
    }

    #[test]
    fn prefix_matches_start_of_command() {
        let entries = parse("prefix:cargo ").expect("parse");
        assert!(matches_any("cargo build --release", &entries));
        assert!(!matches_any("cargo-clippy", &entries));
    }

    #[test]
    fn regex_entry_matches_pattern() {
        let entries = parse("re:^npm (run|test)\\b").expect("parse");
        assert!(matches_any("npm run build", &entries));
        assert!(matches_any("npm test", &entries));
        assert!(!matches_any("npm install", &entries));
    }

    #[test]
    fn bare_line_defaults_to_exact() {
        let entries = parse("git status").expect("parse");
        assert!(matches_any("git status", &entries));
        assert!(!matches_any("git status --short", &entries));
    }

    #[test]
    fn off_mode_always_proceeds() {
        let entries = parse("exact:git status").expect("parse");
        assert!(matches!(
            evaluate(AllowlistMode::Off, "rm -rf /tmp", &entries),
            Outcome::Proceed
        ));
    }

    #[test]
    fn warn_mode_warns_on_miss_but_proceeds() {
        let entries = parse("exact:git status").expect("parse");
        assert!(matches!(
            evaluate(AllowlistMode::Warn, "rm -rf /tmp", &entries),
            Outcome::Warn(_)
        ));
    }

    #[test]
    fn enforce_mode_blocks_on_miss() {
        let entries = parse("exact:git status").expect("parse");
        assert!(matches!(
            evaluate(AllowlistMode::Enforce, "rm -rf /tmp", &entries),
            Outcome::Blocked(_)
        ));
    }
}

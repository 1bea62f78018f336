//! Stage 3 of the safety pipeline: suspicious patterns that elevate risk to
//! medium without outright blocking the command.

use std::sync::LazyLock;

use regex::RegexSet;

static SUSPICIOUS_PATTERN_DEFS: &[(&str, &str)] = &[
    (r"rm\s+(-\S*[rR]\S*\s+)+\S", "recursive delete"),
    (r"(?i)del\s+/[fF]\b", "windows forced delete"),
    (r"git\s+reset\s+--hard", "git reset --hard"),
    (r"chmod\s+(-\S*[rR]\S*\s+)?777\b", "chmod 777"),
];

static SUSPICIOUS_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(SUSPICIOUS_PATTERN_DEFS.iter().map(|(p, _)| *p))
        .unwrap_or_else(|e| panic!("suspicious patterns must be valid regex: {e}"))
});

/// Returns the reason for the first suspicious pattern the command matches.
#[must_use]
pub fn check(command: &str) -> Option<&'static str> {
    SUSPICIOUS_SET
        .matches(command)
        .iter()
        .next()
        .map(|i| SUSPICIOUS_PATTERN_DEFS[i].1)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_recursive_delete_outside_root() {
        assert_eq!(check("rm -rf ./build"), Some("recursive delete"));
        assert_eq!(check("rm -rf /tmp/scratch"), Some("recursive delete"));
    }

    #[test]
    fn flags_git_reset_hard() {
        assert_eq!(check("git reset --hard HEAD~1"), Some("git reset --hard"));
    }

    #[test]
    fn flags_chmod_777() {
        assert_eq!(check("chmod 777 ./script.sh"), Some("chmod 777"));
        assert_eq!(check("chmod -R 777 ./dist"), Some("chmod 777"));
    }

    #[test]
    fn leaves_plain_delete_unflagged() {
        assert!(check("rm file.txt").is_none());
        assert!(check("git status").is_none());
    }
}

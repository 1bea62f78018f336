//! Risk-target extraction: what paths or resources a risky command would
//! actually touch, surfaced to the approver alongside the approval prompt.
//!
//! Tokenization reuses `shell_words` the same way `shell_ast` does; a
//! command that doesn't tokenize cleanly falls through to the `[cwd]`
//! default rather than guessing.

use std::path::Path;

/// Sub-commands known to be destructive regardless of their arguments.
/// Matched as a prefix over the token stream.
const DANGEROUS_SUBCOMMANDS: &[(&[&str], &str)] = &[
    (&["git", "clean"], "git clean"),
    (&["git", "reset", "--hard"], "git reset --hard"),
    (&["docker", "system", "prune"], "docker system prune"),
    (&["docker", "compose", "down", "-v"], "docker compose down -v"),
];

const DELETE_COMMANDS: &[&str] = &["rm", "del", "erase"];

fn looks_like_path(token: &str) -> bool {
    token.starts_with('/') || token.starts_with("./") || token.starts_with("../")
}

fn resolve(cwd: &Path, token: &str) -> String {
    if token.starts_with('/') {
        return token.to_string();
    }
    cwd.join(token).to_string_lossy().to_string()
}

/// Extract the set of paths/resources a command puts at risk, falling back
/// to `[cwd]` when nothing specific is identifiable.
#[must_use]
pub fn extract(command: &str, cwd: &Path) -> Vec<String> {
    let Ok(tokens) = shell_words::split(command) else {
        return vec![cwd.to_string_lossy().to_string()];
    };
    if tokens.is_empty() {
        return vec![cwd.to_string_lossy().to_string()];
    }

    let mut targets: Vec<String> = Vec::new();

    for (prefix, label) in DANGEROUS_SUBCOMMANDS {
        if tokens.len() >= prefix.len() && tokens.iter().take(prefix.len()).eq(prefix.iter()) {
            targets.push((*label).to_string());
        }
    }

    let is_delete = tokens.first().is_some_and(|t| DELETE_COMMANDS.contains(&t.as_str()));

    for token in tokens.iter().skip(1) {
        if token.starts_with('-') {
            continue;
        }
        if looks_like_path(token) {
            targets.push(resolve(cwd, token));
        } else if is_delete {
            targets.push(resolve(cwd, token));
        }
    }

    targets.sort();
    targets.dedup();

    if targets.is_empty() {
        vec![cwd.to_string_lossy().to_string()]
    } else {
        targets
    }
}

//! Stage 6 of the safety pipeline: the nearest `.smartsh-policy.yaml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use smartsh_core::{Error, Result};

use crate::RiskLevel;

pub const POLICY_FILE_NAME: &str = ".smartsh-policy.yaml";

/// Project-local policy, walked upward from the run's cwd.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPolicy {
    #[serde(default)]
    pub deny_commands: Vec<String>,

    #[serde(default)]
    pub allow_commands: Vec<String>,

    #[serde(default)]
    pub allow_paths: Vec<String>,

    #[serde(default)]
    pub deny_paths: Vec<String>,

    #[serde(default)]
    pub max_risk: Option<RiskLevel>,

    /// When non-empty, only these environment variable names may pass
    /// through to the child process (subject to further narrowing by the
    /// request's own `allowed_env`).
    #[serde(default)]
    pub allow_env: Vec<String>,

    /// Names excluded from the child environment regardless of
    /// `allow_env` or the request's `allowed_env`.
    #[serde(default)]
    pub deny_env: Vec<String>,
}

impl ProjectPolicy {
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::message(format!("invalid {POLICY_FILE_NAME}: {e}")))
    }

    /// Reject by `deny_commands`; if `allow_commands` is non-empty, require
    /// presence there too. Commands are matched verbatim (trimmed).
    fn check_command(&self, command: &str) -> std::result::Result<(), String> {
        let command = command.trim();
        if self.deny_commands.iter().any(|c| c.trim() == command) {
            return Err(format!("command is denied by project policy: {command}"));
        }
        if !self.allow_commands.is_empty()
            && !self.allow_commands.iter().any(|c| c.trim() == command)
        {
            return Err(format!(
                "command is not present in project policy's allow_commands: {command}"
            ));
        }
        Ok(())
    }

    /// Check `cwd` against `allow_paths`/`deny_paths` by absolute-prefix.
    fn check_path(&self, cwd: &Path) -> std::result::Result<(), String> {
        let cwd_str = cwd.to_string_lossy();
        if self.deny_paths.iter().any(|p| cwd_str.starts_with(p.as_str())) {
            return Err(format!(
                "cwd {cwd_str} is denied by project policy's deny_paths"
            ));
        }
        if !self.allow_paths.is_empty()
            && !self.allow_paths.iter().any(|p| cwd_str.starts_with(p.as_str()))
        {
            return Err(format!(
                "cwd {cwd_str} is not under project policy's allow_paths"
            ));
        }
        Ok(())
    }

    fn check_risk(&self, risk: RiskLevel) -> std::result::Result<(), String> {
        if let Some(max) = self.max_risk
            && risk > max
        {
            return Err(format!(
                "risk level {risk:?} exceeds project policy's max_risk {max:?}"
            ));
        }
        Ok(())
    }

    /// Build the child process environment from the ambient process
    /// environment, narrowed by `allow_env`/`deny_env`, further narrowed by
    /// the request's own `allowed_env`, then overlaid with explicit
    /// `request_env` overrides (which may introduce names absent from the
    /// ambient environment entirely).
    #[must_use]
    pub fn resolve_env(
        &self,
        ambient: &std::collections::BTreeMap<String, String>,
        requested_allowed: &std::collections::BTreeSet<String>,
        request_env: &std::collections::BTreeMap<String, String>,
    ) -> std::collections::BTreeMap<String, String> {
        let mut resolved = std::collections::BTreeMap::new();
        for (k, v) in ambient {
            if self.deny_env.iter().any(|d| d == k) {
                continue;
            }
            if !self.allow_env.is_empty() && !self.allow_env.iter().any(|a| a == k) {
                continue;
            }
            if !requested_allowed.is_empty() && !requested_allowed.contains(k) {
                continue;
            }
            resolved.insert(k.clone(), v.clone());
        }
        for (k, v) in request_env {
            resolved.insert(k.clone(), v.clone());
        }
        resolved
    }

    /// Evaluate all policy facets; returns the first violation found.
    pub fn evaluate(&self, command: &str, cwd: &Path, risk: RiskLevel) -> std::result::Result<(), String> {
        self.check_command(command)?;
        self.check_path(cwd)?;
        self.check_risk(risk)?;
        Ok(())
    }
}

/// Walk upward from `start` looking for `.smartsh-policy.yaml`, stopping at
/// the filesystem root. Returns `None` if no policy file exists.
pub fn find(start: &Path) -> Result<Option<ProjectPolicy>> {
    let mut dir: Option<PathBuf> = Some(start.to_path_buf());
    while let Some(d) = dir {
        let candidate = d.join(POLICY_FILE_NAME);
        if candidate.is_file() {
            let text = std::fs::read_to_string(&candidate)?;
            return ProjectPolicy::parse(&text).map(Some);
        }
        dir = d.parent().map(Path::to_path_buf);
    }
    Ok(None)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_commands_rejects_exact_match() {
        let policy = ProjectPolicy::parse("deny_commands:\n  - \"git push --force\"\n")
            .expect("parse");
        assert!(policy
            .check_command("git push --force")
            .is_err());
        assert!(policy.check_command("git status").is_ok());
    }

    #[test]
    fn non_empty_allow_commands_enforces_presence() {
        let policy = ProjectPolicy::parse("allow_commands:\n  - \"cargo test\"\n").expect("parse");
        assert!(policy.check_command("cargo test").is_ok());
        assert!(policy.check_command("cargo publish").is_err());
    }

    #[test]
    fn resolve_env_narrows_by_allow_then_deny_then_request() {
        let policy = ProjectPolicy::parse(
            "allow_env:\n  - PATH\n  - HOME\ndeny_env:\n  - HOME\n",
        )
        .expect("parse");
        let mut ambient = std::collections::BTreeMap::new();
        ambient.insert("PATH".to_string(), "/usr/bin".to_string());
        ambient.insert("HOME".to_string(), "/root".to_string());
        ambient.insert("SECRET".to_string(), "xyz".to_string());

        let resolved = policy.resolve_env(
            &ambient,
            &std::collections::BTreeSet::new(),
            &std::collections::BTreeMap::new(),
        );
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.get("PATH"), Some(&"/usr/bin".to_string()));
    }

    #[test]
    fn resolve_env_overlays_request_env_even_for_new_names() {
        let policy = ProjectPolicy::default();
        let ambient = std::collections::BTreeMap::new();
        let mut request_env = std::collections::BTreeMap::new();
        request_env.insert("FOO".to_string(), "bar".to_string());

        let resolved =
            policy.resolve_env(&ambient, &std::collections::BTreeSet::new(), &request_env);
        assert_eq!(resolved.get("FOO"), Some(&"bar".to_string()));
    }

    #[test]
    fn deny_paths_rejects_prefix_match() {
        let policy =
            ProjectPolicy::parse("deny_paths:\n  - \"/etc\"\n").expect("parse");
        assert!(policy.check_path(Path::new("/etc/nginx")).is_err());
        assert!(policy.check_path(Path::new("/home/user/project")).is_ok());
    }

    #[test]
    fn max_risk_rejects_commands_above_ceiling() {
        let policy = ProjectPolicy::parse("max_risk: low\n").expect("parse");
        assert!(policy.check_risk(RiskLevel::Low).is_ok());
        assert!(policy.check_risk(RiskLevel::Medium).is_err());
    }

    #[test]
    fn find_walks_up_from_nested_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(POLICY_FILE_NAME),
            "deny_commands:\n  - \"rm -rf /\"\n",
        )
        .expect("write policy");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let found = find(&nested).expect("find").expect("present");
        assert_eq!(found.deny_commands, vec!["rm -rf /".to_string()]);
    }

    #[test]
    fn find_returns_none_when_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(find(dir.path()).expect("find").is_none());
    }
}

//! The natural-language planner and workspace environment detector are
//! declared external collaborators, consumed only through the narrow
//! interfaces named here -- `Planner::plan` and `EnvironmentProbe::detect`.
//! Real implementations (local HTTP call to a model, a project-marker
//! scanner) are out of scope; the pass-through stubs below satisfy the
//! contract for a literal command handed to the CLI without `--agent`,
//! and for `--agent` mode until a real planner is wired in.

use std::path::PathBuf;

/// A coarse snapshot of the workspace the CLI is invoked in.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub cwd: PathBuf,
    pub markers: Vec<String>,
}

pub trait EnvironmentProbe {
    fn detect(&self) -> Environment;
}

/// Reports the process cwd and no project markers -- real detection (scan
/// for Cargo.toml/package.json/etc.) is one of the declared out-of-scope
/// collaborators.
pub struct NullEnvironmentProbe;

impl EnvironmentProbe for NullEnvironmentProbe {
    fn detect(&self) -> Environment {
        Environment { cwd: std::env::current_dir().unwrap_or_default(), markers: Vec::new() }
    }
}

/// The planner's declared output shape: `{intent, command, confidence, risk}`.
#[derive(Debug, Clone)]
pub struct Plan {
    pub intent: String,
    pub command: String,
    pub confidence: f64,
    pub risk: String,
}

pub trait Planner {
    fn plan(&self, instruction: &str, environment: &Environment) -> Plan;
}

/// Treats the instruction itself as the command to run. This is what a
/// literal (non-`--agent`) invocation needs -- there is no instruction to
/// interpret, just a command to execute -- and stands in for a real model
/// call in `--agent` mode until one is configured.
pub struct PassthroughPlanner;

impl Planner for PassthroughPlanner {
    fn plan(&self, instruction: &str, _environment: &Environment) -> Plan {
        Plan {
            intent: "run".to_string(),
            command: instruction.to_string(),
            confidence: 1.0,
            risk: "low".to_string(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_planner_echoes_the_instruction_as_the_command() {
        let plan = PassthroughPlanner.plan("echo hi", &Environment::default());
        assert_eq!(plan.command, "echo hi");
        assert_eq!(plan.intent, "run");
    }

    #[test]
    fn null_environment_probe_reports_the_process_cwd() {
        let env = NullEnvironmentProbe.detect();
        assert!(env.markers.is_empty());
        assert_eq!(env.cwd, std::env::current_dir().unwrap_or_default());
    }
}

//! Orchestrates the six safety-pipeline stages in order, short-circuiting
//! at the first stage that blocks the command outright.

use std::path::Path;

use serde::{Deserialize, Serialize};
use smartsh_core::AllowlistMode;

use crate::{allowlist, blocklist, policy, shell_ast, suspicious};

/// Risk level assigned to a command. Ordered `Low < Medium < High` so
/// stages can monotonically raise it and `max_risk` policy checks can
/// compare directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Non-blocking result of running the full pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub requires_confirmation: bool,
    pub risk_level: RiskLevel,
    pub risk_reason: Option<String>,
    pub allowlist_warning: Option<String>,
}

/// A stage rejected the command outright.
#[derive(Debug, Clone)]
pub struct Blocked {
    pub blocked_reason: String,
}

/// Everything the pipeline needs to evaluate one command.
pub struct PipelineInput<'a> {
    pub command: &'a str,
    pub cwd: &'a Path,
    pub is_unsafe: bool,
    pub model_risk: Option<RiskLevel>,
    pub allowlist_mode: AllowlistMode,
    pub allowlist_entries: &'a [allowlist::Entry],
}

/// Run stages 1-6 of the safety pipeline in order.
pub fn run(input: &PipelineInput<'_>) -> Result<PipelineOutcome, Blocked> {
    // Stage 1: block list. `unsafe=true` bypasses it entirely.
    if !input.is_unsafe
        && let Some(reason) = blocklist::check(input.command)
    {
        return Err(Blocked {
            blocked_reason: reason.to_string(),
        });
    }

    let mut risk = RiskLevel::Low;
    let mut reason: Option<String> = None;

    // Stage 2: shell-AST structural risk.
    if let Some(r) = shell_ast::detect(input.command) {
        risk = risk.max(RiskLevel::Medium);
        reason.get_or_insert_with(|| r.to_string());
    }

    // Stage 3: suspicious pattern match.
    if let Some(r) = suspicious::check(input.command) {
        risk = risk.max(RiskLevel::Medium);
        reason.get_or_insert_with(|| r.to_string());
    }

    // Stage 4: model-declared risk is a floor, not a ceiling.
    if let Some(model_risk) = input.model_risk {
        risk = risk.max(model_risk);
        reason.get_or_insert_with(|| "planner-declared risk".to_string());
    }

    // Stage 5: allowlist.
    let mut allowlist_warning = None;
    match allowlist::evaluate(input.allowlist_mode, input.command, input.allowlist_entries) {
        allowlist::Outcome::Proceed => {},
        allowlist::Outcome::Warn(msg) => allowlist_warning = Some(msg),
        allowlist::Outcome::Blocked(msg) => return Err(Blocked { blocked_reason: msg }),
    }

    // Stage 6: nearest project policy.
    match policy::find(input.cwd) {
        Ok(Some(p)) => {
            if let Err(msg) = p.evaluate(input.command, input.cwd, risk) {
                return Err(Blocked { blocked_reason: msg });
            }
        },
        Ok(None) => {},
        Err(e) => {
            return Err(Blocked {
                blocked_reason: format!("could not read project policy: {e}"),
            });
        },
    }

    Ok(PipelineOutcome {
        requires_confirmation: risk != RiskLevel::Low,
        risk_level: risk,
        risk_reason: reason,
        allowlist_warning,
    })
}

//! Human-facing output for non-JSON mode: the pre-execution plan summary
//! and the interactive approval prompt.

use std::io::Write;

use smartsh_core::RunResponse;

use crate::planner::Plan;

/// Prints `intent/confidence/risk/resolved_command` lines, per spec's
/// non-JSON-mode contract, before the command is submitted.
pub fn print_plan(plan: &Plan) {
    println!("intent: {}", plan.intent);
    println!("confidence: {:.2}", plan.confidence);
    println!("risk: {}", plan.risk);
    println!("resolved_command: {}", plan.command);
}

/// Prompts the user for an approve/reject decision on a risky command,
/// mirroring the tool bridge's approval-decoration wording.
pub fn ask_yes_no(response: &RunResponse) -> std::io::Result<bool> {
    let targets = response.risk_targets.join(", ");
    let targets = if targets.is_empty() { "the current directory".to_string() } else { targets };
    print!("You are about to modify: {targets}. Approve? (y/n) ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Prints the execution's own output after a terminal result, per spec's
/// "non-JSON mode prints ... the execution's own output afterwards".
pub fn print_result(response: &RunResponse) {
    if !response.summary.summary.is_empty() {
        println!("{}", response.summary.summary);
    }
    if !response.output_tail.is_empty() {
        println!("{}", response.output_tail);
    }
    if let Some(reason) = &response.blocked_reason {
        println!("blocked: {reason}");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use smartsh_core::RunStatus;

    use super::*;

    #[test]
    fn print_plan_does_not_panic() {
        print_plan(&Plan { intent: "run".to_string(), command: "echo hi".to_string(), confidence: 1.0, risk: "low".to_string() });
    }

    #[test]
    fn print_result_does_not_panic_on_a_bare_response() {
        print_result(&RunResponse::new("job_1", RunStatus::Completed));
    }
}

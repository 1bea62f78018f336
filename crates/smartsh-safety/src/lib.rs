//! The ordered safety pipeline: block list, shell-AST risk detection,
//! suspicious patterns, model-declared risk, allowlist, and project policy.

pub mod allowlist;
pub mod blocklist;
pub mod pipeline;
pub mod policy;
pub mod risk_targets;
pub mod shell_ast;
pub mod suspicious;

pub use pipeline::{run, Blocked, PipelineInput, PipelineOutcome, RiskLevel};
pub use policy::ProjectPolicy;

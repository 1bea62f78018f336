//! Shared data model, error type, and id allocation for the smartsh workspace.

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    AllowlistMode, Approval, ApprovalStatus, Job, PtySessionView, RunRequest, RunResponse,
    RunStatus, Summary, approval_id, job_id,
};

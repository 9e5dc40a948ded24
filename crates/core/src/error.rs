//! Errors surfaced to callers of the workflow.

use crate::role::ArtifactRole;
use crate::state::Stage;
use crate::store::StoreError;

/// Command failures. All are case-scoped and leave the state unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// `start_processing` before every role has an artifact.
    #[error("case is not ready: missing {}", join_roles(.missing))]
    NotReady { missing: Vec<ArtifactRole> },

    /// The command is not accepted in the current stage.
    #[error("'{command}' is not allowed while the case is in stage '{stage}'")]
    InvalidTransition { command: Command, stage: Stage },

    #[error("risk threshold must be between 0 and 100, got {0}")]
    InvalidThreshold(u8),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The owner task has stopped.
    #[error("workflow is shut down")]
    Closed,
}

impl WorkflowError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::NotReady { .. } => "not_ready",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::InvalidThreshold(_) => "invalid_threshold",
            WorkflowError::Store(_) => "store_error",
            WorkflowError::Closed => "closed",
        }
    }
}

fn join_roles(roles: &[ArtifactRole]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// External commands, named for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Upload,
    SetRiskThreshold,
    StartProcessing,
    Cancel,
    Reset,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Upload => "upload",
            Command::SetRiskThreshold => "set_risk_threshold",
            Command::StartProcessing => "start_processing",
            Command::Cancel => "cancel",
            Command::Reset => "reset",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

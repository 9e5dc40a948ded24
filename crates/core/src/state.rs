//! Workflow stages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::outcome::ValidationOutcome;

/// The coarse state of a case. Exactly one is current at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum WorkflowState {
    /// Collecting artifacts. Initial state.
    Intake,
    /// Progress is a UX pacing signal in 0..=100.
    Processing { progress: u8 },
    /// Terminal until reset.
    Completed { outcome: ValidationOutcome },
}

impl Default for WorkflowState {
    fn default() -> Self {
        WorkflowState::Intake
    }
}

impl WorkflowState {
    /// Stage name as used in errors and on the wire.
    pub fn stage(&self) -> Stage {
        match self {
            WorkflowState::Intake => Stage::Intake,
            WorkflowState::Processing { .. } => Stage::Processing,
            WorkflowState::Completed { .. } => Stage::Completed,
        }
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            WorkflowState::Processing { progress } => Some(*progress),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<&ValidationOutcome> {
        match self {
            WorkflowState::Completed { outcome } => Some(outcome),
            _ => None,
        }
    }

    /// Display phase while processing.
    pub fn phase(&self) -> Option<ProcessingPhase> {
        self.progress().map(ProcessingPhase::for_progress)
    }
}

/// Stage discriminant without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Processing,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Processing => "processing",
            Stage::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display label for a processing run, derived from progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPhase {
    DocumentExtraction,
    DataVerification,
    RiskAssessment,
    FinalValidation,
}

impl ProcessingPhase {
    pub fn for_progress(progress: u8) -> Self {
        match progress {
            0..=24 => ProcessingPhase::DocumentExtraction,
            25..=49 => ProcessingPhase::DataVerification,
            50..=74 => ProcessingPhase::RiskAssessment,
            _ => ProcessingPhase::FinalValidation,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessingPhase::DocumentExtraction => "Document Extraction",
            ProcessingPhase::DataVerification => "Data Verification",
            ProcessingPhase::RiskAssessment => "Risk Assessment",
            ProcessingPhase::FinalValidation => "Final Validation",
        }
    }
}

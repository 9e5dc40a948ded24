//! Transition core of the workflow.
//!
//! [`CaseMachine`] is synchronous and owns nothing but data: the current
//! [`WorkflowState`], the [`IntakeRegistry`] and the case counter. The async
//! owner task in [`crate::workflow`] feeds it commands and ticks and performs
//! the I/O (document store, validation engine, publishing) around it.
//!
//! Legal transitions:
//!
//! | stage      | command              | result                         |
//! |------------|----------------------|--------------------------------|
//! | Intake     | upload               | Intake                         |
//! | Intake     | set_risk_threshold   | Intake                         |
//! | Intake     | start_processing     | Processing(0), or `NotReady`   |
//! | Processing | cancel               | Intake, artifacts kept         |
//! | Processing | (tick)               | Processing(p + step), max 100  |
//! | Processing | (evaluation result)  | Completed(outcome)             |
//! | Completed  | reset                | Intake, intake cleared         |
//!
//! Everything else is `InvalidTransition` and leaves the state unchanged.

use crate::error::{Command, WorkflowError};
use crate::intake::{CaseIntake, IntakeRegistry, UploadedArtifact};
use crate::outcome::ValidationOutcome;
use crate::state::{Stage, WorkflowState};

/// Progress points added per tick when none is configured.
pub const DEFAULT_PROGRESS_STEP: u8 = 1;

#[derive(Debug)]
pub struct CaseMachine {
    state: WorkflowState,
    registry: IntakeRegistry,
    case_number: u64,
    step: u8,
    evaluating: bool,
}

impl Default for CaseMachine {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_STEP)
    }
}

impl CaseMachine {
    /// A machine in Intake for case 1. A zero step is raised to 1.
    pub fn new(step: u8) -> Self {
        CaseMachine {
            state: WorkflowState::Intake,
            registry: IntakeRegistry::new(),
            case_number: 1,
            step: step.max(1),
            evaluating: false,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn intake(&self) -> &CaseIntake {
        self.registry.intake()
    }

    pub fn case_number(&self) -> u64 {
        self.case_number
    }

    /// True between `begin_evaluation` and `complete`.
    pub fn is_evaluating(&self) -> bool {
        self.evaluating
    }

    /// Fail with `InvalidTransition` unless `command` is legal now.
    pub fn ensure_accepts(&self, command: Command) -> Result<(), WorkflowError> {
        let legal = match command {
            Command::Upload | Command::SetRiskThreshold | Command::StartProcessing => {
                self.stage() == Stage::Intake
            }
            Command::Cancel => self.stage() == Stage::Processing && !self.evaluating,
            Command::Reset => self.stage() == Stage::Completed,
        };
        if legal {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                command,
                stage: self.stage(),
            })
        }
    }

    // ── Commands ────────────────────────────────

    /// Register an already classified and stored artifact.
    pub fn accept_upload(
        &mut self,
        artifact: UploadedArtifact,
    ) -> Result<Option<UploadedArtifact>, WorkflowError> {
        self.ensure_accepts(Command::Upload)?;
        Ok(self.registry.add_artifact(artifact))
    }

    pub fn set_risk_threshold(&mut self, value: u8) -> Result<(), WorkflowError> {
        self.ensure_accepts(Command::SetRiskThreshold)?;
        self.registry
            .set_risk_threshold(value)
            .map_err(WorkflowError::InvalidThreshold)
    }

    pub fn start_processing(&mut self) -> Result<&WorkflowState, WorkflowError> {
        self.ensure_accepts(Command::StartProcessing)?;
        if !self.registry.ready_for_validation() {
            return Err(WorkflowError::NotReady {
                missing: self.registry.intake().missing_roles(),
            });
        }
        self.evaluating = false;
        self.state = WorkflowState::Processing { progress: 0 };
        Ok(&self.state)
    }

    /// Back to Intake, keeping every uploaded artifact.
    pub fn cancel(&mut self) -> Result<&WorkflowState, WorkflowError> {
        self.ensure_accepts(Command::Cancel)?;
        self.state = WorkflowState::Intake;
        Ok(&self.state)
    }

    /// Clear the intake and outcome and start the next case.
    pub fn reset(&mut self) -> Result<&WorkflowState, WorkflowError> {
        self.ensure_accepts(Command::Reset)?;
        self.registry.clear();
        self.state = WorkflowState::Intake;
        self.evaluating = false;
        self.case_number += 1;
        Ok(&self.state)
    }

    // ── Autonomous steps ────────────────────────

    /// Advance progress by one step.
    ///
    /// Returns the new progress, or `None` when not processing or already
    /// at 100.
    pub fn tick(&mut self) -> Option<u8> {
        match &mut self.state {
            WorkflowState::Processing { progress } if *progress < 100 => {
                *progress = progress.saturating_add(self.step).min(100);
                Some(*progress)
            }
            _ => None,
        }
    }

    /// Snapshot for the engine, once per run, only at progress 100.
    pub fn begin_evaluation(&mut self) -> Option<CaseIntake> {
        match self.state {
            WorkflowState::Processing { progress: 100 } if !self.evaluating => {
                self.evaluating = true;
                Some(self.registry.snapshot())
            }
            _ => None,
        }
    }

    /// Record the outcome of the evaluation started by `begin_evaluation`.
    ///
    /// Returns false (and changes nothing) if no evaluation is in flight.
    pub fn complete(&mut self, outcome: ValidationOutcome) -> bool {
        if !self.evaluating {
            return false;
        }
        self.evaluating = false;
        self.state = WorkflowState::Completed { outcome };
        true
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

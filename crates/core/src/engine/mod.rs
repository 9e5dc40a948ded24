//! Scoring backend abstraction.
//!
//! The workflow never scores documents itself: it hands a complete
//! [`CaseIntake`] to a [`ValidationEngine`] once processing finishes.
//! Three implementations ship with the crate:
//!
//! - [`ReferenceEngine`]: the demo behaviour, with an injectable gate and
//!   a seedable random source
//! - [`ScriptedEngine`]: a deterministic double for tests
//! - [`HttpScoringEngine`]: posts the intake to a remote scoring service
//!
//! [`evaluate_guarded`] is the only way the workflow calls an engine: it
//! bounds the call with a timeout and turns any failure into a synthetic
//! failed outcome so a case can always complete.

pub mod http;
pub mod reference;
pub mod scripted;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::intake::CaseIntake;
use crate::outcome::{Finding, ValidationOutcome};
use crate::role::ArtifactRole;

pub use http::HttpScoringEngine;
pub use reference::{FixedGate, OutcomeGate, ReferenceEngine, SecondParityGate};
pub use scripted::ScriptedEngine;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Failures of a scoring backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The backend could not be reached.
    #[error("scoring backend unavailable: {0}")]
    Unavailable(String),
    /// The backend reported an error.
    #[error("scoring backend error: {0}")]
    Backend(String),
    /// The backend answered with something that is not a valid outcome.
    #[error("invalid scoring response: {0}")]
    InvalidResponse(String),
    /// The call did not return within the configured timeout.
    #[error("scoring backend timed out after {0:?}")]
    Timeout(Duration),
}

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Produces a [`ValidationOutcome`] for a complete intake.
///
/// Implementations must not assume they are called more than once per
/// processing run, and receive a read-only snapshot of the intake.
#[async_trait]
pub trait ValidationEngine: Send + Sync {
    async fn evaluate(&self, intake: &CaseIntake) -> Result<ValidationOutcome, EngineError>;

    /// Short identifier used in logs and fault findings.
    fn engine_id(&self) -> &str;
}

/// Evaluate with a timeout; faults become a failed outcome.
///
/// The synthetic outcome carries a single finding attributed to the
/// identity document (the first role in canonical order), located at the
/// scoring backend.
pub async fn evaluate_guarded(
    engine: &dyn ValidationEngine,
    intake: &CaseIntake,
    timeout: Duration,
) -> ValidationOutcome {
    let result = match tokio::time::timeout(timeout, engine.evaluate(intake)).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(timeout)),
    };

    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(engine = engine.engine_id(), error = %err, "validation engine fault");
            engine_fault_outcome(engine.engine_id(), &err)
        }
    }
}

/// [`evaluate_guarded`] on its own task, so a panicking engine also ends
/// in a failed outcome instead of taking the caller down.
pub async fn evaluate_isolated(
    engine: Arc<dyn ValidationEngine>,
    intake: CaseIntake,
    timeout: Duration,
) -> ValidationOutcome {
    let engine_id = engine.engine_id().to_string();
    let task = tokio::spawn(async move {
        evaluate_guarded(engine.as_ref(), &intake, timeout).await
    });
    match task.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let err = EngineError::Backend(format!("evaluation aborted: {}", join_err));
            tracing::warn!(engine = %engine_id, error = %err, "validation engine panicked");
            engine_fault_outcome(&engine_id, &err)
        }
    }
}

/// The failed outcome recorded when the scoring backend faults.
pub fn engine_fault_outcome(engine_id: &str, err: &EngineError) -> ValidationOutcome {
    let finding = Finding::new(
        ArtifactRole::ALL[0],
        format!("Validation could not be completed: {}", err),
        format!("Scoring backend '{}'", engine_id),
    );
    ValidationOutcome::failed_with(finding)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

//! Reference scoring behaviour from the demo front end.
//!
//! Not real business logic. The success decision is delegated to an
//! [`OutcomeGate`]; the demo's wall-clock second parity rule survives only
//! as [`SecondParityGate`], a placeholder that tests never rely on.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

use super::{EngineError, ValidationEngine};
use crate::intake::CaseIntake;
use crate::outcome::{Finding, Scores, ValidationOutcome};
use crate::role::ArtifactRole;

// ──────────────────────────────────────────────
// Gates
// ──────────────────────────────────────────────

/// Decides whether a reference evaluation succeeds.
pub trait OutcomeGate: Send + Sync {
    fn passes(&self) -> bool;
}

/// Succeeds when the current UTC second is even.
///
/// Placeholder only: non-deterministic by construction.
pub struct SecondParityGate;

impl OutcomeGate for SecondParityGate {
    fn passes(&self) -> bool {
        time::OffsetDateTime::now_utc().second() % 2 == 0
    }
}

/// Always succeeds or always fails.
pub struct FixedGate(pub bool);

impl OutcomeGate for FixedGate {
    fn passes(&self) -> bool {
        self.0
    }
}

// ──────────────────────────────────────────────
// ReferenceEngine
// ──────────────────────────────────────────────

/// Demo engine: random scores in fixed bands, fixed findings on failure.
pub struct ReferenceEngine {
    gate: Box<dyn OutcomeGate>,
    rng: Mutex<StdRng>,
    latency: Duration,
}

impl ReferenceEngine {
    /// Engine with the given gate and an entropy-seeded random source.
    pub fn new(gate: Box<dyn OutcomeGate>) -> Self {
        ReferenceEngine {
            gate,
            rng: Mutex::new(StdRng::from_entropy()),
            latency: Duration::ZERO,
        }
    }

    /// Engine with a fixed seed, for reproducible scores.
    pub fn seeded(gate: Box<dyn OutcomeGate>, seed: u64) -> Self {
        ReferenceEngine {
            gate,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            latency: Duration::ZERO,
        }
    }

    /// Simulated analysis time before answering (the demo waited 3 s).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn success_scores(&self) -> Scores {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Scores {
            confidence_score: rng.gen_range(70..=99),
            risk_factor: rng.gen_range(10..=39),
            credit_score: rng.gen_range(7..=8),
        }
    }
}

/// The two findings the demo reports on every failure.
pub fn reference_findings() -> Vec<Finding> {
    vec![
        Finding::new(
            ArtifactRole::Identity,
            "Missing gender information (Sex field)",
            "Page 1, Section 'Sex'",
        ),
        Finding::new(
            ArtifactRole::AccountForm,
            "Missing specimen signature",
            "Page 1, Bottom section",
        ),
    ]
}

#[async_trait]
impl ValidationEngine for ReferenceEngine {
    async fn evaluate(&self, intake: &CaseIntake) -> Result<ValidationOutcome, EngineError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let passed = self.gate.passes();
        tracing::debug!(
            passed,
            artifacts = intake.len(),
            risk_threshold = intake.risk_threshold(),
            "reference evaluation"
        );

        let outcome = if passed {
            ValidationOutcome::success(self.success_scores())
        } else {
            ValidationOutcome::failed(reference_findings())
        };
        outcome.map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }

    fn engine_id(&self) -> &str {
        "reference"
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ValidationStatus;

    #[tokio::test]
    async fn passing_gate_scores_within_bands() {
        let engine = ReferenceEngine::seeded(Box::new(FixedGate(true)), 7);
        for _ in 0..50 {
            let outcome = engine.evaluate(&CaseIntake::default()).await.unwrap();
            assert_eq!(outcome.status(), ValidationStatus::Success);
            let scores = outcome.scores().expect("scores");
            assert!((70..=99).contains(&scores.confidence_score));
            assert!((10..=39).contains(&scores.risk_factor));
            assert!((7..=8).contains(&scores.credit_score));
            assert!(outcome.findings().is_empty());
        }
    }

    #[tokio::test]
    async fn failing_gate_reports_fixed_findings() {
        let engine = ReferenceEngine::seeded(Box::new(FixedGate(false)), 7);
        let outcome = engine.evaluate(&CaseIntake::default()).await.unwrap();
        assert_eq!(outcome.status(), ValidationStatus::Failed);
        assert!(outcome.scores().is_none());
        assert_eq!(outcome.findings(), reference_findings().as_slice());
        assert_eq!(outcome.findings()[0].role, ArtifactRole::Identity);
        assert_eq!(outcome.findings()[1].role, ArtifactRole::AccountForm);
    }

    #[tokio::test]
    async fn same_seed_same_scores() {
        let a = ReferenceEngine::seeded(Box::new(FixedGate(true)), 42);
        let b = ReferenceEngine::seeded(Box::new(FixedGate(true)), 42);
        for _ in 0..10 {
            assert_eq!(
                a.evaluate(&CaseIntake::default()).await.unwrap(),
                b.evaluate(&CaseIntake::default()).await.unwrap()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_simulated() {
        let engine = ReferenceEngine::seeded(Box::new(FixedGate(true)), 1)
            .with_latency(Duration::from_secs(3));
        let started = tokio::time::Instant::now();
        engine.evaluate(&CaseIntake::default()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}

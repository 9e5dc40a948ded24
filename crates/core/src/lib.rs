//! kycflow-core: document-verification workflow orchestrator.
//!
//! Advances one client case through intake, processing and completion,
//! classifying uploaded artifacts, obtaining a scored outcome from a
//! pluggable scoring backend and broadcasting live progress.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root:
//!
//! - [`classify()`] -- map an artifact name to its [`ArtifactRole`]
//! - [`IntakeRegistry`] / [`CaseIntake`] -- per-case artifacts and readiness
//! - [`ValidationEngine`] -- scoring backend seam, with [`ReferenceEngine`],
//!   [`ScriptedEngine`] and [`HttpScoringEngine`]
//! - [`CaseMachine`] -- synchronous transition core
//! - [`Workflow`] / [`WorkflowHandle`] -- the single-writer owner task
//! - [`StatusPublisher`] -- stage and heartbeat broadcasting
//! - [`WorkflowError`] -- command error taxonomy

/// Crate version reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod engine;
pub mod error;
pub mod intake;
pub mod machine;
pub mod outcome;
pub mod publisher;
pub mod role;
pub mod state;
pub mod store;
pub mod workflow;

// ── Convenience re-exports ───────────────────────────────────────────

pub use engine::{
    evaluate_guarded, evaluate_isolated, EngineError, FixedGate, HttpScoringEngine, OutcomeGate,
    ReferenceEngine, ScriptedEngine, SecondParityGate, ValidationEngine,
};
pub use error::{Command, WorkflowError};
pub use intake::{ArtifactId, CaseIntake, IntakeRegistry, UploadedArtifact, DEFAULT_RISK_THRESHOLD};
pub use machine::CaseMachine;
pub use outcome::{Finding, OutcomeError, Scores, ValidationOutcome, ValidationStatus};
pub use publisher::{
    HeartbeatTask, StageChange, StatusEvent, StatusPublisher, StatusSubscription,
};
pub use role::{classify, classify_all, ArtifactRole, Classification};
pub use state::{ProcessingPhase, Stage, WorkflowState};
pub use store::{DocumentStore, InMemoryDocumentStore, StoreError, StoredDocument};
pub use workflow::{
    CaseSnapshot, IncomingArtifact, UploadReport, Workflow, WorkflowConfig, WorkflowHandle,
};

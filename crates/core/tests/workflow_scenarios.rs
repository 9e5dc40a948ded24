//! End-to-end scenarios for the workflow owner task.
//!
//! All tests run on a paused clock, so a full 100-tick processing run
//! completes instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kycflow_core::{
    ArtifactRole, CaseIntake, Command, EngineError, FixedGate, IncomingArtifact, ReferenceEngine,
    Scores, ScriptedEngine, Stage, StatusEvent, StatusSubscription, ValidationEngine,
    ValidationOutcome, ValidationStatus, Workflow, WorkflowConfig, WorkflowError, WorkflowHandle,
    WorkflowState,
};

fn success() -> ValidationOutcome {
    ValidationOutcome::success(Scores {
        confidence_score: 93,
        risk_factor: 17,
        credit_score: 8,
    })
    .unwrap()
}

fn four_documents() -> Vec<IncomingArtifact> {
    vec![
        IncomingArtifact::with_content("passport.png", b"png".to_vec()),
        IncomingArtifact::with_content("client_profile.docx", b"docx".to_vec()),
        IncomingArtifact::with_content("account_opening.pdf", b"pdf".to_vec()),
        IncomingArtifact::with_content("client_description.txt", b"txt".to_vec()),
    ]
}

fn spawn(engine: Arc<ScriptedEngine>) -> WorkflowHandle {
    Workflow::new(engine).spawn()
}

async fn wait_completed(handle: &WorkflowHandle) -> ValidationOutcome {
    let snapshot = handle
        .wait_for(|s| matches!(s.state, WorkflowState::Completed { .. }))
        .await
        .unwrap();
    match snapshot.state {
        WorkflowState::Completed { outcome } => outcome,
        other => panic!("expected completed, got {:?}", other),
    }
}

/// Collect stage changes until the case completes.
async fn states_until_completed(sub: &mut StatusSubscription) -> Vec<WorkflowState> {
    let mut states = Vec::new();
    while let Some(event) = sub.recv().await {
        if let StatusEvent::StageChanged(change) = event {
            let done = change.state.stage() == Stage::Completed;
            states.push(change.state);
            if done {
                break;
            }
        }
    }
    states
}

// ──────────────────────────────────────────────
// Scenarios
// ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn full_intake_runs_to_completion() {
    let engine = Arc::new(ScriptedEngine::always(success()));
    let handle = spawn(engine.clone());
    let mut sub = handle.subscribe();

    let report = handle.upload(four_documents()).await.unwrap();
    assert_eq!(report.accepted.len(), 4);
    assert_eq!(report.skipped, 0);

    assert_eq!(
        handle.start_processing().await.unwrap(),
        WorkflowState::Processing { progress: 0 }
    );

    let states = states_until_completed(&mut sub).await;
    assert_eq!(states.first(), Some(&WorkflowState::Processing { progress: 0 }));
    assert_eq!(
        states.last(),
        Some(&WorkflowState::Completed {
            outcome: success()
        })
    );
    assert_eq!(wait_completed(&handle).await, success());
}

#[tokio::test(start_paused = true)]
async fn three_of_four_roles_is_not_ready() {
    let engine = Arc::new(ScriptedEngine::always(success()));
    let handle = spawn(engine.clone());

    let mut docs = four_documents();
    docs.remove(1);
    docs.push(IncomingArtifact::named("another_passport.jpg"));
    let report = handle.upload(docs).await.unwrap();
    assert_eq!(report.accepted.len(), 4);

    assert_eq!(
        handle.start_processing().await,
        Err(WorkflowError::NotReady {
            missing: vec![ArtifactRole::Profile]
        })
    );
    assert_eq!(handle.state(), WorkflowState::Intake);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn progress_is_monotone_and_engine_called_once_at_100() {
    let engine = Arc::new(ScriptedEngine::always(success()));
    let handle = spawn(engine.clone());
    let mut sub = handle.subscribe();

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();

    let states = states_until_completed(&mut sub).await;
    let progress: Vec<u8> = states.iter().filter_map(|s| s.progress()).collect();
    assert_eq!(progress.len(), 101);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));

    assert_eq!(engine.calls(), 1);
    let evaluated = engine.evaluated();
    assert!(evaluated[0].ready_for_validation());
    assert_eq!(evaluated[0].len(), 4);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_progress_and_keeps_artifacts() {
    let engine = Arc::new(ScriptedEngine::always(success()));
    let handle = spawn(engine.clone());

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    handle
        .wait_for(|s| s.state.progress().is_some_and(|p| p >= 10))
        .await
        .unwrap();

    let mut sub = handle.subscribe();
    assert_eq!(handle.cancel().await.unwrap(), WorkflowState::Intake);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut after_cancel = Vec::new();
    while let Some(event) = sub.try_recv() {
        if let StatusEvent::StageChanged(change) = event {
            after_cancel.push(change.state);
        }
    }
    assert_eq!(after_cancel.last(), Some(&WorkflowState::Intake));
    let intake_at = after_cancel
        .iter()
        .position(|s| *s == WorkflowState::Intake)
        .unwrap();
    assert_eq!(intake_at, after_cancel.len() - 1);

    assert_eq!(engine.calls(), 0);
    assert!(handle.intake().ready_for_validation());
    assert_eq!(handle.state(), WorkflowState::Intake);
}

#[tokio::test(start_paused = true)]
async fn reset_after_completion_starts_a_fresh_case() {
    let engine = Arc::new(ScriptedEngine::with_script(
        vec![Ok(success())],
        Err(EngineError::Unavailable("down".into())),
    ));
    let handle = spawn(engine.clone());

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    wait_completed(&handle).await;

    let mut sub = handle.subscribe();
    assert_eq!(handle.reset().await.unwrap(), WorkflowState::Intake);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.case, 2);
    assert!(snapshot.intake.is_empty());
    match sub.recv().await {
        Some(StatusEvent::StageChanged(change)) => {
            assert_eq!(change.case, 2);
            assert_eq!(change.state, WorkflowState::Intake);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Second case; the engine now faults.
    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    let outcome = wait_completed(&handle).await;
    assert_eq!(outcome.status(), ValidationStatus::Failed);
    assert_eq!(engine.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn commands_illegal_in_stage_leave_state_unchanged() {
    let engine = Arc::new(ScriptedEngine::always(success()));
    let handle = spawn(engine);

    assert!(matches!(
        handle.reset().await,
        Err(WorkflowError::InvalidTransition {
            command: Command::Reset,
            stage: Stage::Intake
        })
    ));

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    assert!(matches!(
        handle.upload(vec![IncomingArtifact::named("late.png")]).await,
        Err(WorkflowError::InvalidTransition { command: Command::Upload, .. })
    ));
    assert!(matches!(
        handle.start_processing().await,
        Err(WorkflowError::InvalidTransition { .. })
    ));

    wait_completed(&handle).await;
    assert!(matches!(
        handle.cancel().await,
        Err(WorkflowError::InvalidTransition {
            command: Command::Cancel,
            stage: Stage::Completed
        })
    ));
    assert_eq!(handle.state().stage(), Stage::Completed);
    assert_eq!(
        handle
            .intake()
            .get(ArtifactRole::Identity)
            .unwrap()
            .display_name,
        "passport.png"
    );
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_sees_only_later_events_and_heartbeats() {
    let engine = Arc::new(ScriptedEngine::always(success()));
    let handle = spawn(engine);
    let heartbeat = handle.publisher().spawn_heartbeat(Duration::from_secs(1));

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    let seen = handle
        .wait_for(|s| s.state.progress().is_some_and(|p| p >= 40))
        .await
        .unwrap();
    let seen_progress = seen.state.progress().unwrap();

    let mut late = handle.subscribe();
    let mut progress = Vec::new();
    let mut heartbeats = Vec::new();
    while let Some(event) = late.recv().await {
        match event {
            StatusEvent::StageChanged(change) => match change.state {
                WorkflowState::Processing { progress: p } => progress.push(p),
                WorkflowState::Completed { .. } => break,
                WorkflowState::Intake => panic!("unexpected intake"),
            },
            StatusEvent::HeartBeat { uptime_seconds } => heartbeats.push(uptime_seconds),
        }
    }

    assert!(progress.iter().all(|p| *p > seen_progress));
    assert_eq!(progress.last(), Some(&100));
    assert!(!heartbeats.is_empty());
    assert!(heartbeats.windows(2).all(|w| w[0] < w[1]));

    // Heartbeats continue after the case completes and after reset.
    handle.reset().await.unwrap();
    let next = loop {
        match late.recv().await {
            Some(StatusEvent::HeartBeat { uptime_seconds }) => break uptime_seconds,
            Some(_) => continue,
            None => panic!("publisher closed"),
        }
    };
    assert!(next > *heartbeats.last().unwrap());
    heartbeat.stop().await;
}

#[tokio::test(start_paused = true)]
async fn engine_error_completes_with_synthetic_failure() {
    let engine = Arc::new(ScriptedEngine::failing(EngineError::Backend(
        "model crashed".into(),
    )));
    let handle = spawn(engine);

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    let outcome = wait_completed(&handle).await;

    assert_eq!(outcome.status(), ValidationStatus::Failed);
    assert!(outcome.scores().is_none());
    assert_eq!(outcome.findings().len(), 1);
    assert!(outcome.findings()[0].description.contains("model crashed"));
}

struct PanickingEngine;

#[async_trait]
impl ValidationEngine for PanickingEngine {
    async fn evaluate(&self, _intake: &CaseIntake) -> Result<ValidationOutcome, EngineError> {
        panic!("scoring model blew up")
    }

    fn engine_id(&self) -> &str {
        "panicking"
    }
}

#[tokio::test(start_paused = true)]
async fn engine_panic_completes_and_case_can_reset() {
    let handle = Workflow::new(Arc::new(PanickingEngine)).spawn();

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    let outcome = wait_completed(&handle).await;

    assert_eq!(outcome.status(), ValidationStatus::Failed);
    assert_eq!(outcome.findings().len(), 1);
    assert!(outcome.findings()[0].location.contains("panicking"));

    assert_eq!(handle.reset().await.unwrap(), WorkflowState::Intake);
    assert_eq!(handle.snapshot().case, 2);
    handle.upload(four_documents()).await.unwrap();
    assert!(handle.intake().ready_for_validation());
}

#[tokio::test(start_paused = true)]
async fn engine_timeout_completes_with_synthetic_failure() {
    let engine = Arc::new(ScriptedEngine::always(success()).with_delay(Duration::from_secs(120)));
    let handle = Workflow::new(engine)
        .with_config(WorkflowConfig {
            engine_timeout: Duration::from_secs(5),
            ..WorkflowConfig::default()
        })
        .spawn();

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    let outcome = wait_completed(&handle).await;

    assert_eq!(outcome.status(), ValidationStatus::Failed);
    assert!(outcome.findings()[0].description.contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_evaluation_waits_for_completion() {
    let engine = Arc::new(ScriptedEngine::always(success()).with_delay(Duration::from_secs(3)));
    let handle = spawn(engine.clone());

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    handle
        .wait_for(|s| s.state == WorkflowState::Processing { progress: 100 })
        .await
        .unwrap();

    assert!(matches!(
        handle.cancel().await,
        Err(WorkflowError::InvalidTransition {
            command: Command::Cancel,
            stage: Stage::Completed
        })
    ));
    assert_eq!(handle.state().outcome(), Some(&success()));
    assert_eq!(engine.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn reference_engine_with_fixed_gate_is_deterministic() {
    let engine = Arc::new(ReferenceEngine::seeded(Box::new(FixedGate(false)), 9));
    let handle = Workflow::new(engine).spawn();

    handle.upload(four_documents()).await.unwrap();
    handle.start_processing().await.unwrap();
    let outcome = wait_completed(&handle).await;

    assert_eq!(outcome.status(), ValidationStatus::Failed);
    let roles: Vec<ArtifactRole> = outcome.findings().iter().map(|f| f.role).collect();
    assert_eq!(roles, vec![ArtifactRole::Identity, ArtifactRole::AccountForm]);
}

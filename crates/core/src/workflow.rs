//! The workflow owner task and its handle.
//!
//! One spawned task owns the [`CaseMachine`]. Commands reach it over an
//! mpsc queue and are answered through oneshot replies, so they are handled
//! strictly one at a time. Readers never touch the machine: the owner
//! publishes a [`CaseSnapshot`] through a `watch` channel after every
//! change.
//!
//! While processing, the owner also polls a progress ticker. Cancelling or
//! reaching 100 drops the ticker, so no progress event can follow either.
//! The engine call runs on its own task and the owner awaits it; commands
//! sent meanwhile wait in the queue and see the completed case. A panicking
//! engine completes the case as failed.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::engine::{evaluate_isolated, ValidationEngine};
use crate::error::{Command, WorkflowError};
use crate::intake::{CaseIntake, UploadedArtifact};
use crate::machine::{CaseMachine, DEFAULT_PROGRESS_STEP};
use crate::publisher::{StageChange, StatusEvent, StatusPublisher, StatusSubscription};
use crate::role::classify;
use crate::state::WorkflowState;
use crate::store::{DocumentStore, InMemoryDocumentStore};

// ──────────────────────────────────────────────
// Configuration and data
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Period of the progress ticker.
    pub tick: Duration,
    /// Progress points per tick.
    pub step: u8,
    /// Upper bound on one engine call.
    pub engine_timeout: Duration,
    /// Commands that may queue before senders wait.
    pub command_buffer: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            tick: Duration::from_millis(30),
            step: DEFAULT_PROGRESS_STEP,
            engine_timeout: Duration::from_secs(30),
            command_buffer: 32,
        }
    }
}

/// An artifact as submitted by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingArtifact {
    pub name: String,
    /// Declared size; the content length is used when absent.
    pub size_bytes: Option<u64>,
    pub content: Vec<u8>,
}

impl IncomingArtifact {
    pub fn named(name: impl Into<String>) -> Self {
        IncomingArtifact {
            name: name.into(),
            size_bytes: None,
            content: Vec::new(),
        }
    }

    pub fn with_content(name: impl Into<String>, content: Vec<u8>) -> Self {
        IncomingArtifact {
            name: name.into(),
            size_bytes: None,
            content,
        }
    }
}

/// Result of an upload: what was registered and how many were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub accepted: Vec<UploadedArtifact>,
    pub skipped: usize,
}

/// Read-only view of the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseSnapshot {
    pub case: u64,
    pub state: WorkflowState,
    pub intake: CaseIntake,
}

// ──────────────────────────────────────────────
// Builder
// ──────────────────────────────────────────────

/// Assembles and spawns a workflow.
pub struct Workflow {
    engine: Arc<dyn ValidationEngine>,
    store: Arc<dyn DocumentStore>,
    publisher: StatusPublisher,
    config: WorkflowConfig,
}

impl Workflow {
    /// In-memory store, default publisher and default timing.
    pub fn new(engine: Arc<dyn ValidationEngine>) -> Self {
        Workflow {
            engine,
            store: Arc::new(InMemoryDocumentStore::new()),
            publisher: StatusPublisher::default(),
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_publisher(mut self, publisher: StatusPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Spawn the owner task on the current runtime.
    pub fn spawn(self) -> WorkflowHandle {
        let machine = CaseMachine::new(self.config.step);
        let (tx, rx) = mpsc::channel(self.config.command_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(CaseSnapshot {
            case: machine.case_number(),
            state: machine.state().clone(),
            intake: machine.intake().clone(),
        });

        let owner = Owner {
            machine,
            engine: self.engine,
            store: self.store,
            publisher: self.publisher.clone(),
            config: self.config,
            snapshot_tx,
            ticker: None,
            sequence: 0,
        };
        tokio::spawn(owner.run(rx));

        WorkflowHandle {
            tx,
            snapshot: snapshot_rx,
            publisher: self.publisher,
        }
    }
}

// ──────────────────────────────────────────────
// Handle
// ──────────────────────────────────────────────

type Reply<T> = oneshot::Sender<Result<T, WorkflowError>>;

enum Request {
    Upload(Vec<IncomingArtifact>, Reply<UploadReport>),
    SetRiskThreshold(u8, Reply<()>),
    Start(Reply<WorkflowState>),
    Cancel(Reply<WorkflowState>),
    Reset(Reply<WorkflowState>),
    Shutdown,
}

/// Cloneable front door to a running workflow.
#[derive(Clone)]
pub struct WorkflowHandle {
    tx: mpsc::Sender<Request>,
    snapshot: watch::Receiver<CaseSnapshot>,
    publisher: StatusPublisher,
}

impl WorkflowHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, WorkflowError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| WorkflowError::Closed)?;
        rx.await.map_err(|_| WorkflowError::Closed)?
    }

    /// Classify, store and register artifacts. Unrecognised names are
    /// counted in [`UploadReport::skipped`].
    pub async fn upload(
        &self,
        artifacts: Vec<IncomingArtifact>,
    ) -> Result<UploadReport, WorkflowError> {
        self.request(|reply| Request::Upload(artifacts, reply)).await
    }

    pub async fn set_risk_threshold(&self, value: u8) -> Result<(), WorkflowError> {
        self.request(|reply| Request::SetRiskThreshold(value, reply))
            .await
    }

    pub async fn start_processing(&self) -> Result<WorkflowState, WorkflowError> {
        self.request(Request::Start).await
    }

    pub async fn cancel(&self) -> Result<WorkflowState, WorkflowError> {
        self.request(Request::Cancel).await
    }

    pub async fn reset(&self) -> Result<WorkflowState, WorkflowError> {
        self.request(Request::Reset).await
    }

    pub fn state(&self) -> WorkflowState {
        self.snapshot.borrow().state.clone()
    }

    pub fn intake(&self) -> CaseIntake {
        self.snapshot.borrow().intake.clone()
    }

    pub fn snapshot(&self) -> CaseSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until the snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&CaseSnapshot) -> bool,
    ) -> Result<CaseSnapshot, WorkflowError> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| WorkflowError::Closed)?;
        Ok(snapshot.clone())
    }

    pub fn subscribe(&self) -> StatusSubscription {
        self.publisher.subscribe()
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    /// Stop the owner task and wait for it to exit. Later commands fail
    /// with [`WorkflowError::Closed`].
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Request::Shutdown).await;
        self.tx.closed().await;
    }
}

// ──────────────────────────────────────────────
// Owner task
// ──────────────────────────────────────────────

struct Owner {
    machine: CaseMachine,
    engine: Arc<dyn ValidationEngine>,
    store: Arc<dyn DocumentStore>,
    publisher: StatusPublisher,
    config: WorkflowConfig,
    snapshot_tx: watch::Sender<CaseSnapshot>,
    ticker: Option<Interval>,
    sequence: u64,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl Owner {
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        tracing::info!(
            engine = self.engine.engine_id(),
            tick_ms = self.config.tick.as_millis() as u64,
            "workflow started"
        );
        loop {
            tokio::select! {
                biased;
                request = rx.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle(request).await,
                },
                _ = next_tick(&mut self.ticker) => self.on_tick().await,
            }
        }
        self.ticker = None;
        tracing::info!(case = self.machine.case_number(), "workflow stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Upload(artifacts, reply) => {
                let result = self.upload(artifacts).await;
                let _ = reply.send(result);
            }
            Request::SetRiskThreshold(value, reply) => {
                let result = self.machine.set_risk_threshold(value);
                if result.is_ok() {
                    tracing::debug!(risk_threshold = value, "risk threshold set");
                    self.refresh_snapshot();
                }
                let _ = reply.send(result);
            }
            Request::Start(reply) => {
                let result = self.machine.start_processing().map(|s| s.clone());
                if result.is_ok() {
                    tracing::info!(case = self.machine.case_number(), "processing started");
                    self.start_ticker();
                    self.publish_state();
                }
                let _ = reply.send(result);
            }
            Request::Cancel(reply) => {
                let result = self.machine.cancel().map(|s| s.clone());
                if result.is_ok() {
                    self.ticker = None;
                    tracing::info!(case = self.machine.case_number(), "processing cancelled");
                    self.publish_state();
                }
                let _ = reply.send(result);
            }
            Request::Reset(reply) => {
                let stored: Vec<_> = self
                    .machine
                    .intake()
                    .artifacts()
                    .map(|a| a.id.clone())
                    .collect();
                let result = self.machine.reset().map(|s| s.clone());
                if result.is_ok() {
                    for id in stored {
                        if let Err(err) = self.store.remove(&id).await {
                            tracing::warn!(
                                artifact = %id,
                                error = %err,
                                "failed to discard stored document"
                            );
                        }
                    }
                    tracing::info!(case = self.machine.case_number(), "case reset");
                    self.publish_state();
                }
                let _ = reply.send(result);
            }
            Request::Shutdown => {}
        }
    }

    async fn upload(
        &mut self,
        artifacts: Vec<IncomingArtifact>,
    ) -> Result<UploadReport, WorkflowError> {
        self.machine.ensure_accepts(Command::Upload)?;

        let mut report = UploadReport::default();
        let result = self.register_all(artifacts, &mut report).await;
        // Artifacts registered before a failure stay in the intake.
        self.refresh_snapshot();
        if let Err(err) = &result {
            tracing::warn!(
                accepted = report.accepted.len(),
                skipped = report.skipped,
                error = %err,
                "upload stopped part-way"
            );
        }
        result.map(|()| report)
    }

    async fn register_all(
        &mut self,
        artifacts: Vec<IncomingArtifact>,
        report: &mut UploadReport,
    ) -> Result<(), WorkflowError> {
        for incoming in artifacts {
            let Some(role) = classify(&incoming.name).role() else {
                tracing::debug!(name = %incoming.name, "unrecognised artifact skipped");
                report.skipped += 1;
                continue;
            };

            let size_bytes = incoming
                .size_bytes
                .unwrap_or(incoming.content.len() as u64);
            let id = self.store.put(&incoming.name, incoming.content).await?;
            let artifact = UploadedArtifact {
                id,
                display_name: incoming.name,
                role,
                size_bytes,
                received_at: OffsetDateTime::now_utc(),
            };
            tracing::debug!(
                name = %artifact.display_name,
                role = %role,
                id = %artifact.id,
                "artifact accepted"
            );

            if let Some(replaced) = self.machine.accept_upload(artifact.clone())? {
                if let Err(err) = self.store.remove(&replaced.id).await {
                    tracing::warn!(
                        artifact = %replaced.id,
                        error = %err,
                        "failed to discard replaced document"
                    );
                }
            }
            report.accepted.push(artifact);
        }
        Ok(())
    }

    fn start_ticker(&mut self) {
        let period = self.config.tick;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(interval);
    }

    async fn on_tick(&mut self) {
        let Some(progress) = self.machine.tick() else {
            self.ticker = None;
            return;
        };
        tracing::trace!(progress, "progress");
        self.publish_state();

        if progress == 100 {
            self.ticker = None;
            self.evaluate().await;
        }
    }

    async fn evaluate(&mut self) {
        let Some(snapshot) = self.machine.begin_evaluation() else {
            return;
        };
        tracing::info!(
            case = self.machine.case_number(),
            engine = self.engine.engine_id(),
            "evaluating case"
        );
        let outcome =
            evaluate_isolated(self.engine.clone(), snapshot, self.config.engine_timeout).await;
        tracing::info!(
            case = self.machine.case_number(),
            status = ?outcome.status(),
            findings = outcome.findings().len(),
            "case completed"
        );
        self.machine.complete(outcome);
        self.publish_state();
    }

    fn publish_state(&mut self) {
        self.sequence += 1;
        let change = StageChange::new(
            self.machine.case_number(),
            self.sequence,
            self.machine.state().clone(),
        );
        self.publisher.publish(StatusEvent::StageChanged(change));
        self.refresh_snapshot();
    }

    fn refresh_snapshot(&self) {
        self.snapshot_tx.send_replace(CaseSnapshot {
            case: self.machine.case_number(),
            state: self.machine.state().clone(),
            intake: self.machine.intake().clone(),
        });
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

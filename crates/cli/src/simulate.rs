//! `kycflow simulate` -- run one case in-process and report what happened.

use std::time::Duration;

use kycflow_core::{
    IncomingArtifact, ProcessingPhase, StatusEvent, UploadReport, ValidationOutcome, Workflow,
    WorkflowConfig, WorkflowState,
};
use serde::Serialize;

use crate::config::{EngineKind, EngineSection};

pub(crate) struct SimulateOptions {
    pub(crate) names: Vec<String>,
    pub(crate) engine: EngineKind,
    pub(crate) engine_url: Option<String>,
    pub(crate) tick: Duration,
    pub(crate) seed: Option<u64>,
    pub(crate) risk_threshold: Option<u8>,
}

/// What a simulated case went through.
#[derive(Debug, Serialize)]
pub(crate) struct SimulationReport {
    pub(crate) upload: UploadReport,
    pub(crate) progress_events: usize,
    pub(crate) phases: Vec<ProcessingPhase>,
    pub(crate) outcome: ValidationOutcome,
}

pub(crate) async fn run_simulation(
    options: SimulateOptions,
) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let engine = EngineSection {
        kind: options.engine,
        url: options.engine_url,
        seed: options.seed,
        ..EngineSection::default()
    }
    .build()?;

    let workflow = Workflow::new(engine)
        .with_config(WorkflowConfig {
            tick: options.tick.max(Duration::from_millis(1)),
            ..WorkflowConfig::default()
        })
        .spawn();
    let mut events = workflow.subscribe();

    let artifacts = options
        .names
        .iter()
        .map(|name| IncomingArtifact::named(name.as_str()))
        .collect();
    let upload = workflow.upload(artifacts).await?;
    if let Some(threshold) = options.risk_threshold {
        workflow.set_risk_threshold(threshold).await?;
    }
    workflow.start_processing().await?;

    let mut progress_events = 0;
    let mut phases: Vec<ProcessingPhase> = Vec::new();
    let outcome = loop {
        let Some(event) = events.recv().await else {
            return Err("workflow stopped before the case completed".into());
        };
        let StatusEvent::StageChanged(change) = event else {
            continue;
        };
        if let Some(phase) = change.phase {
            if phases.last() != Some(&phase) {
                phases.push(phase);
            }
        }
        match change.state {
            WorkflowState::Processing { .. } => progress_events += 1,
            WorkflowState::Completed { outcome } => break outcome,
            WorkflowState::Intake => {}
        }
    };

    workflow.shutdown().await;
    Ok(SimulationReport {
        upload,
        progress_events,
        phases,
        outcome,
    })
}

/// Human-readable rendering for `--output text`.
pub(crate) fn render_text(report: &SimulationReport) -> String {
    let mut out = String::new();
    for artifact in &report.upload.accepted {
        out.push_str(&format!(
            "accepted  {} -> {}\n",
            artifact.display_name, artifact.role
        ));
    }
    if report.upload.skipped > 0 {
        out.push_str(&format!("skipped   {} file(s)\n", report.upload.skipped));
    }
    let phases: Vec<&str> = report.phases.iter().map(|p| p.label()).collect();
    out.push_str(&format!(
        "processed {} progress updates ({})\n",
        report.progress_events,
        phases.join(" -> ")
    ));

    let outcome = &report.outcome;
    match outcome.scores() {
        Some(scores) => out.push_str(&format!(
            "outcome   success (confidence {}, risk {}, credit {})\n",
            scores.confidence_score, scores.risk_factor, scores.credit_score
        )),
        None => {
            out.push_str(&format!(
                "outcome   failed ({} finding(s))\n",
                outcome.findings().len()
            ));
            for finding in outcome.findings() {
                out.push_str(&format!(
                    "  - [{}] {} ({})\n",
                    finding.role.label(),
                    finding.description,
                    finding.location
                ));
            }
        }
    }
    out
}

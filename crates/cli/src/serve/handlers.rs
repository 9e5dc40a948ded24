//! Route handlers: descriptors, health, case commands.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use kycflow_core::IncomingArtifact;
use serde::Deserialize;

use super::state::AppState;
use super::{json_error, workflow_error, API_V1};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not_found", "not found")
}

/// GET /
pub(crate) async fn handle_root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "message": format!("Welcome to {} API", state.project.name),
        "versions": {
            "v1": {
                "url": API_V1,
                "docs": format!("{}/docs", API_V1),
            }
        }
    });
    (StatusCode::OK, Json(response))
}

/// GET /api/v1
pub(crate) async fn handle_api_root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "message": format!("{} API v1", state.project.name),
    });
    (StatusCode::OK, Json(response))
}

/// GET /api/v1/health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "message": format!("{} is running", state.project.name),
        "version": kycflow_core::VERSION,
        "status": "healthy",
        "docs_url": format!("{}/docs", API_V1),
        "project_info": {
            "name": state.project.name,
            "description": state.project.description,
            "environment": state.project.environment,
        },
    });
    (StatusCode::OK, Json(response))
}

/// GET /api/v1/case
pub(crate) async fn handle_get_case(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.workflow.snapshot()))
}

// ──────────────────────────────────────────────
// Commands
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct UploadRequest {
    artifacts: Vec<ArtifactDescriptor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtifactDescriptor {
    name: String,
    #[serde(default)]
    size_bytes: Option<u64>,
    #[serde(default)]
    content_base64: Option<String>,
}

impl ArtifactDescriptor {
    fn into_incoming(self) -> Result<IncomingArtifact, String> {
        let content = match self.content_base64 {
            Some(encoded) => BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| format!("artifact '{}': invalid base64 content: {}", self.name, e))?,
            None => Vec::new(),
        };
        Ok(IncomingArtifact {
            name: self.name,
            size_bytes: self.size_bytes,
            content,
        })
    }
}

fn bad_json(rejection: JsonRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, "bad_request", &rejection.body_text())
}

/// POST /api/v1/case/artifacts
pub(crate) async fn handle_upload(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_json(rejection),
    };

    let mut artifacts = Vec::with_capacity(request.artifacts.len());
    for descriptor in request.artifacts {
        match descriptor.into_incoming() {
            Ok(artifact) => artifacts.push(artifact),
            Err(message) => return json_error(StatusCode::BAD_REQUEST, "bad_request", &message),
        }
    }

    match state.workflow.upload(artifacts).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => workflow_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RiskThresholdRequest {
    risk_threshold: u8,
}

/// PUT /api/v1/case/risk-threshold
pub(crate) async fn handle_set_risk_threshold(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RiskThresholdRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_json(rejection),
    };
    match state.workflow.set_risk_threshold(request.risk_threshold).await {
        Ok(()) => (StatusCode::OK, Json(state.workflow.snapshot())).into_response(),
        Err(e) => workflow_error(e),
    }
}

/// POST /api/v1/case/start
pub(crate) async fn handle_start(State(state): State<Arc<AppState>>) -> Response {
    match state.workflow.start_processing().await {
        Ok(s) => (StatusCode::OK, Json(serde_json::json!({ "state": s }))).into_response(),
        Err(e) => workflow_error(e),
    }
}

/// POST /api/v1/case/cancel
pub(crate) async fn handle_cancel(State(state): State<Arc<AppState>>) -> Response {
    match state.workflow.cancel().await {
        Ok(s) => (StatusCode::OK, Json(serde_json::json!({ "state": s }))).into_response(),
        Err(e) => workflow_error(e),
    }
}

/// POST /api/v1/case/reset
pub(crate) async fn handle_reset(State(state): State<Arc<AppState>>) -> Response {
    match state.workflow.reset().await {
        Ok(s) => (StatusCode::OK, Json(serde_json::json!({ "state": s }))).into_response(),
        Err(e) => workflow_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_decodes_base64() {
        let descriptor: ArtifactDescriptor = serde_json::from_value(serde_json::json!({
            "name": "notes.txt",
            "content_base64": "aGVsbG8="
        }))
        .unwrap();
        let incoming = descriptor.into_incoming().unwrap();
        assert_eq!(incoming.content, b"hello");
        assert_eq!(incoming.size_bytes, None);
    }

    #[test]
    fn descriptor_rejects_bad_base64() {
        let descriptor = ArtifactDescriptor {
            name: "scan.png".into(),
            size_bytes: Some(10),
            content_base64: Some("***".into()),
        };
        let err = descriptor.into_incoming().unwrap_err();
        assert!(err.contains("scan.png"));
    }
}

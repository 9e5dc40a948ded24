//! `kycflow serve` -- HTTP API for the verification workflow.
//!
//! One workflow instance (one case) per process, driven over JSON
//! commands, with progress streamed as server-sent events.
//!
//! Security features:
//! - CORS headers on all responses (permissive)
//! - Per-IP rate limiting (default: 600 req/min, configurable)
//! - Optional API key authentication via `KYCFLOW_API_KEY`
//!
//! Endpoints:
//! - GET  /                            - Service descriptor (exempt from auth)
//! - GET  /api/v1                      - API version descriptor
//! - GET  /api/v1/health               - Service status (exempt from auth)
//! - GET  /api/v1/uptime/stream        - SSE: uptime heartbeats
//! - GET  /api/v1/case                 - Current state and intake
//! - POST /api/v1/case/artifacts       - Upload artifacts
//! - PUT  /api/v1/case/risk-threshold  - Set the case risk threshold
//! - POST /api/v1/case/start           - Start processing
//! - POST /api/v1/case/cancel          - Cancel processing
//! - POST /api/v1/case/reset           - Reset a completed case
//! - GET  /api/v1/case/stream          - SSE: stage changes and heartbeats
//!
//! All non-stream responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;
mod stream;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{middleware as axum_middleware, Json, Router};
use kycflow_core::{StatusPublisher, Workflow, WorkflowError};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;

use self::handlers::{
    handle_api_root, handle_cancel, handle_get_case, handle_health, handle_not_found,
    handle_reset, handle_root, handle_set_risk_threshold, handle_start, handle_upload,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};
use self::stream::{handle_case_stream, handle_uptime_stream};

/// Maximum request body size: 25 MB (artifact content travels base64-encoded).
const MAX_BODY_SIZE: usize = 25 * 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Path prefix of the versioned API.
pub(crate) const API_V1: &str = "/api/v1";

/// Construct a JSON error response: `{"error": message, "code": code}`.
fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({"error": message, "code": code})),
    )
        .into_response()
}

/// Map a workflow error to its HTTP status.
fn workflow_error(err: WorkflowError) -> Response {
    let status = match &err {
        WorkflowError::NotReady { .. } | WorkflowError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        WorkflowError::InvalidThreshold(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WorkflowError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    };
    json_error(status, err.code(), &err.to_string())
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route(API_V1, get(handle_api_root))
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/uptime/stream", get(handle_uptime_stream))
        .route("/api/v1/case", get(handle_get_case))
        .route("/api/v1/case/artifacts", post(handle_upload))
        .route("/api/v1/case/risk-threshold", put(handle_set_risk_threshold))
        .route("/api/v1/case/start", post(handle_start))
        .route("/api/v1/case/cancel", post(handle_cancel))
        .route("/api/v1/case/reset", post(handle_reset))
        .route("/api/v1/case/stream", get(handle_case_stream))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the workflow and serve it until Ctrl+C.
pub async fn start_server(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = config.engine.build()?;
    let publisher = StatusPublisher::new(config.workflow.event_buffer);
    let heartbeat = publisher.spawn_heartbeat(config.workflow.heartbeat_period());
    let workflow = Workflow::new(engine)
        .with_config(config.workflow.workflow_config())
        .with_publisher(publisher)
        .spawn();

    let api_key = config.server.api_key.clone().filter(|k| !k.is_empty());
    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    tracing::info!(
        rate_limit = config.server.rate_limit,
        engine = ?config.engine.kind,
        tick_ms = config.workflow.tick_ms,
        "workflow configured"
    );

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        workflow: workflow.clone(),
        project: config.project.clone(),
        rate_limiter: RateLimiter::new(config.server.rate_limit),
        api_key,
        shutdown: shutdown.clone(),
    });
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("kycflow listening on http://{}", addr);
    eprintln!("kycflow listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    workflow.shutdown().await;
    heartbeat.stop().await;
    eprintln!("\nServer shut down.");
    Ok(())
}

/// Wait for Ctrl+C, then end open event streams.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    eprintln!("\nReceived shutdown signal...");
    shutdown.cancel();
}

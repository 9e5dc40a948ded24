//! HTTP middleware: rate limiting and API key authentication.

use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::state::AppState;

/// Paths reachable without credentials (load balancer checks, discovery).
const AUTH_EXEMPT: &[&str] = &["/", "/api/v1/health"];

pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match state.rate_limiter.check(addr.ip()).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::debug!(client = %addr.ip(), "rate limited");
            let body = serde_json::json!({
                "error": "rate limit exceeded",
                "code": "rate_limited",
                "retry_after": retry_after,
            });
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
    }
}

/// API key authentication middleware.
///
/// With a key configured, every request outside [`AUTH_EXEMPT`] must send
/// `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected_key = match &state.api_key {
        Some(k) => k,
        None => return next.run(request).await,
    };

    if AUTH_EXEMPT.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    let matches = bearer.or(header_key).map(|key| key == expected_key);

    match matches {
        Some(true) => next.run(request).await,
        Some(false) => super::json_error(StatusCode::FORBIDDEN, "forbidden", "invalid API key"),
        None => super::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "authentication required",
        ),
    }
}

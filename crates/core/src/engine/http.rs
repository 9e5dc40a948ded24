//! Remote scoring backend over HTTP.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking`. The intake
//! is posted as `{"case": <CaseIntake>}` and the response body must be a
//! [`ValidationOutcome`] in its flat wire form.

use async_trait::async_trait;

use super::{EngineError, ValidationEngine};
use crate::intake::CaseIntake;
use crate::outcome::ValidationOutcome;

/// Engine that delegates scoring to a remote service.
pub struct HttpScoringEngine {
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpScoringEngine {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpScoringEngine {
            endpoint: endpoint.into(),
            auth_token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The JSON document posted to the backend.
    pub fn request_body(intake: &CaseIntake) -> Result<serde_json::Value, EngineError> {
        let case = serde_json::to_value(intake)
            .map_err(|e| EngineError::InvalidResponse(format!("cannot encode intake: {}", e)))?;
        Ok(serde_json::json!({ "case": case }))
    }

    /// Validate a backend response body.
    pub fn parse_response(value: serde_json::Value) -> Result<ValidationOutcome, EngineError> {
        serde_json::from_value(value).map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }
}

fn map_transport_error(err: ureq::Error) -> EngineError {
    match err {
        ureq::Error::StatusCode(code) => {
            EngineError::Backend(format!("backend responded with HTTP {}", code))
        }
        other => EngineError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ValidationEngine for HttpScoringEngine {
    async fn evaluate(&self, intake: &CaseIntake) -> Result<ValidationOutcome, EngineError> {
        let body = Self::request_body(intake)?;
        let url = self.endpoint.clone();
        let auth_token = self.auth_token.clone();

        let value = tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            let mut request = agent
                .post(&url)
                .header("content-type", "application/json");

            if let Some(ref token) = auth_token {
                request = request.header("Authorization", &format!("Bearer {}", token));
            }

            let response = request.send_json(body).map_err(map_transport_error)?;
            response
                .into_body()
                .read_json::<serde_json::Value>()
                .map_err(|e| {
                    EngineError::InvalidResponse(format!("response is not JSON: {}", e))
                })
        })
        .await
        .map_err(|e| EngineError::Unavailable(format!("task join error: {}", e)))??;

        Self::parse_response(value)
    }

    fn engine_id(&self) -> &str {
        "http"
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::tests::full_registry;
    use serde_json::json;

    #[test]
    fn request_body_wraps_intake() {
        let intake = full_registry().snapshot();
        let body = HttpScoringEngine::request_body(&intake).unwrap();
        assert_eq!(body["case"]["risk_threshold"], 50);
        assert_eq!(
            body["case"]["artifacts"]["account_form"]["display_name"],
            "account.pdf"
        );
        assert_eq!(body["case"]["artifacts"].as_object().unwrap().len(), 4);
    }

    #[test]
    fn parse_success_response() {
        let outcome = HttpScoringEngine::parse_response(json!({
            "status": "success",
            "confidence_score": 91,
            "risk_factor": 12,
            "credit_score": 8
        }))
        .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.credit_score(), Some(8));
    }

    #[test]
    fn parse_rejects_inconsistent_response() {
        let err = HttpScoringEngine::parse_response(json!({
            "status": "failed",
            "findings": []
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let engine = HttpScoringEngine::new("http://127.0.0.1:1/score").with_auth_token("t");
        let err = engine
            .evaluate(&full_registry().snapshot())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)), "{:?}", err);
    }
}

//! Validation outcomes and findings.
//!
//! A [`ValidationOutcome`] can only be built through its constructors
//! ([`ValidationOutcome::success`], [`ValidationOutcome::failed`],
//! [`ValidationOutcome::failed_with`]), so the shape invariant always holds:
//! scores are present iff the status is `Success`, findings are non-empty
//! iff the status is `Failed`. Deserialised outcomes (e.g. from a remote
//! scoring backend) go through the same checks.

use serde::{Deserialize, Serialize};

use crate::role::ArtifactRole;

/// A detected validation problem, tied to the document it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub role: ArtifactRole,
    pub description: String,
    pub location: String,
}

impl Finding {
    pub fn new(role: ArtifactRole, description: impl Into<String>, location: impl Into<String>) -> Self {
        Finding {
            role,
            description: description.into(),
            location: location.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Success,
    Failed,
}

/// Scores attached to a successful outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scores {
    /// 0–100.
    pub confidence_score: u8,
    /// 0–100.
    pub risk_factor: u8,
    /// 0–10.
    pub credit_score: u8,
}

/// Violations of the outcome shape or score ranges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutcomeError {
    #[error("{field} out of range: {value} (max {max})")]
    ScoreOutOfRange {
        field: &'static str,
        value: u8,
        max: u8,
    },
    #[error("failed outcome must carry at least one finding")]
    MissingFindings,
    #[error("successful outcome must carry {0}")]
    MissingScore(&'static str),
    #[error("failed outcome must not carry scores")]
    UnexpectedScores,
    #[error("successful outcome must not carry findings")]
    UnexpectedFindings,
}

// ──────────────────────────────────────────────
// ValidationOutcome
// ──────────────────────────────────────────────

/// Scored result of validating a complete intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOutcome", into = "RawOutcome")]
pub struct ValidationOutcome {
    status: ValidationStatus,
    scores: Option<Scores>,
    findings: Vec<Finding>,
}

impl ValidationOutcome {
    /// A successful outcome with range-checked scores.
    pub fn success(scores: Scores) -> Result<Self, OutcomeError> {
        check_range("confidence_score", scores.confidence_score, 100)?;
        check_range("risk_factor", scores.risk_factor, 100)?;
        check_range("credit_score", scores.credit_score, 10)?;
        Ok(ValidationOutcome {
            status: ValidationStatus::Success,
            scores: Some(scores),
            findings: Vec::new(),
        })
    }

    /// A failed outcome. `findings` must not be empty.
    pub fn failed(findings: Vec<Finding>) -> Result<Self, OutcomeError> {
        if findings.is_empty() {
            return Err(OutcomeError::MissingFindings);
        }
        Ok(ValidationOutcome {
            status: ValidationStatus::Failed,
            scores: None,
            findings,
        })
    }

    /// A failed outcome with a single finding. Infallible.
    pub fn failed_with(finding: Finding) -> Self {
        ValidationOutcome {
            status: ValidationStatus::Failed,
            scores: None,
            findings: vec![finding],
        }
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ValidationStatus::Success
    }

    pub fn scores(&self) -> Option<&Scores> {
        self.scores.as_ref()
    }

    pub fn confidence_score(&self) -> Option<u8> {
        self.scores.map(|s| s.confidence_score)
    }

    pub fn risk_factor(&self) -> Option<u8> {
        self.scores.map(|s| s.risk_factor)
    }

    pub fn credit_score(&self) -> Option<u8> {
        self.scores.map(|s| s.credit_score)
    }

    /// Findings in detection order. Empty unless failed.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }
}

fn check_range(field: &'static str, value: u8, max: u8) -> Result<(), OutcomeError> {
    if value > max {
        return Err(OutcomeError::ScoreOutOfRange { field, value, max });
    }
    Ok(())
}

/// Flat wire form: `{status, confidence_score?, risk_factor?, credit_score?, findings}`.
#[derive(Serialize, Deserialize)]
struct RawOutcome {
    status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    risk_factor: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credit_score: Option<u8>,
    #[serde(default)]
    findings: Vec<Finding>,
}

impl TryFrom<RawOutcome> for ValidationOutcome {
    type Error = OutcomeError;

    fn try_from(raw: RawOutcome) -> Result<Self, Self::Error> {
        match raw.status {
            ValidationStatus::Success => {
                if !raw.findings.is_empty() {
                    return Err(OutcomeError::UnexpectedFindings);
                }
                let scores = Scores {
                    confidence_score: raw
                        .confidence_score
                        .ok_or(OutcomeError::MissingScore("confidence_score"))?,
                    risk_factor: raw
                        .risk_factor
                        .ok_or(OutcomeError::MissingScore("risk_factor"))?,
                    credit_score: raw
                        .credit_score
                        .ok_or(OutcomeError::MissingScore("credit_score"))?,
                };
                ValidationOutcome::success(scores)
            }
            ValidationStatus::Failed => {
                if raw.confidence_score.is_some()
                    || raw.risk_factor.is_some()
                    || raw.credit_score.is_some()
                {
                    return Err(OutcomeError::UnexpectedScores);
                }
                ValidationOutcome::failed(raw.findings)
            }
        }
    }
}

impl From<ValidationOutcome> for RawOutcome {
    fn from(outcome: ValidationOutcome) -> Self {
        RawOutcome {
            status: outcome.status,
            confidence_score: outcome.scores.map(|s| s.confidence_score),
            risk_factor: outcome.scores.map(|s| s.risk_factor),
            credit_score: outcome.scores.map(|s| s.credit_score),
            findings: outcome.findings,
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scores(confidence: u8, risk: u8, credit: u8) -> Scores {
        Scores {
            confidence_score: confidence,
            risk_factor: risk,
            credit_score: credit,
        }
    }

    #[test]
    fn success_carries_scores_and_no_findings() {
        let outcome = ValidationOutcome::success(scores(85, 20, 8)).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.confidence_score(), Some(85));
        assert_eq!(outcome.risk_factor(), Some(20));
        assert_eq!(outcome.credit_score(), Some(8));
        assert!(outcome.findings().is_empty());
    }

    #[test]
    fn failed_carries_findings_and_no_scores() {
        let outcome = ValidationOutcome::failed(vec![Finding::new(
            ArtifactRole::Identity,
            "missing field",
            "page 1",
        )])
        .unwrap();
        assert_eq!(outcome.status(), ValidationStatus::Failed);
        assert!(outcome.scores().is_none());
        assert_eq!(outcome.findings().len(), 1);
    }

    #[test]
    fn failed_without_findings_rejected() {
        assert_eq!(
            ValidationOutcome::failed(vec![]),
            Err(OutcomeError::MissingFindings)
        );
    }

    #[test]
    fn score_ranges_enforced() {
        assert!(matches!(
            ValidationOutcome::success(scores(101, 0, 0)),
            Err(OutcomeError::ScoreOutOfRange { field: "confidence_score", .. })
        ));
        assert!(matches!(
            ValidationOutcome::success(scores(50, 101, 0)),
            Err(OutcomeError::ScoreOutOfRange { field: "risk_factor", .. })
        ));
        assert!(matches!(
            ValidationOutcome::success(scores(50, 50, 11)),
            Err(OutcomeError::ScoreOutOfRange { field: "credit_score", .. })
        ));
        assert!(ValidationOutcome::success(scores(100, 100, 10)).is_ok());
    }

    #[test]
    fn success_wire_shape() {
        let outcome = ValidationOutcome::success(scores(90, 15, 7)).unwrap();
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "success",
                "confidence_score": 90,
                "risk_factor": 15,
                "credit_score": 7,
                "findings": [],
            })
        );
    }

    #[test]
    fn failed_wire_shape_omits_scores() {
        let outcome = ValidationOutcome::failed(vec![Finding::new(
            ArtifactRole::AccountForm,
            "Missing specimen signature",
            "Page 1, Bottom section",
        )])
        .unwrap();
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "failed");
        assert!(value.get("confidence_score").is_none());
        assert_eq!(value["findings"][0]["role"], "account_form");
    }

    #[test]
    fn deserialize_rejects_broken_invariants() {
        let bad = [
            json!({"status": "success", "confidence_score": 90, "risk_factor": 10}),
            json!({"status": "success", "confidence_score": 90, "risk_factor": 10, "credit_score": 8,
                   "findings": [{"role": "identity", "description": "x", "location": "y"}]}),
            json!({"status": "failed", "findings": []}),
            json!({"status": "failed", "confidence_score": 30,
                   "findings": [{"role": "identity", "description": "x", "location": "y"}]}),
            json!({"status": "success", "confidence_score": 90, "risk_factor": 10, "credit_score": 12}),
        ];
        for value in bad {
            assert!(
                serde_json::from_value::<ValidationOutcome>(value.clone()).is_err(),
                "accepted {}",
                value
            );
        }
    }

    #[test]
    fn deserialize_accepts_valid_failure() {
        let value = json!({
            "status": "failed",
            "findings": [{"role": "identity", "description": "x", "location": "y"}]
        });
        let outcome: ValidationOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(outcome.findings()[0].role, ArtifactRole::Identity);
    }
}

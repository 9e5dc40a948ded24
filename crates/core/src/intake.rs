//! Case intake: the uploaded artifacts of one case, keyed by role.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

use crate::role::ArtifactRole;

/// Risk threshold used when the client has not chosen one.
pub const DEFAULT_RISK_THRESHOLD: u8 = 50;

/// Opaque identifier assigned by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(id: impl Into<String>) -> Self {
        ArtifactId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A classified, stored artifact. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedArtifact {
    pub id: ArtifactId,
    pub display_name: String,
    pub role: ArtifactRole,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

// ──────────────────────────────────────────────
// CaseIntake
// ──────────────────────────────────────────────

/// The artifacts of one case: at most one per role, plus the
/// client-chosen risk threshold handed to the scoring backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseIntake {
    artifacts: BTreeMap<ArtifactRole, UploadedArtifact>,
    risk_threshold: u8,
}

impl Default for CaseIntake {
    fn default() -> Self {
        CaseIntake {
            artifacts: BTreeMap::new(),
            risk_threshold: DEFAULT_RISK_THRESHOLD,
        }
    }
}

impl CaseIntake {
    /// True iff every role has an artifact.
    pub fn ready_for_validation(&self) -> bool {
        ArtifactRole::ALL
            .iter()
            .all(|role| self.artifacts.contains_key(role))
    }

    /// Roles still lacking an artifact, in canonical order.
    pub fn missing_roles(&self) -> Vec<ArtifactRole> {
        ArtifactRole::ALL
            .iter()
            .copied()
            .filter(|role| !self.artifacts.contains_key(role))
            .collect()
    }

    pub fn get(&self, role: ArtifactRole) -> Option<&UploadedArtifact> {
        self.artifacts.get(&role)
    }

    /// Artifacts in canonical role order.
    pub fn artifacts(&self) -> impl Iterator<Item = &UploadedArtifact> {
        self.artifacts.values()
    }

    pub fn risk_threshold(&self) -> u8 {
        self.risk_threshold
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

// ──────────────────────────────────────────────
// IntakeRegistry
// ──────────────────────────────────────────────

/// Owns the intake of the current case. Only the workflow mutates it.
#[derive(Debug, Default)]
pub struct IntakeRegistry {
    intake: CaseIntake,
}

impl IntakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the artifact for `artifact.role`.
    ///
    /// Returns the artifact it replaced, if any.
    pub fn add_artifact(&mut self, artifact: UploadedArtifact) -> Option<UploadedArtifact> {
        self.intake.artifacts.insert(artifact.role, artifact)
    }

    pub fn ready_for_validation(&self) -> bool {
        self.intake.ready_for_validation()
    }

    /// Owned copy handed to the validation engine.
    pub fn snapshot(&self) -> CaseIntake {
        self.intake.clone()
    }

    /// Borrowed view for callers that only need to read.
    pub fn intake(&self) -> &CaseIntake {
        &self.intake
    }

    /// Set the risk threshold. Values above 100 are rejected and returned.
    pub fn set_risk_threshold(&mut self, value: u8) -> Result<(), u8> {
        if value > 100 {
            return Err(value);
        }
        self.intake.risk_threshold = value;
        Ok(())
    }

    /// Drop every artifact and restore the default threshold.
    pub fn clear(&mut self) {
        self.intake = CaseIntake::default();
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn artifact(role: ArtifactRole, name: &str) -> UploadedArtifact {
        UploadedArtifact {
            id: ArtifactId::new(format!("doc-{}", name)),
            display_name: name.to_string(),
            role,
            size_bytes: 1024,
            received_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    pub(crate) fn full_registry() -> IntakeRegistry {
        let mut registry = IntakeRegistry::new();
        registry.add_artifact(artifact(ArtifactRole::Identity, "passport.png"));
        registry.add_artifact(artifact(ArtifactRole::Profile, "profile.docx"));
        registry.add_artifact(artifact(ArtifactRole::AccountForm, "account.pdf"));
        registry.add_artifact(artifact(ArtifactRole::Description, "description.txt"));
        registry
    }

    #[test]
    fn empty_registry_is_not_ready() {
        let registry = IntakeRegistry::new();
        assert!(!registry.ready_for_validation());
        assert_eq!(registry.intake().missing_roles(), ArtifactRole::ALL.to_vec());
    }

    #[test]
    fn ready_iff_all_four_roles() {
        let mut registry = IntakeRegistry::new();
        for (i, role) in ArtifactRole::ALL.iter().enumerate() {
            assert!(!registry.ready_for_validation());
            registry.add_artifact(artifact(*role, &format!("file{}", i)));
        }
        assert!(registry.ready_for_validation());
        assert!(registry.intake().missing_roles().is_empty());
    }

    #[test]
    fn repeated_role_does_not_make_ready() {
        let mut registry = IntakeRegistry::new();
        registry.add_artifact(artifact(ArtifactRole::Identity, "a.png"));
        registry.add_artifact(artifact(ArtifactRole::Identity, "b.png"));
        registry.add_artifact(artifact(ArtifactRole::Identity, "c.png"));
        registry.add_artifact(artifact(ArtifactRole::Profile, "d.doc"));
        assert_eq!(registry.intake().len(), 2);
        assert!(!registry.ready_for_validation());
    }

    #[test]
    fn last_write_wins_per_role() {
        let mut registry = IntakeRegistry::new();
        assert!(registry
            .add_artifact(artifact(ArtifactRole::Profile, "old.docx"))
            .is_none());
        let replaced = registry
            .add_artifact(artifact(ArtifactRole::Profile, "new.docx"))
            .expect("replaced");
        assert_eq!(replaced.display_name, "old.docx");
        assert_eq!(
            registry
                .intake()
                .get(ArtifactRole::Profile)
                .map(|a| a.display_name.as_str()),
            Some("new.docx")
        );
    }

    #[test]
    fn snapshot_is_detached_from_registry() {
        let mut registry = full_registry();
        let snapshot = registry.snapshot();
        registry.clear();
        assert!(snapshot.ready_for_validation());
        assert!(registry.intake().is_empty());
    }

    #[test]
    fn clear_restores_default_threshold() {
        let mut registry = full_registry();
        registry.set_risk_threshold(80).unwrap();
        assert_eq!(registry.intake().risk_threshold(), 80);
        registry.clear();
        assert_eq!(registry.intake().risk_threshold(), DEFAULT_RISK_THRESHOLD);
        assert!(!registry.ready_for_validation());
    }

    #[test]
    fn threshold_above_100_rejected() {
        let mut registry = IntakeRegistry::new();
        assert_eq!(registry.set_risk_threshold(101), Err(101));
        assert_eq!(registry.intake().risk_threshold(), DEFAULT_RISK_THRESHOLD);
        assert!(registry.set_risk_threshold(100).is_ok());
    }

    #[test]
    fn uploaded_artifact_serializes_rfc3339() {
        let a = artifact(ArtifactRole::Identity, "passport.png");
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["role"], "identity");
        assert_eq!(json["received_at"], "1970-01-01T00:00:00Z");
        assert_eq!(json["id"], "doc-passport.png");
    }
}

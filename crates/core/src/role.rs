//! Artifact roles and the file classifier.
//!
//! Every case needs exactly one artifact per [`ArtifactRole`]. The role of
//! an uploaded file is decided by [`classify`], a pure function of the
//! file's declared extension. Files that match no role are skipped by the
//! caller and only reported as a count.

use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// ArtifactRole
// ──────────────────────────────────────────────

/// The fixed, closed set of documents a case requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    /// Passport or other identity document (image scan).
    Identity,
    /// Client profile (word-processor document).
    Profile,
    /// Account opening form (PDF).
    AccountForm,
    /// Free-text client description.
    Description,
}

impl ArtifactRole {
    /// All roles in canonical order.
    pub const ALL: [ArtifactRole; 4] = [
        ArtifactRole::Identity,
        ArtifactRole::Profile,
        ArtifactRole::AccountForm,
        ArtifactRole::Description,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRole::Identity => "identity",
            ArtifactRole::Profile => "profile",
            ArtifactRole::AccountForm => "account_form",
            ArtifactRole::Description => "description",
        }
    }

    /// Human-readable document label.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactRole::Identity => "Passport",
            ArtifactRole::Profile => "Client Profile",
            ArtifactRole::AccountForm => "Account Opening Form",
            ArtifactRole::Description => "Client Description",
        }
    }

    /// Short label of the expected file format.
    pub fn format_label(&self) -> &'static str {
        match self {
            ArtifactRole::Identity => "PNG",
            ArtifactRole::Profile => "DOCX",
            ArtifactRole::AccountForm => "PDF",
            ArtifactRole::Description => "TXT",
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Classification
// ──────────────────────────────────────────────

/// Result of classifying a single artifact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Recognized(ArtifactRole),
    Unrecognized,
}

impl Classification {
    /// The recognised role, if any.
    pub fn role(&self) -> Option<ArtifactRole> {
        match self {
            Classification::Recognized(role) => Some(*role),
            Classification::Unrecognized => None,
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];
const WORD_EXTENSIONS: &[&str] = &["doc", "docx", "odt", "rtf"];
const PDF_EXTENSIONS: &[&str] = &["pdf"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "text"];

/// Map an artifact name to its role by extension.
///
/// Matching is case-insensitive on the text after the last `.`. Names
/// without an extension, or whose only dot is the first character
/// (`.png`), are unrecognised.
pub fn classify(artifact_name: &str) -> Classification {
    let name = artifact_name.trim();
    let extension = match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name[idx + 1..].to_ascii_lowercase(),
        _ => return Classification::Unrecognized,
    };

    let families: [(&[&str], ArtifactRole); 4] = [
        (IMAGE_EXTENSIONS, ArtifactRole::Identity),
        (WORD_EXTENSIONS, ArtifactRole::Profile),
        (PDF_EXTENSIONS, ArtifactRole::AccountForm),
        (TEXT_EXTENSIONS, ArtifactRole::Description),
    ];

    families
        .iter()
        .find(|(exts, _)| exts.contains(&extension.as_str()))
        .map(|(_, role)| Classification::Recognized(*role))
        .unwrap_or(Classification::Unrecognized)
}

/// Classify a batch of names.
///
/// Returns the recognised `(name, role)` pairs in input order and the
/// number of names that were skipped.
pub fn classify_all<'a, I>(names: I) -> (Vec<(&'a str, ArtifactRole)>, usize)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut recognized = Vec::new();
    let mut skipped = 0;
    for name in names {
        match classify(name) {
            Classification::Recognized(role) => recognized.push((name, role)),
            Classification::Unrecognized => skipped += 1,
        }
    }
    (recognized, skipped)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

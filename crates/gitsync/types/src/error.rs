//! Manifest errors
//!
//! Both variants are structural: they are raised before any resolver runs,
//! so no write can follow them.

use crate::kind::EntityKind;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors describing a manifest that cannot be reconciled at all.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be parsed into typed declarations.
    #[error("failed to parse manifest {path}: {message}")]
    Parse { path: String, message: String },

    /// The declarations parsed but are inconsistent with each other.
    #[error("manifest has {} structural issue(s): {}", .0.len(), summarize(.0))]
    Structural(Vec<StructuralIssue>),
}

/// One structural problem found in a parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralIssue {
    pub kind: EntityKind,
    pub id: Option<Uuid>,
    pub message: String,
}

impl StructuralIssue {
    pub fn new(kind: EntityKind, id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            message: message.into(),
        }
    }
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {}: {}", self.kind, id, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

fn summarize(issues: &[StructuralIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_error_lists_issues() {
        let err = ManifestError::Structural(vec![
            StructuralIssue::new(EntityKind::Role, None, "name must not be empty"),
            StructuralIssue::new(EntityKind::Organization, Some(Uuid::nil()), "duplicate id"),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("manifest has 2 structural issue(s)"));
        assert!(text.contains("Role: name must not be empty"));
        assert!(text.contains("duplicate id"));
    }
}

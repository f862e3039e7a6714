//! Workspace identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the workspace a reconciliation pass runs against.
///
/// One pass per workspace may run at a time; passes for different
/// workspaces are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new("default")
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workspace:{}", self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_id_display() {
        let id = WorkspaceId::new("acme");
        assert_eq!(id.to_string(), "workspace:acme");
        assert_eq!(id.as_str(), "acme");
    }

    #[test]
    fn test_workspace_id_serializes_transparently() {
        let id = WorkspaceId::new("acme");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"acme\"");
    }
}

//! Engine errors and warnings

use crate::content::ContentError;
use gitsync_lock::{LockError, LockHolder};
use gitsync_store::StorageError;
use gitsync_types::{EntityKind, ManifestError, WorkspaceId};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The manifest was rejected before any resolver ran.
    #[error(transparent)]
    Structural(#[from] ManifestError),

    /// A planning read failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The store rejected a write; the whole pass was rolled back.
    #[error("operation #{index} ({operation}) was rejected: {source}")]
    Constraint {
        index: usize,
        operation: String,
        #[source]
        source: StorageError,
    },

    #[error("a sync is already in progress for {workspace}, held by {holder}")]
    SyncInProgress {
        workspace: WorkspaceId,
        holder: LockHolder,
    },

    #[error("sync lock error: {0}")]
    Lock(#[from] LockError),

    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Non-fatal findings surfaced by both validate and commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum SyncWarning {
    /// A subscription points at a workflow that is neither declared nor stored.
    DanglingSubscription {
        subscription_id: Uuid,
        event_source: String,
        workflow_id: Uuid,
    },
    /// A form or agent body could not be found.
    MissingContent {
        kind: EntityKind,
        id: Uuid,
        path: String,
    },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::DanglingSubscription {
                subscription_id,
                event_source,
                workflow_id,
            } => write!(
                f,
                "skipped subscription {subscription_id} on '{event_source}': workflow {workflow_id} does not exist"
            ),
            SyncWarning::MissingContent { kind, id, path } => {
                write!(f, "{kind} {id}: content '{path}' not found, skipped indexing")
            }
        }
    }
}

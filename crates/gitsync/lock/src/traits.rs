use crate::{LockError, LockResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitsync_types::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Proof of a held lease. Only the matching token can release it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    pub workspace: WorkspaceId,
    pub token: Uuid,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

/// Who holds a lease another caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (since {}, expires {})",
            self.owner,
            self.acquired_at.to_rfc3339(),
            self.expires_at.to_rfc3339()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Acquired(LockToken),
    Busy(LockHolder),
}

/// Per-workspace mutual exclusion for reconciliation passes.
#[async_trait]
pub trait SyncLock: Send + Sync {
    /// Takes the lease unless a live one is held. Expired leases are taken over.
    async fn acquire(
        &self,
        workspace: &WorkspaceId,
        owner: &str,
        ttl: Duration,
    ) -> LockResult<Acquisition>;

    /// Returns whether the token still held the lease.
    async fn release(&self, token: &LockToken) -> LockResult<bool>;
}

pub(crate) fn lease_length(ttl: Duration) -> LockResult<chrono::Duration> {
    if ttl.is_zero() {
        return Err(LockError::InvalidTtl("ttl must be positive".to_string()));
    }
    chrono::Duration::from_std(ttl).map_err(|e| LockError::InvalidTtl(e.to_string()))
}

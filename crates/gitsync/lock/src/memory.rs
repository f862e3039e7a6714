use crate::traits::{lease_length, Acquisition, LockHolder, LockToken, SyncLock};
use crate::{LockError, LockResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitsync_types::WorkspaceId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Lease {
    token: Uuid,
    owner: String,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Process-local lock table.
#[derive(Debug, Default)]
pub struct InMemorySyncLock {
    leases: Mutex<HashMap<WorkspaceId, Lease>>,
}

impl InMemorySyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live lease is currently held for the workspace.
    pub fn is_held(&self, workspace: &WorkspaceId) -> bool {
        self.leases
            .lock()
            .map(|leases| {
                leases
                    .get(workspace)
                    .is_some_and(|lease| lease.expires_at > Utc::now())
            })
            .unwrap_or(false)
    }

    fn acquire_at(
        &self,
        workspace: &WorkspaceId,
        owner: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> LockResult<Acquisition> {
        let length = lease_length(ttl)?;
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| LockError::Backend("lock table poisoned".to_string()))?;

        if let Some(current) = leases.get(workspace) {
            if current.expires_at > now {
                debug!(%workspace, holder = %current.owner, "sync lock busy");
                return Ok(Acquisition::Busy(LockHolder {
                    owner: current.owner.clone(),
                    acquired_at: current.acquired_at,
                    expires_at: current.expires_at,
                }));
            }
            warn!(%workspace, holder = %current.owner, "taking over expired sync lock");
        }

        let lease = Lease {
            token: Uuid::new_v4(),
            owner: owner.to_string(),
            acquired_at: now,
            expires_at: now + length,
        };
        let token = LockToken {
            workspace: workspace.clone(),
            token: lease.token,
            owner: lease.owner.clone(),
            expires_at: lease.expires_at,
        };
        leases.insert(workspace.clone(), lease);
        Ok(Acquisition::Acquired(token))
    }
}

#[async_trait]
impl SyncLock for InMemorySyncLock {
    async fn acquire(
        &self,
        workspace: &WorkspaceId,
        owner: &str,
        ttl: Duration,
    ) -> LockResult<Acquisition> {
        self.acquire_at(workspace, owner, ttl, Utc::now())
    }

    async fn release(&self, token: &LockToken) -> LockResult<bool> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| LockError::Backend("lock table poisoned".to_string()))?;
        match leases.get(&token.workspace) {
            Some(lease) if lease.token == token.token => {
                leases.remove(&token.workspace);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn second_caller_sees_current_holder() {
        let lock = InMemorySyncLock::new();
        let ws = WorkspaceId::new("acme");

        let first = lock.acquire(&ws, "alice", TTL).await.unwrap();
        assert!(matches!(first, Acquisition::Acquired(_)));

        match lock.acquire(&ws, "bob", TTL).await.unwrap() {
            Acquisition::Busy(holder) => assert_eq!(holder.owner, "alice"),
            other => panic!("expected busy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn workspaces_are_independent() {
        let lock = InMemorySyncLock::new();
        let a = lock.acquire(&WorkspaceId::new("a"), "x", TTL).await.unwrap();
        let b = lock.acquire(&WorkspaceId::new("b"), "x", TTL).await.unwrap();
        assert!(matches!(a, Acquisition::Acquired(_)));
        assert!(matches!(b, Acquisition::Acquired(_)));
    }

    #[tokio::test]
    async fn release_frees_the_workspace() {
        let lock = InMemorySyncLock::new();
        let ws = WorkspaceId::new("acme");
        let Acquisition::Acquired(token) = lock.acquire(&ws, "alice", TTL).await.unwrap() else {
            panic!("expected acquisition");
        };

        assert!(lock.release(&token).await.unwrap());
        assert!(!lock.is_held(&ws));
        assert!(!lock.release(&token).await.unwrap());
        assert!(matches!(
            lock.acquire(&ws, "bob", TTL).await.unwrap(),
            Acquisition::Acquired(_)
        ));
    }

    #[test]
    fn expired_lease_is_taken_over_and_old_token_is_void() {
        let lock = InMemorySyncLock::new();
        let ws = WorkspaceId::new("acme");
        let past = Utc::now() - chrono::Duration::seconds(120);
        let Acquisition::Acquired(stale) = lock.acquire_at(&ws, "crashed", TTL, past).unwrap()
        else {
            panic!("expected acquisition");
        };

        let fresh = lock.acquire_at(&ws, "bob", TTL, Utc::now()).unwrap();
        assert!(matches!(fresh, Acquisition::Acquired(ref t) if t.owner == "bob"));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        assert!(!runtime.block_on(lock.release(&stale)).unwrap());
        assert!(lock.is_held(&ws));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let lock = InMemorySyncLock::new();
        let result = lock.acquire_at(&WorkspaceId::new("a"), "x", Duration::ZERO, Utc::now());
        assert!(matches!(result, Err(LockError::InvalidTtl(_))));
    }
}

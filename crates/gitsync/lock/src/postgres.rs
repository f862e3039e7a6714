//! PostgreSQL lease table.
//!
//! Acquisition is a single upsert that only overwrites an expired lease, so
//! two callers racing for the same workspace cannot both win.

use crate::traits::{lease_length, Acquisition, LockHolder, LockToken, SyncLock};
use crate::{LockError, LockResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitsync_types::WorkspaceId;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct PostgresSyncLock {
    pool: PgPool,
}

impl PostgresSyncLock {
    pub async fn connect(database_url: &str) -> LockResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| LockError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> LockResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gitsync_sync_locks (
                workspace_id TEXT PRIMARY KEY,
                token UUID NOT NULL,
                owner TEXT NOT NULL,
                acquired_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| LockError::Backend(format!("schema init failed: {e}")))?;
        Ok(Self { pool })
    }
}

impl PostgresSyncLock {
    /// One upsert plus, when it loses, a read of the live lease.
    ///
    /// `None` means the lease was released between the two statements.
    async fn attempt(
        &self,
        workspace: &WorkspaceId,
        owner: &str,
        ttl: Duration,
    ) -> LockResult<Option<Acquisition>> {
        let now = Utc::now();
        let expires_at = now + lease_length(ttl)?;
        let token = Uuid::new_v4();

        let won = sqlx::query(
            r#"
            INSERT INTO gitsync_sync_locks (workspace_id, token, owner, acquired_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (workspace_id) DO UPDATE SET
                token = EXCLUDED.token,
                owner = EXCLUDED.owner,
                acquired_at = EXCLUDED.acquired_at,
                expires_at = EXCLUDED.expires_at
            WHERE gitsync_sync_locks.expires_at < EXCLUDED.acquired_at
            RETURNING token
            "#,
        )
        .bind(workspace.as_str())
        .bind(token)
        .bind(owner)
        .bind(now)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Backend(e.to_string()))?;

        if won.is_some() {
            return Ok(Some(Acquisition::Acquired(LockToken {
                workspace: workspace.clone(),
                token,
                owner: owner.to_string(),
                expires_at,
            })));
        }

        let Some(row) = sqlx::query(
            "SELECT owner, acquired_at, expires_at FROM gitsync_sync_locks WHERE workspace_id = $1",
        )
        .bind(workspace.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        let holder = LockHolder {
            owner: row.try_get("owner").map_err(|e| LockError::Backend(e.to_string()))?,
            acquired_at: row
                .try_get::<DateTime<Utc>, _>("acquired_at")
                .map_err(|e| LockError::Backend(e.to_string()))?,
            expires_at: row
                .try_get::<DateTime<Utc>, _>("expires_at")
                .map_err(|e| LockError::Backend(e.to_string()))?,
        };
        Ok(Some(Acquisition::Busy(holder)))
    }
}

/// Attempts made before giving up on a lease that keeps vanishing.
const ACQUIRE_ATTEMPTS: usize = 2;

/// Repeats `attempt` while the lease it lost to disappears before it can be
/// read.
async fn retry_vacated<F, Fut>(workspace: &WorkspaceId, mut attempt: F) -> LockResult<Acquisition>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LockResult<Option<Acquisition>>>,
{
    for _ in 0..ACQUIRE_ATTEMPTS {
        match attempt().await? {
            Some(Acquisition::Busy(holder)) => {
                debug!(%workspace, holder = %holder.owner, "sync lock busy");
                return Ok(Acquisition::Busy(holder));
            }
            Some(acquired) => return Ok(acquired),
            None => debug!(%workspace, "sync lock released while acquiring, retrying"),
        }
    }
    Err(LockError::Backend(format!(
        "lease for {workspace} changed hands {ACQUIRE_ATTEMPTS} times while acquiring"
    )))
}

#[async_trait]
impl SyncLock for PostgresSyncLock {
    async fn acquire(
        &self,
        workspace: &WorkspaceId,
        owner: &str,
        ttl: Duration,
    ) -> LockResult<Acquisition> {
        retry_vacated(workspace, || self.attempt(workspace, owner, ttl)).await
    }

    async fn release(&self, token: &LockToken) -> LockResult<bool> {
        let result =
            sqlx::query("DELETE FROM gitsync_sync_locks WHERE workspace_id = $1 AND token = $2")
                .bind(token.workspace.as_str())
                .bind(token.token)
                .execute(&self.pool)
                .await
                .map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(workspace: &WorkspaceId) -> Acquisition {
        Acquisition::Acquired(LockToken {
            workspace: workspace.clone(),
            token: Uuid::new_v4(),
            owner: "bob".into(),
            expires_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn vacated_lease_is_retried_once() {
        let workspace = WorkspaceId::new("acme");
        let mut calls = 0;
        let outcome = retry_vacated(&workspace, || {
            calls += 1;
            let result = if calls == 1 { None } else { Some(token(&workspace)) };
            async move { Ok(result) }
        })
        .await
        .unwrap();

        assert_eq!(calls, 2);
        assert!(matches!(outcome, Acquisition::Acquired(_)));
    }

    #[tokio::test]
    async fn busy_lease_is_not_retried() {
        let workspace = WorkspaceId::new("acme");
        let holder = LockHolder {
            owner: "alice".into(),
            acquired_at: Utc::now(),
            expires_at: Utc::now(),
        };
        let mut calls = 0;
        let outcome = retry_vacated(&workspace, || {
            calls += 1;
            let result = Some(Acquisition::Busy(holder.clone()));
            async move { Ok(result) }
        })
        .await
        .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(outcome, Acquisition::Busy(holder));
    }

    #[tokio::test]
    async fn lease_vanishing_every_time_is_an_error() {
        let workspace = WorkspaceId::new("acme");
        let result = retry_vacated(&workspace, || async { Ok(None) }).await;
        assert!(matches!(result, Err(LockError::Backend(_))));
    }
}

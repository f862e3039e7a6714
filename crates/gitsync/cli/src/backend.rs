//! Store and lock construction from configuration.

use crate::config::StorageConfig;
use crate::error::CliResult;
use gitsync_lock::{InMemorySyncLock, SyncLock};
use gitsync_store::{InMemoryStore, Store};
use std::sync::Arc;
use tracing::info;

pub struct Backend {
    pub store: Arc<dyn Store>,
    pub lock: Arc<dyn SyncLock>,
}

pub async fn open(storage: &StorageConfig) -> CliResult<Backend> {
    match storage {
        StorageConfig::Memory => {
            info!("using in-memory store; nothing persists past this run");
            Ok(Backend {
                store: Arc::new(InMemoryStore::new()),
                lock: Arc::new(InMemorySyncLock::new()),
            })
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => open_postgres(url, *max_connections, *connect_timeout_secs).await,
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(
    url: &str,
    max_connections: u32,
    connect_timeout_secs: u64,
) -> CliResult<Backend> {
    use gitsync_lock::PostgresSyncLock;
    use gitsync_store::postgres::PostgresStore;

    let store =
        PostgresStore::connect_with_options(url, max_connections, connect_timeout_secs).await?;
    let lock = PostgresSyncLock::from_pool(store.pool().clone()).await?;
    info!(max_connections, "connected to postgres store");
    Ok(Backend {
        store: Arc::new(store),
        lock: Arc::new(lock),
    })
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(
    _url: &str,
    _max_connections: u32,
    _connect_timeout_secs: u64,
) -> CliResult<Backend> {
    Err(crate::error::CliError::BackendUnavailable(
        "postgres".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use gitsync_store::StoreReader;

    #[tokio::test]
    async fn test_memory_backend_opens_empty() {
        let backend = open(&StorageConfig::Memory).await.unwrap();
        let rows = backend
            .store
            .list_active(gitsync_types::EntityKind::Organization)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_postgres_requires_feature() {
        let storage = StorageConfig::Postgres {
            url: "postgres://localhost/gitsync".into(),
            max_connections: 2,
            connect_timeout_secs: 1,
        };
        assert!(matches!(
            open(&storage).await,
            Err(CliError::BackendUnavailable(_))
        ));
    }
}

use crate::error::{SyncError, SyncResult};
use crate::operation::PlannedWrite;
use crate::queue::OperationQueue;
use crate::report::SyncReport;
use gitsync_store::Store;
use tracing::{debug, warn};

/// Applies a queue front to back inside one store transaction.
///
/// Any rejected write rolls back the whole queue.
pub struct OperationExecutor<'a> {
    store: &'a dyn Store,
}

impl<'a> OperationExecutor<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    pub async fn apply(&self, queue: &OperationQueue) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        if queue.is_empty() {
            return Ok(report);
        }

        let mut tx = self.store.begin().await?;
        for (index, op) in queue.iter().enumerate() {
            match op.apply(tx.as_mut()).await {
                Ok(effect) => {
                    debug!(index, operation = %op.describe(), ?effect, "applied operation");
                    report.record(effect);
                }
                Err(source) => {
                    let operation = op.describe();
                    warn!(index, %operation, error = %source, "operation rejected, rolling back");
                    if let Err(err) = tx.rollback().await {
                        warn!(error = %err, "rollback failed");
                    }
                    return Err(if source.is_constraint() {
                        SyncError::Constraint {
                            index,
                            operation,
                            source,
                        }
                    } else {
                        SyncError::Storage(source)
                    });
                }
            }
        }
        tx.commit().await?;
        Ok(report)
    }
}

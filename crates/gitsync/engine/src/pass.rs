//! One reconciliation pass: lock, check, plan, then describe or apply.

use crate::content::{ContentIndexer, ContentSource, NoopIndexer};
use crate::deletion::DeletionResolver;
use crate::error::{SyncError, SyncResult, SyncWarning};
use crate::executor::OperationExecutor;
use crate::queue::OperationQueue;
use crate::report::{SyncReport, ValidationReport};
use crate::resolver::{declared_natural_keys, resolve_kind, PlanContext};
use gitsync_lock::{Acquisition, SyncLock};
use gitsync_store::Store;
use gitsync_types::{Manifest, ManifestError, StructuralIssue, WorkspaceId, DEPENDENCY_ORDER};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Plan and describe; no writes.
    Validate,
    /// Plan and apply in one transaction.
    Commit,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Validate => f.write_str("validate"),
            Mode::Commit => f.write_str("commit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Validated(ValidationReport),
    Committed(SyncReport),
}

#[derive(Debug, Clone)]
pub struct PassConfig {
    /// `created_by` of rows first created by a pass
    pub origin_marker: String,
    pub lock_owner: String,
    pub lock_ttl: Duration,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            origin_marker: "git-sync".to_string(),
            lock_owner: "gitsync".to_string(),
            lock_ttl: Duration::from_secs(300),
        }
    }
}

/// The planned writes of one pass plus the warnings found while planning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub queue: OperationQueue,
    pub warnings: Vec<SyncWarning>,
}

impl Plan {
    /// Operation descriptions followed by warning descriptions.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = self.queue.describe();
        lines.extend(self.warnings.iter().map(ToString::to_string));
        lines
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.warnings.is_empty()
    }
}

/// Reconciles manifests into a store.
///
/// Validate and commit share [`ReconciliationPass::plan`], so a clean
/// validation means a commit would change nothing.
pub struct ReconciliationPass {
    store: Arc<dyn Store>,
    lock: Arc<dyn SyncLock>,
    content: Option<Arc<dyn ContentSource>>,
    indexer: Arc<dyn ContentIndexer>,
    config: PassConfig,
}

impl ReconciliationPass {
    pub fn new(store: Arc<dyn Store>, lock: Arc<dyn SyncLock>) -> Self {
        Self {
            store,
            lock,
            content: None,
            indexer: Arc::new(NoopIndexer),
            config: PassConfig::default(),
        }
    }

    /// Without a content source, form and agent bodies are not indexed.
    pub fn with_content_source(mut self, content: Arc<dyn ContentSource>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn ContentIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn with_config(mut self, config: PassConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a pass under the workspace's sync lock.
    ///
    /// A concurrent pass for the same workspace fails fast with
    /// [`SyncError::SyncInProgress`]. The lock is released whether the pass
    /// succeeds or not.
    pub async fn run(
        &self,
        workspace: &WorkspaceId,
        manifest: &Manifest,
        mode: Mode,
    ) -> SyncResult<PassOutcome> {
        let token = match self
            .lock
            .acquire(workspace, &self.config.lock_owner, self.config.lock_ttl)
            .await?
        {
            Acquisition::Acquired(token) => token,
            Acquisition::Busy(holder) => {
                return Err(SyncError::SyncInProgress {
                    workspace: workspace.clone(),
                    holder,
                })
            }
        };

        info!(%workspace, %mode, declarations = manifest.declaration_count(), "sync pass started");
        let result = match mode {
            Mode::Validate => self.validate(manifest).await.map(PassOutcome::Validated),
            Mode::Commit => self.commit(manifest).await.map(PassOutcome::Committed),
        };

        match self.lock.release(&token).await {
            Ok(true) => {}
            Ok(false) => warn!(%workspace, "sync lock expired before release"),
            Err(err) => warn!(%workspace, error = %err, "failed to release sync lock"),
        }

        match &result {
            Ok(PassOutcome::Committed(report)) => info!(
                %workspace,
                created = report.created,
                updated = report.updated,
                deactivated = report.deactivated,
                reactivated = report.reactivated,
                warnings = report.warnings.len(),
                "sync pass committed"
            ),
            Ok(PassOutcome::Validated(report)) => {
                info!(%workspace, issues = report.issues.len(), "sync pass validated")
            }
            Err(err) => warn!(%workspace, error = %err, "sync pass failed"),
        }
        result
    }

    /// Builds the full operation queue without writing.
    pub async fn plan(&self, manifest: &Manifest) -> SyncResult<Plan> {
        check_structure(manifest)?;

        let mut ctx = PlanContext::new(
            self.store.as_ref(),
            manifest,
            &self.config.origin_marker,
            self.content.as_deref(),
            self.indexer.as_ref(),
        );
        if manifest.is_empty() {
            warn!("manifest declares nothing; every active row will be deactivated");
        }
        let deletions = DeletionResolver::new(self.store.as_ref());
        for kind in DEPENDENCY_ORDER {
            resolve_kind(&mut ctx, kind).await?;
            // Retired rows give up their natural keys before this kind's
            // reactivations and creates claim them.
            let deactivations = deletions.plan(kind, &ctx.retained(kind)).await?;
            ctx.seal_kind(deactivations);
        }

        info!(
            operations = ctx.queue.len(),
            warnings = ctx.warnings.len(),
            "sync plan built"
        );
        Ok(Plan {
            queue: ctx.queue,
            warnings: ctx.warnings,
        })
    }

    /// Applies a plan in one transaction; warnings carry over to the report.
    pub async fn execute(&self, plan: &Plan) -> SyncResult<SyncReport> {
        let mut report = OperationExecutor::new(self.store.as_ref())
            .apply(&plan.queue)
            .await?;
        report.warnings = plan.warnings.clone();
        Ok(report)
    }

    pub async fn validate(&self, manifest: &Manifest) -> SyncResult<ValidationReport> {
        let plan = self.plan(manifest).await?;
        Ok(ValidationReport {
            issues: plan.describe(),
        })
    }

    /// Plans and executes without taking the lock; callers coordinate.
    pub async fn commit(&self, manifest: &Manifest) -> SyncResult<SyncReport> {
        let plan = self.plan(manifest).await?;
        self.execute(&plan).await
    }
}

/// Declaration-level checks plus natural keys declared twice within a kind.
fn check_structure(manifest: &Manifest) -> SyncResult<()> {
    let mut issues = match manifest.check_structure() {
        Ok(()) => Vec::new(),
        Err(ManifestError::Structural(issues)) => issues,
        Err(other) => return Err(other.into()),
    };

    let mut owners: HashMap<String, Uuid> = HashMap::new();
    for (kind, id, key) in declared_natural_keys(manifest) {
        match owners.entry(key.canonical()) {
            Entry::Occupied(first) if *first.get() != id => {
                issues.push(StructuralIssue::new(
                    kind,
                    Some(id),
                    format!("natural key {key} is also declared by {}", first.get()),
                ));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ManifestError::Structural(issues).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitsync_types::{EntityKind, OrganizationDecl};

    #[test]
    fn duplicate_natural_keys_are_structural() {
        let manifest = Manifest {
            organizations: vec![
                OrganizationDecl {
                    id: Uuid::new_v4(),
                    name: "Acme".into(),
                },
                OrganizationDecl {
                    id: Uuid::new_v4(),
                    name: "Acme".into(),
                },
            ],
            ..Manifest::default()
        };
        match check_structure(&manifest) {
            Err(SyncError::Structural(ManifestError::Structural(issues))) => {
                assert_eq!(issues.len(), 1);
                assert!(issues[0].message.contains("also declared by"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn plan_description_lists_operations_before_warnings() {
        let plan = Plan {
            queue: OperationQueue::new(),
            warnings: vec![SyncWarning::MissingContent {
                kind: EntityKind::Form,
                id: Uuid::nil(),
                path: "forms/intake.json".into(),
            }],
        };
        let lines = plan.describe();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("forms/intake.json"));
        assert!(!plan.is_empty());
    }
}

use super::{fields, opt_uuid, resolve_identity, PlanContext, Resolvable};
use crate::error::{SyncResult, SyncWarning};
use gitsync_types::{EntityKind, EventSourceDecl, FieldMap, Manifest, SubscriptionDecl};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

impl Resolvable for EventSourceDecl {
    const KIND: EntityKind = EntityKind::EventSource;

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn values(&self) -> FieldMap {
        fields([
            ("name", json!(self.name)),
            ("source_type", json!(self.source_type.as_str())),
            ("organization_id", opt_uuid(self.organization_id)),
            ("cron_expression", json!(self.cron_expression)),
            ("timezone", json!(self.timezone)),
            ("schedule_enabled", json!(self.schedule_enabled)),
        ])
    }
}

/// A subscription together with the event source declaring it.
pub(crate) struct Subscription<'a> {
    pub source: &'a EventSourceDecl,
    pub decl: &'a SubscriptionDecl,
}

impl Resolvable for Subscription<'_> {
    const KIND: EntityKind = EntityKind::EventSubscription;

    fn id(&self) -> Uuid {
        self.decl.id
    }

    fn label(&self) -> String {
        format!("{} -> {}", self.source.name, self.decl.workflow_id)
    }

    fn values(&self) -> FieldMap {
        fields([
            ("event_source_id", opt_uuid(Some(self.source.id))),
            ("workflow_id", opt_uuid(Some(self.decl.workflow_id))),
            ("filter", json!(self.decl.filter)),
            ("input_mapping", json!(self.decl.input_mapping)),
        ])
    }

    fn desired_active(&self) -> bool {
        self.decl.is_active
    }
}

pub(crate) fn subscriptions(manifest: &Manifest) -> impl Iterator<Item = Subscription<'_>> {
    manifest.event_sources.iter().flat_map(|source| {
        source
            .subscriptions
            .iter()
            .map(move |decl| Subscription { source, decl })
    })
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for decl in &manifest.event_sources {
        resolve_identity(ctx, decl).await?;
    }
    Ok(())
}

/// Subscriptions run after event sources and check their workflow exists,
/// either declared in this manifest or already stored and active.
pub(super) async fn resolve_subscriptions(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for sub in subscriptions(manifest) {
        let workflow_id = sub.decl.workflow_id;
        if !workflow_exists(ctx, workflow_id).await? {
            debug!(subscription = %sub.decl.id, %workflow_id, "skipping dangling subscription");
            ctx.mark_seen(EntityKind::EventSubscription, sub.decl.id);
            ctx.warn(SyncWarning::DanglingSubscription {
                subscription_id: sub.decl.id,
                event_source: sub.source.name.clone(),
                workflow_id,
            });
            continue;
        }
        resolve_identity(ctx, &sub).await?;
    }
    Ok(())
}

async fn workflow_exists(ctx: &PlanContext<'_>, workflow_id: Uuid) -> SyncResult<bool> {
    if ctx.declares(EntityKind::Workflow, workflow_id) {
        return Ok(true);
    }
    let stored = ctx.store.get_row(EntityKind::Workflow, workflow_id).await?;
    Ok(stored.is_some_and(|row| row.is_active))
}

use super::{fields, opt_uuid, resolve_identity, sync_roles, PlanContext, Resolvable};
use crate::error::SyncResult;
use gitsync_types::{EntityKind, FieldMap, RoleJunction, WorkflowDecl};
use serde_json::json;
use uuid::Uuid;

impl Resolvable for WorkflowDecl {
    const KIND: EntityKind = EntityKind::Workflow;

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn values(&self) -> FieldMap {
        fields([
            ("name", json!(self.name)),
            ("path", json!(self.path)),
            ("function_name", json!(self.function_name)),
            ("organization_id", opt_uuid(self.organization_id)),
            ("description", json!(self.description)),
            ("access_level", json!(self.access_level.as_str())),
        ])
    }
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for decl in &manifest.workflows {
        let stored = resolve_identity(ctx, decl).await?;
        sync_roles(
            ctx,
            RoleJunction::WorkflowRoles,
            decl.id,
            stored,
            &decl.name,
            &decl.roles,
        )
        .await?;
    }
    Ok(())
}

use super::{fields, index_content, opt_uuid, resolve_identity, sync_roles, PlanContext, Resolvable};
use crate::content::ContentDecl;
use crate::error::SyncResult;
use gitsync_types::{AgentDecl, EntityKind, FieldMap, RoleJunction};
use serde_json::json;
use uuid::Uuid;

impl Resolvable for AgentDecl {
    const KIND: EntityKind = EntityKind::Agent;

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
            ("organization_id", opt_uuid(self.organization_id)),
            ("access_level", json!(self.access_level.as_str())),
        ])
    }
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for decl in &manifest.agents {
        let stored = resolve_identity(ctx, decl).await?;
        sync_roles(ctx, RoleJunction::AgentRoles, decl.id, stored, &decl.name, &decl.roles).await?;
        index_content(ctx, ContentDecl::Agent(decl), stored).await?;
    }
    Ok(())
}

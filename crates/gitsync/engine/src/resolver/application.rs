use super::{fields, opt_uuid, resolve_identity, sync_roles, PlanContext, Resolvable};
use crate::error::SyncResult;
use gitsync_types::{ApplicationDecl, EntityKind, FieldMap, RoleJunction};
use serde_json::json;
use uuid::Uuid;

impl Resolvable for ApplicationDecl {
    const KIND: EntityKind = EntityKind::Application;

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.slug.clone())
    }

    fn values(&self) -> FieldMap {
        fields([
            ("name", json!(self.name)),
            ("path", json!(self.path)),
            ("slug", json!(self.slug)),
            ("organization_id", opt_uuid(self.organization_id)),
            ("access_level", json!(self.access_level.as_str())),
        ])
    }
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for decl in &manifest.applications {
        let stored = resolve_identity(ctx, decl).await?;
        sync_roles(
            ctx,
            RoleJunction::ApplicationRoles,
            decl.id,
            stored,
            &decl.label(),
            &decl.roles,
        )
        .await?;
    }
    Ok(())
}

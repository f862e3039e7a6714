use super::{fields, opt_uuid, resolve_identity, PlanContext, Resolvable};
use crate::error::SyncResult;
use gitsync_types::{EntityKind, FieldMap, RoleDecl};
use serde_json::json;
use uuid::Uuid;

/// Edited in the running environment, never in the manifest.
pub(crate) const PROTECTED: &[&str] = &["description", "permissions"];

impl Resolvable for RoleDecl {
    const KIND: EntityKind = EntityKind::Role;

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn values(&self) -> FieldMap {
        fields([
            ("name", json!(self.name)),
            ("organization_id", opt_uuid(self.organization_id)),
        ])
    }

    fn protected(&self) -> &'static [&'static str] {
        PROTECTED
    }
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for decl in &manifest.roles {
        resolve_identity(ctx, decl).await?;
    }
    Ok(())
}

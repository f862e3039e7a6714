use super::{fields, resolve_identity, PlanContext, Resolvable};
use crate::error::SyncResult;
use gitsync_types::{EntityKind, FieldMap, OrganizationDecl};
use serde_json::json;
use uuid::Uuid;

/// Set per environment (custom domains, provider flag, tenant settings).
pub(crate) const PROTECTED: &[&str] = &["domain", "is_provider", "settings"];

impl Resolvable for OrganizationDecl {
    const KIND: EntityKind = EntityKind::Organization;

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn values(&self) -> FieldMap {
        fields([("name", json!(self.name))])
    }

    fn protected(&self) -> &'static [&'static str] {
        PROTECTED
    }
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for decl in &manifest.organizations {
        resolve_identity(ctx, decl).await?;
    }
    Ok(())
}

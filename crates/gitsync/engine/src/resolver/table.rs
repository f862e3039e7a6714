use super::{fields, opt_uuid, resolve_identity, PlanContext, Resolvable};
use crate::error::SyncResult;
use gitsync_types::{EntityKind, FieldMap, TableDecl};
use serde_json::json;
use uuid::Uuid;

impl Resolvable for TableDecl {
    const KIND: EntityKind = EntityKind::Table;

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn values(&self) -> FieldMap {
        fields([
            ("name", json!(self.name)),
            ("description", json!(self.description)),
            ("organization_id", opt_uuid(self.organization_id)),
            ("application_id", opt_uuid(self.application_id)),
            ("schema", self.schema.clone()),
        ])
    }
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for decl in &manifest.tables {
        resolve_identity(ctx, decl).await?;
    }
    Ok(())
}

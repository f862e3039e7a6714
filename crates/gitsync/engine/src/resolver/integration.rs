use super::{fields, opt_uuid, reconcile_children, resolve_identity, PlanContext, Resolvable};
use crate::error::SyncResult;
use crate::operation::WriteChild;
use gitsync_store::{ChildRow, CHILD_TABLE_MAPPINGS};
use gitsync_types::{EntityKind, FieldMap, IntegrationDecl, IntegrationMappingDecl};
use serde_json::json;
use uuid::Uuid;

impl Resolvable for IntegrationDecl {
    const KIND: EntityKind = EntityKind::Integration;

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn values(&self) -> FieldMap {
        fields([
            ("name", json!(self.name)),
            ("config_schema", self.config_schema.clone()),
        ])
    }
}

/// Mapping rows are keyed by organization, so their ids are derived from
/// the integration id and the organization id.
pub(crate) fn mapping_id(integration_id: Uuid, organization_id: Option<Uuid>) -> Uuid {
    let scope = organization_id.map_or_else(|| "global".to_string(), |id| id.to_string());
    Uuid::new_v5(&integration_id, scope.as_bytes())
}

fn mapping_row(integration: &IntegrationDecl, mapping: &IntegrationMappingDecl) -> WriteChild {
    let row = ChildRow {
        table: CHILD_TABLE_MAPPINGS.to_string(),
        id: mapping_id(integration.id, mapping.organization_id),
        parent_kind: EntityKind::Integration,
        parent_id: integration.id,
        fields: fields([
            ("organization_id", opt_uuid(mapping.organization_id)),
            ("entity_id", json!(mapping.entity_id)),
            ("entity_name", json!(mapping.entity_name)),
        ]),
    };
    WriteChild {
        label: mapping
            .entity_name
            .clone()
            .unwrap_or_else(|| mapping.entity_id.clone()),
        row,
    }
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    let tables = [CHILD_TABLE_MAPPINGS.to_string()];
    for decl in &manifest.integrations {
        let stored = resolve_identity(ctx, decl).await?;
        let desired = decl
            .mappings
            .iter()
            .map(|mapping| mapping_row(decl, mapping))
            .collect();
        reconcile_children(ctx, stored, &tables, desired).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_ids_are_stable_per_organization() {
        let integration = Uuid::new_v4();
        let org = Uuid::new_v4();
        assert_eq!(
            mapping_id(integration, Some(org)),
            mapping_id(integration, Some(org))
        );
        assert_ne!(
            mapping_id(integration, Some(org)),
            mapping_id(integration, None)
        );
        assert_ne!(
            mapping_id(integration, Some(org)),
            mapping_id(Uuid::new_v4(), Some(org))
        );
    }
}

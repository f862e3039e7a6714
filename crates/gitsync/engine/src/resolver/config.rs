use super::{fields, opt_uuid, resolve_identity, PlanContext, Resolvable};
use crate::error::SyncResult;
use gitsync_types::{ConfigDecl, ConfigType, EntityKind, FieldMap};
use serde_json::{json, Value};
use uuid::Uuid;

/// Secret values are set per environment and never leave it.
pub(crate) const PROTECTED_SECRET: &[&str] = &["value"];

impl Resolvable for ConfigDecl {
    const KIND: EntityKind = EntityKind::Config;

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> String {
        self.key.clone()
    }

    fn values(&self) -> FieldMap {
        fields([
            ("integration_id", opt_uuid(Some(self.integration_id))),
            ("organization_id", opt_uuid(self.organization_id)),
            ("key", json!(self.key)),
            ("type", json!(self.config_type.as_str())),
            ("value", self.value.clone().unwrap_or(Value::Null)),
        ])
    }

    fn protected(&self) -> &'static [&'static str] {
        match self.config_type {
            ConfigType::Secret => PROTECTED_SECRET,
            _ => &[],
        }
    }
}

pub(super) async fn resolve(ctx: &mut PlanContext<'_>) -> SyncResult<()> {
    let manifest = ctx.manifest;
    for decl in &manifest.configs {
        resolve_identity(ctx, decl).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_value_is_never_managed() {
        let decl = ConfigDecl {
            id: Uuid::new_v4(),
            integration_id: Uuid::new_v4(),
            key: "api_token".into(),
            config_type: ConfigType::Secret,
            organization_id: None,
            value: None,
        };
        assert!(!decl.managed_values().contains_key("value"));

        let plain = ConfigDecl {
            config_type: ConfigType::String,
            value: Some(json!("eu-west-1")),
            ..decl
        };
        assert_eq!(plain.managed_values()["value"], json!("eu-west-1"));
    }
}

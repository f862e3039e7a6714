//! Typed manifest declarations
//!
//! Every declaration carries the UUID that identifies it across
//! environments, a natural key for matching rows minted elsewhere, and its
//! entity-specific fields. Relationships are UUIDs copied verbatim from the
//! referenced declaration.

use crate::error::{ManifestError, StructuralIssue};
use crate::kind::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Column values of one row, keyed by field name.
pub type FieldMap = BTreeMap<String, Value>;

/// Who may invoke a workflow, form, agent or application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Any authenticated user of the organization
    #[default]
    Authenticated,
    /// Only users holding one of the assigned roles
    RoleBased,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Authenticated => "authenticated",
            AccessLevel::RoleBased => "role_based",
        }
    }
}

/// Value type of a config entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    String,
    Int,
    Bool,
    Json,
    /// Value lives only in the environment; the manifest carries `null`
    Secret,
}

impl ConfigType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::String => "string",
            ConfigType::Int => "int",
            ConfigType::Bool => "bool",
            ConfigType::Json => "json",
            ConfigType::Secret => "secret",
        }
    }
}

/// Trigger family of an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSourceType {
    Webhook,
    Schedule,
    Internal,
}

impl EventSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSourceType::Webhook => "webhook",
            EventSourceType::Schedule => "schedule",
            EventSourceType::Internal => "internal",
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationDecl {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDecl {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDecl {
    pub id: Uuid,
    pub name: String,
    /// Source file holding the workflow function
    pub path: String,
    pub function_name: String,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub roles: Vec<Uuid>,
    #[serde(default)]
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationMappingDecl {
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    /// Identifier of the organization in the external system
    pub entity_id: String,
    #[serde(default)]
    pub entity_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationDecl {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub config_schema: Value,
    #[serde(default)]
    pub mappings: Vec<IntegrationMappingDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDecl {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub key: String,
    #[serde(rename = "type")]
    pub config_type: ConfigType,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDecl {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub path: String,
    pub slug: String,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub roles: Vec<Uuid>,
    #[serde(default)]
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDecl {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
    #[serde(default)]
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionDecl {
    pub id: Uuid,
    pub workflow_id: Uuid,
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub input_mapping: Option<Value>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSourceDecl {
    pub id: Uuid,
    pub name: String,
    pub source_type: EventSourceType,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub schedule_enabled: bool,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDecl {
    pub id: Uuid,
    pub name: String,
    /// Path of the form definition body in the object store
    pub path: String,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub roles: Vec<Uuid>,
    #[serde(default)]
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDecl {
    pub id: Uuid,
    pub name: String,
    /// Path of the agent definition body in the object store
    pub path: String,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub roles: Vec<Uuid>,
    #[serde(default)]
    pub access_level: AccessLevel,
}

/// Every declaration of a workspace, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub organizations: Vec<OrganizationDecl>,
    #[serde(default)]
    pub roles: Vec<RoleDecl>,
    #[serde(default)]
    pub workflows: Vec<WorkflowDecl>,
    #[serde(default)]
    pub integrations: Vec<IntegrationDecl>,
    #[serde(default)]
    pub configs: Vec<ConfigDecl>,
    #[serde(default)]
    pub applications: Vec<ApplicationDecl>,
    #[serde(default)]
    pub tables: Vec<TableDecl>,
    #[serde(default)]
    pub event_sources: Vec<EventSourceDecl>,
    #[serde(default)]
    pub forms: Vec<FormDecl>,
    #[serde(default)]
    pub agents: Vec<AgentDecl>,
}

impl Manifest {
    /// Ids declared for one kind, in manifest order.
    pub fn declared_ids(&self, kind: EntityKind) -> Vec<Uuid> {
        match kind {
            EntityKind::Organization => self.organizations.iter().map(|d| d.id).collect(),
            EntityKind::Role => self.roles.iter().map(|d| d.id).collect(),
            EntityKind::Workflow => self.workflows.iter().map(|d| d.id).collect(),
            EntityKind::Integration => self.integrations.iter().map(|d| d.id).collect(),
            EntityKind::Config => self.configs.iter().map(|d| d.id).collect(),
            EntityKind::Application => self.applications.iter().map(|d| d.id).collect(),
            EntityKind::Table => self.tables.iter().map(|d| d.id).collect(),
            EntityKind::EventSource => self.event_sources.iter().map(|d| d.id).collect(),
            EntityKind::EventSubscription => self
                .event_sources
                .iter()
                .flat_map(|s| s.subscriptions.iter().map(|sub| sub.id))
                .collect(),
            EntityKind::Form => self.forms.iter().map(|d| d.id).collect(),
            EntityKind::Agent => self.agents.iter().map(|d| d.id).collect(),
        }
    }

    /// Total number of declarations, subscriptions included.
    pub fn declaration_count(&self) -> usize {
        crate::kind::DEPENDENCY_ORDER
            .iter()
            .map(|kind| self.declared_ids(*kind).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.declaration_count() == 0
    }

    /// Checks the declarations against each other.
    ///
    /// Rejects duplicate ids within a kind, blank identifying fields and
    /// secret configs that carry a plaintext value.
    pub fn check_structure(&self) -> Result<(), ManifestError> {
        let mut issues = Vec::new();

        for kind in crate::kind::DEPENDENCY_ORDER {
            let mut seen = HashSet::new();
            for id in self.declared_ids(kind) {
                if !seen.insert(id) {
                    issues.push(StructuralIssue::new(kind, Some(id), "duplicate id"));
                }
            }
        }

        let mut require = |kind: EntityKind, id: Uuid, field: &str, value: &str| {
            if value.trim().is_empty() {
                issues.push(StructuralIssue::new(
                    kind,
                    Some(id),
                    format!("{field} must not be empty"),
                ));
            }
        };

        for d in &self.organizations {
            require(EntityKind::Organization, d.id, "name", &d.name);
        }
        for d in &self.roles {
            require(EntityKind::Role, d.id, "name", &d.name);
        }
        for d in &self.workflows {
            require(EntityKind::Workflow, d.id, "name", &d.name);
            require(EntityKind::Workflow, d.id, "path", &d.path);
            require(EntityKind::Workflow, d.id, "function_name", &d.function_name);
        }
        for d in &self.integrations {
            require(EntityKind::Integration, d.id, "name", &d.name);
        }
        for d in &self.configs {
            require(EntityKind::Config, d.id, "key", &d.key);
        }
        for d in &self.applications {
            require(EntityKind::Application, d.id, "slug", &d.slug);
            require(EntityKind::Application, d.id, "path", &d.path);
        }
        for d in &self.tables {
            require(EntityKind::Table, d.id, "name", &d.name);
        }
        for d in &self.event_sources {
            require(EntityKind::EventSource, d.id, "name", &d.name);
        }
        for d in &self.forms {
            require(EntityKind::Form, d.id, "name", &d.name);
            require(EntityKind::Form, d.id, "path", &d.path);
        }
        for d in &self.agents {
            require(EntityKind::Agent, d.id, "name", &d.name);
            require(EntityKind::Agent, d.id, "path", &d.path);
        }

        for d in &self.configs {
            let has_value = d.value.as_ref().is_some_and(|v| !v.is_null());
            if d.config_type == ConfigType::Secret && has_value {
                issues.push(StructuralIssue::new(
                    EntityKind::Config,
                    Some(d.id),
                    "secret config must not carry a plaintext value",
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ManifestError::Structural(issues))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
organizations:
  - id: 3f1c1e6a-0000-4000-8000-000000000001
    name: Acme
roles:
  - id: 3f1c1e6a-0000-4000-8000-000000000002
    name: Operators
    organization_id: 3f1c1e6a-0000-4000-8000-000000000001
workflows:
  - id: 3f1c1e6a-0000-4000-8000-000000000003
    name: Onboard
    path: workflows/onboard.py
    function_name: onboard
    roles: [3f1c1e6a-0000-4000-8000-000000000002]
    access_level: role_based
configs:
  - id: 3f1c1e6a-0000-4000-8000-000000000004
    integration_id: 3f1c1e6a-0000-4000-8000-000000000005
    key: api_token
    type: secret
event_sources:
  - id: 3f1c1e6a-0000-4000-8000-000000000006
    name: Nightly
    source_type: schedule
    cron_expression: "0 2 * * *"
    subscriptions:
      - id: 3f1c1e6a-0000-4000-8000-000000000007
        workflow_id: 3f1c1e6a-0000-4000-8000-000000000003
"#;

    fn sample() -> Manifest {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_sample_manifest_deserializes_with_defaults() {
        let manifest = sample();
        assert_eq!(manifest.organizations[0].name, "Acme");
        assert_eq!(manifest.workflows[0].access_level, AccessLevel::RoleBased);
        assert_eq!(manifest.configs[0].config_type, ConfigType::Secret);
        assert!(manifest.configs[0].value.is_none());
        assert!(manifest.event_sources[0].schedule_enabled);
        assert!(manifest.event_sources[0].subscriptions[0].is_active);
        assert!(manifest.forms.is_empty());
    }

    #[test]
    fn test_declaration_count_includes_subscriptions() {
        assert_eq!(sample().declaration_count(), 6);
        assert!(Manifest::default().is_empty());
    }

    #[test]
    fn test_structure_accepts_sample() {
        sample().check_structure().unwrap();
    }

    #[test]
    fn test_structure_rejects_duplicate_ids() {
        let mut manifest = sample();
        let dup = manifest.roles[0].clone();
        manifest.roles.push(dup);
        let err = manifest.check_structure().unwrap_err();
        match err {
            ManifestError::Structural(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].kind, EntityKind::Role);
                assert_eq!(issues[0].message, "duplicate id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_structure_rejects_secret_with_plaintext() {
        let mut manifest = sample();
        manifest.configs[0].value = Some(Value::String("hunter2".into()));
        assert!(matches!(
            manifest.check_structure(),
            Err(ManifestError::Structural(_))
        ));
    }

    #[test]
    fn test_structure_rejects_blank_names() {
        let mut manifest = sample();
        manifest.organizations[0].name = "  ".into();
        let err = manifest.check_structure().unwrap_err().to_string();
        assert!(err.contains("name must not be empty"));
    }
}

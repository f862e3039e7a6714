//! Entity kinds and the fixed dependency order
//!
//! The foreign-key graph between kinds is small and known ahead of time, so
//! it is declared here as data rather than computed. Stores derive their
//! schema (tables, FK columns, natural-key indexes) from the same metadata
//! the engine plans against.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level entity kinds owned by the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organization,
    Role,
    Workflow,
    Integration,
    Config,
    Application,
    Table,
    EventSource,
    EventSubscription,
    Form,
    Agent,
}

/// Order in which kinds are resolved and their operations applied.
///
/// Every kind appears after each kind it references: applications precede
/// tables (a table may name an owning application) and workflows precede
/// event subscriptions, forms and agents.
pub const DEPENDENCY_ORDER: [EntityKind; 11] = [
    EntityKind::Organization,
    EntityKind::Role,
    EntityKind::Workflow,
    EntityKind::Integration,
    EntityKind::Config,
    EntityKind::Application,
    EntityKind::Table,
    EntityKind::EventSource,
    EntityKind::EventSubscription,
    EntityKind::Form,
    EntityKind::Agent,
];

/// An outbound reference from one kind's field to another kind's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub field: &'static str,
    pub target: EntityKind,
}

const fn fk(field: &'static str, target: EntityKind) -> ForeignKey {
    ForeignKey { field, target }
}

const ORG_FK: ForeignKey = fk("organization_id", EntityKind::Organization);

impl EntityKind {
    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organizations",
            EntityKind::Role => "roles",
            EntityKind::Workflow => "workflows",
            EntityKind::Integration => "integrations",
            EntityKind::Config => "configs",
            EntityKind::Application => "applications",
            EntityKind::Table => "data_tables",
            EntityKind::EventSource => "event_sources",
            EntityKind::EventSubscription => "event_subscriptions",
            EntityKind::Form => "forms",
            EntityKind::Agent => "agents",
        }
    }

    /// Fields forming the natural key, scope fields first.
    pub fn natural_key_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Organization => &["name"],
            EntityKind::Role => &["organization_id", "name"],
            EntityKind::Workflow => &["path", "function_name"],
            EntityKind::Integration => &["name"],
            EntityKind::Config => &["integration_id", "organization_id", "key"],
            EntityKind::Application => &["organization_id", "slug"],
            EntityKind::Table => &["organization_id", "application_id", "name"],
            EntityKind::EventSource => &["organization_id", "name"],
            EntityKind::EventSubscription => &["event_source_id", "workflow_id"],
            EntityKind::Form => &["path"],
            EntityKind::Agent => &["path"],
        }
    }

    /// Outbound foreign keys, all of which cascade on id reassignment.
    pub fn foreign_keys(&self) -> &'static [ForeignKey] {
        const ROLE: &[ForeignKey] = &[ORG_FK];
        const CONFIG: &[ForeignKey] = &[fk("integration_id", EntityKind::Integration), ORG_FK];
        const TABLE: &[ForeignKey] = &[ORG_FK, fk("application_id", EntityKind::Application)];
        const SUBSCRIPTION: &[ForeignKey] = &[
            fk("event_source_id", EntityKind::EventSource),
            fk("workflow_id", EntityKind::Workflow),
        ];

        match self {
            EntityKind::Organization | EntityKind::Integration => &[],
            EntityKind::Role
            | EntityKind::Workflow
            | EntityKind::Application
            | EntityKind::EventSource
            | EntityKind::Form
            | EntityKind::Agent => ROLE,
            EntityKind::Config => CONFIG,
            EntityKind::Table => TABLE,
            EntityKind::EventSubscription => SUBSCRIPTION,
        }
    }

    /// Field used when naming a row to a human, if the kind has one.
    pub fn label_field(&self) -> Option<&'static str> {
        match self {
            EntityKind::Config => Some("key"),
            EntityKind::Application => Some("slug"),
            EntityKind::EventSubscription => None,
            _ => Some("name"),
        }
    }

    /// Role-assignment junction owned by this kind.
    pub fn role_junction(&self) -> Option<RoleJunction> {
        match self {
            EntityKind::Workflow => Some(RoleJunction::WorkflowRoles),
            EntityKind::Application => Some(RoleJunction::ApplicationRoles),
            EntityKind::Form => Some(RoleJunction::FormRoles),
            EntityKind::Agent => Some(RoleJunction::AgentRoles),
            _ => None,
        }
    }

    /// Position in [`DEPENDENCY_ORDER`].
    pub fn dependency_rank(&self) -> usize {
        DEPENDENCY_ORDER
            .iter()
            .position(|k| k == self)
            .unwrap_or(DEPENDENCY_ORDER.len())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Organization => "Organization",
            EntityKind::Role => "Role",
            EntityKind::Workflow => "Workflow",
            EntityKind::Integration => "Integration",
            EntityKind::Config => "Config",
            EntityKind::Application => "Application",
            EntityKind::Table => "Table",
            EntityKind::EventSource => "EventSource",
            EntityKind::EventSubscription => "EventSubscription",
            EntityKind::Form => "Form",
            EntityKind::Agent => "Agent",
        };
        f.write_str(name)
    }
}

/// Many-to-many role grant tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleJunction {
    WorkflowRoles,
    ApplicationRoles,
    FormRoles,
    AgentRoles,
}

impl RoleJunction {
    pub const ALL: [RoleJunction; 4] = [
        RoleJunction::WorkflowRoles,
        RoleJunction::ApplicationRoles,
        RoleJunction::FormRoles,
        RoleJunction::AgentRoles,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            RoleJunction::WorkflowRoles => "workflow_roles",
            RoleJunction::ApplicationRoles => "application_roles",
            RoleJunction::FormRoles => "form_roles",
            RoleJunction::AgentRoles => "agent_roles",
        }
    }

    /// Kind whose rows own the grants.
    pub fn owner(&self) -> EntityKind {
        match self {
            RoleJunction::WorkflowRoles => EntityKind::Workflow,
            RoleJunction::ApplicationRoles => EntityKind::Application,
            RoleJunction::FormRoles => EntityKind::Form,
            RoleJunction::AgentRoles => EntityKind::Agent,
        }
    }
}

impl fmt::Display for RoleJunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_reference_points_backwards_in_dependency_order() {
        for kind in DEPENDENCY_ORDER {
            for fk in kind.foreign_keys() {
                assert!(
                    fk.target.dependency_rank() < kind.dependency_rank(),
                    "{kind}.{} references {} which is not resolved earlier",
                    fk.field,
                    fk.target
                );
            }
        }
    }

    #[test]
    fn test_junction_owners_follow_roles() {
        for junction in RoleJunction::ALL {
            assert!(junction.owner().dependency_rank() > EntityKind::Role.dependency_rank());
            assert_eq!(junction.owner().role_junction(), Some(junction));
        }
    }

    #[test]
    fn test_dependency_order_lists_each_kind_once() {
        let mut seen = std::collections::HashSet::new();
        for kind in DEPENDENCY_ORDER {
            assert!(seen.insert(kind));
        }
        assert_eq!(seen.len(), DEPENDENCY_ORDER.len());
    }

    #[test]
    fn test_table_precedes_nothing_it_depends_on() {
        assert!(EntityKind::Application.dependency_rank() < EntityKind::Table.dependency_rank());
        assert!(
            EntityKind::Workflow.dependency_rank()
                < EntityKind::EventSubscription.dependency_rank()
        );
    }
}

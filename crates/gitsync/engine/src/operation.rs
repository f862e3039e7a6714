//! Planned writes as plain data.
//!
//! The resolvers only ever produce [`Operation`] values; nothing touches the
//! store until the executor applies them. The same values back both modes:
//! validate renders [`PlannedWrite::describe`], commit runs
//! [`PlannedWrite::apply`].

use async_trait::async_trait;
use gitsync_store::{ChildRow, EntityRow, StorageResult, StoreTransaction};
use gitsync_types::{EntityKind, FieldMap, RoleJunction};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// What applying one operation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Created,
    Updated,
    Reassigned,
    Deactivated,
    Reactivated,
    Roles { granted: usize, revoked: usize },
    ChildWritten,
    ChildDeleted,
    Unchanged,
}

/// A write that can be described without a store and applied inside one.
#[async_trait]
pub trait PlannedWrite: Send + Sync {
    fn describe(&self) -> String;

    async fn apply(&self, tx: &mut dyn StoreTransaction) -> StorageResult<Effect>;
}

/// How an upsert locates its row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum UpsertStrategy {
    /// The declaration's id already exists.
    ById,
    /// A row minted elsewhere shares the natural key; its id is rewritten.
    ByNaturalKey { existing_id: Uuid },
    /// No match; insert with the origin marker.
    New { created_by: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Upsert {
    pub kind: EntityKind,
    pub id: Uuid,
    #[serde(flatten)]
    pub strategy: UpsertStrategy,
    /// Never contains the kind's protected fields.
    pub values: FieldMap,
    /// Activity written with the row. Toggling an existing row is a separate
    /// [`Deactivate`] or [`Reactivate`].
    pub is_active: bool,
    pub label: String,
}

#[async_trait]
impl PlannedWrite for Upsert {
    fn describe(&self) -> String {
        match &self.strategy {
            UpsertStrategy::New { .. } => format!("would create {} '{}'", self.kind, self.label),
            UpsertStrategy::ById => format!("would update {} '{}'", self.kind, self.label),
            UpsertStrategy::ByNaturalKey { existing_id } => format!(
                "would update {} '{}' (reassigning id {} -> {})",
                self.kind, self.label, existing_id, self.id
            ),
        }
    }

    async fn apply(&self, tx: &mut dyn StoreTransaction) -> StorageResult<Effect> {
        match &self.strategy {
            UpsertStrategy::New { created_by } => {
                let row = EntityRow::new(self.kind, self.id, self.values.clone(), created_by.clone())
                    .with_active(self.is_active);
                tx.insert_row(row).await?;
                Ok(Effect::Created)
            }
            UpsertStrategy::ById => {
                tx.update_row(self.kind, self.id, &self.values, self.is_active)
                    .await?;
                Ok(Effect::Updated)
            }
            UpsertStrategy::ByNaturalKey { existing_id } => {
                tx.reassign_id(self.kind, *existing_id, self.id).await?;
                tx.update_row(self.kind, self.id, &self.values, self.is_active)
                    .await?;
                Ok(Effect::Reassigned)
            }
        }
    }
}

/// Declarative role target for one entity.
///
/// `to_add` and `to_remove` are the planning-time diff, kept for display.
/// Applying re-diffs against the transaction and inserts every missing grant
/// before deleting any stale one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRoles {
    pub junction: RoleJunction,
    pub entity_id: Uuid,
    pub desired_role_ids: BTreeSet<Uuid>,
    pub to_add: BTreeSet<Uuid>,
    pub to_remove: BTreeSet<Uuid>,
    pub label: String,
}

#[async_trait]
impl PlannedWrite for SyncRoles {
    fn describe(&self) -> String {
        format!(
            "would sync roles of {} '{}' (grant {}, revoke {})",
            self.junction.owner(),
            self.label,
            self.to_add.len(),
            self.to_remove.len()
        )
    }

    async fn apply(&self, tx: &mut dyn StoreTransaction) -> StorageResult<Effect> {
        let current = tx.role_assignments(self.junction, self.entity_id).await?;
        let (to_add, to_remove) = crate::role_sync::role_diff(&self.desired_role_ids, &current);

        let mut granted = 0;
        for role_id in &to_add {
            if tx.grant_role(self.junction, self.entity_id, *role_id).await? {
                granted += 1;
            }
        }
        let mut revoked = 0;
        for role_id in &to_remove {
            if tx.revoke_role(self.junction, self.entity_id, *role_id).await? {
                revoked += 1;
            }
        }
        Ok(Effect::Roles { granted, revoked })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deactivate {
    pub kind: EntityKind,
    pub id: Uuid,
    pub label: String,
}

#[async_trait]
impl PlannedWrite for Deactivate {
    fn describe(&self) -> String {
        format!("would deactivate {} '{}'", self.kind, self.label)
    }

    async fn apply(&self, tx: &mut dyn StoreTransaction) -> StorageResult<Effect> {
        Ok(if tx.set_active(self.kind, self.id, false).await? {
            Effect::Deactivated
        } else {
            Effect::Unchanged
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reactivate {
    pub kind: EntityKind,
    pub id: Uuid,
    pub label: String,
}

#[async_trait]
impl PlannedWrite for Reactivate {
    fn describe(&self) -> String {
        format!("would reactivate {} '{}'", self.kind, self.label)
    }

    async fn apply(&self, tx: &mut dyn StoreTransaction) -> StorageResult<Effect> {
        Ok(if tx.set_active(self.kind, self.id, true).await? {
            Effect::Reactivated
        } else {
            Effect::Unchanged
        })
    }
}

/// Hard delete of a stale child row. Top-level rows are only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delete {
    pub table: String,
    pub id: Uuid,
    pub label: String,
}

#[async_trait]
impl PlannedWrite for Delete {
    fn describe(&self) -> String {
        format!("would delete {} row '{}'", self.table, self.label)
    }

    async fn apply(&self, tx: &mut dyn StoreTransaction) -> StorageResult<Effect> {
        Ok(if tx.delete_child(&self.table, self.id).await? {
            Effect::ChildDeleted
        } else {
            Effect::Unchanged
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteChild {
    pub row: ChildRow,
    pub label: String,
}

#[async_trait]
impl PlannedWrite for WriteChild {
    fn describe(&self) -> String {
        format!("would write {} row '{}'", self.row.table, self.label)
    }

    async fn apply(&self, tx: &mut dyn StoreTransaction) -> StorageResult<Effect> {
        tx.upsert_child(self.row.clone()).await?;
        Ok(Effect::ChildWritten)
    }
}

/// One planned write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Upsert(Upsert),
    SyncRoles(SyncRoles),
    Deactivate(Deactivate),
    Reactivate(Reactivate),
    Delete(Delete),
    WriteChild(WriteChild),
}

impl Operation {
    fn inner(&self) -> &dyn PlannedWrite {
        match self {
            Operation::Upsert(op) => op,
            Operation::SyncRoles(op) => op,
            Operation::Deactivate(op) => op,
            Operation::Reactivate(op) => op,
            Operation::Delete(op) => op,
            Operation::WriteChild(op) => op,
        }
    }

    /// Top-level kind the operation writes, if any.
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Operation::Upsert(op) => Some(op.kind),
            Operation::SyncRoles(op) => Some(op.junction.owner()),
            Operation::Deactivate(op) => Some(op.kind),
            Operation::Reactivate(op) => Some(op.kind),
            Operation::Delete(_) | Operation::WriteChild(_) => None,
        }
    }
}

#[async_trait]
impl PlannedWrite for Operation {
    fn describe(&self) -> String {
        self.inner().describe()
    }

    async fn apply(&self, tx: &mut dyn StoreTransaction) -> StorageResult<Effect> {
        self.inner().apply(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upsert(strategy: UpsertStrategy) -> Upsert {
        Upsert {
            kind: EntityKind::Organization,
            id: Uuid::nil(),
            strategy,
            values: FieldMap::new(),
            is_active: true,
            label: "Acme".to_string(),
        }
    }

    #[test]
    fn upsert_descriptions_name_the_strategy() {
        let created = upsert(UpsertStrategy::New {
            created_by: "git-sync".into(),
        });
        assert_eq!(created.describe(), "would create Organization 'Acme'");

        let updated = upsert(UpsertStrategy::ById);
        assert_eq!(updated.describe(), "would update Organization 'Acme'");

        let existing = Uuid::from_u128(7);
        let reassigned = upsert(UpsertStrategy::ByNaturalKey {
            existing_id: existing,
        });
        assert_eq!(
            reassigned.describe(),
            format!(
                "would update Organization 'Acme' (reassigning id {existing} -> {})",
                Uuid::nil()
            )
        );
    }

    #[test]
    fn toggles_and_roles_describe_their_target() {
        let op = Operation::Deactivate(Deactivate {
            kind: EntityKind::Role,
            id: Uuid::nil(),
            label: "Defunct".into(),
        });
        assert_eq!(op.describe(), "would deactivate Role 'Defunct'");
        assert_eq!(op.kind(), Some(EntityKind::Role));

        let roles = SyncRoles {
            junction: RoleJunction::FormRoles,
            entity_id: Uuid::nil(),
            desired_role_ids: BTreeSet::from([Uuid::from_u128(1)]),
            to_add: BTreeSet::from([Uuid::from_u128(1)]),
            to_remove: BTreeSet::from([Uuid::from_u128(2), Uuid::from_u128(3)]),
            label: "Intake".into(),
        };
        assert_eq!(
            roles.describe(),
            "would sync roles of Form 'Intake' (grant 1, revoke 2)"
        );
    }

    #[test]
    fn operations_serialize_with_a_tag() {
        let op = Operation::Upsert(upsert(UpsertStrategy::ById));
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["op"], json!("upsert"));
        assert_eq!(value["strategy"], json!("by_id"));
        assert_eq!(value["kind"], json!("organization"));
    }
}

//! Role-assignment diffing.

use crate::operation::{Operation, SyncRoles};
use gitsync_store::{StorageResult, Store};
use gitsync_types::RoleJunction;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Splits the grants needed to move `current` to `desired`.
///
/// Returns `(to_add, to_remove)`; roles in both sets are left alone.
pub fn role_diff(
    desired: &BTreeSet<Uuid>,
    current: &BTreeSet<Uuid>,
) -> (BTreeSet<Uuid>, BTreeSet<Uuid>) {
    let to_add = desired.difference(current).copied().collect();
    let to_remove = current.difference(desired).copied().collect();
    (to_add, to_remove)
}

/// Plans role grants for entities that own a junction table.
pub struct RoleSyncer<'a> {
    store: &'a dyn Store,
    renames: Option<&'a HashMap<Uuid, Uuid>>,
}

impl<'a> RoleSyncer<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            renames: None,
        }
    }

    /// Stored role ids that the same pass rewrites to declared ids.
    /// Current grants are compared under their new ids.
    pub fn with_renames(mut self, renames: &'a HashMap<Uuid, Uuid>) -> Self {
        self.renames = Some(renames);
        self
    }

    /// Plans the grants of `entity_id`.
    ///
    /// `stored_id` is the id the entity currently has in the store, which
    /// differs from `entity_id` when a natural-key match is about to be
    /// reassigned and is `None` for a row that does not exist yet. Emits
    /// nothing when the grants already match.
    pub async fn sync(
        &self,
        junction: RoleJunction,
        entity_id: Uuid,
        stored_id: Option<Uuid>,
        label: &str,
        desired: &[Uuid],
    ) -> StorageResult<Vec<Operation>> {
        let desired: BTreeSet<Uuid> = desired.iter().copied().collect();
        let mut current = match stored_id {
            Some(id) => self.store.role_assignments(junction, id).await?,
            None => BTreeSet::new(),
        };
        if let Some(renames) = self.renames {
            current = current
                .into_iter()
                .map(|role| renames.get(&role).copied().unwrap_or(role))
                .collect();
        }

        let (to_add, to_remove) = role_diff(&desired, &current);
        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Operation::SyncRoles(SyncRoles {
            junction,
            entity_id,
            desired_role_ids: desired,
            to_add,
            to_remove,
            label: label.to_string(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitsync_store::{EntityRow, InMemoryStore};
    use gitsync_types::{EntityKind, FieldMap};
    use proptest::prelude::*;
    use serde_json::json;

    fn ids(raw: &[u128]) -> BTreeSet<Uuid> {
        raw.iter().map(|n| Uuid::from_u128(*n)).collect()
    }

    proptest! {
        #[test]
        fn diff_reaches_desired_without_touching_overlap(
            desired in proptest::collection::btree_set(0u128..16, 0..8),
            current in proptest::collection::btree_set(0u128..16, 0..8),
        ) {
            let desired: BTreeSet<Uuid> = desired.into_iter().map(Uuid::from_u128).collect();
            let current: BTreeSet<Uuid> = current.into_iter().map(Uuid::from_u128).collect();
            let (to_add, to_remove) = role_diff(&desired, &current);

            let mut applied = current.clone();
            applied.extend(to_add.iter().copied());
            // After the insert phase, nothing the entity held and still needs is missing.
            for role in desired.intersection(&current) {
                prop_assert!(applied.contains(role));
            }
            for role in &to_remove {
                applied.remove(role);
            }
            prop_assert_eq!(&applied, &desired);
            prop_assert!(to_add.is_disjoint(&current));
            prop_assert!(to_remove.is_disjoint(&desired));
        }
    }

    #[test]
    fn diff_of_equal_sets_is_empty() {
        let (add, remove) = role_diff(&ids(&[1, 2]), &ids(&[2, 1]));
        assert!(add.is_empty());
        assert!(remove.is_empty());
    }

    fn seeded_workflow(store: &InMemoryStore, roles: &[Uuid]) -> Uuid {
        for role in roles {
            let mut fields = FieldMap::new();
            fields.insert("name".into(), json!(role.to_string()));
            store
                .seed(EntityRow::new(EntityKind::Role, *role, fields, "test"))
                .unwrap();
        }
        let id = Uuid::new_v4();
        let mut fields = FieldMap::new();
        fields.insert("path".into(), json!("flows/a.py"));
        fields.insert("function_name".into(), json!("a"));
        store
            .seed(EntityRow::new(EntityKind::Workflow, id, fields, "test"))
            .unwrap();
        for role in roles {
            store
                .seed_grant(RoleJunction::WorkflowRoles, id, *role)
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn matching_grants_emit_nothing() {
        let store = InMemoryStore::new();
        let roles: Vec<Uuid> = ids(&[1, 2]).into_iter().collect();
        let workflow = seeded_workflow(&store, &roles);

        let ops = RoleSyncer::new(&store)
            .sync(RoleJunction::WorkflowRoles, workflow, Some(workflow), "a", &roles)
            .await
            .unwrap();
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn swapped_role_is_added_and_removed() {
        let store = InMemoryStore::new();
        let roles: Vec<Uuid> = ids(&[1, 2]).into_iter().collect();
        let workflow = seeded_workflow(&store, &roles);
        let desired = [Uuid::from_u128(2), Uuid::from_u128(3)];

        let ops = RoleSyncer::new(&store)
            .sync(RoleJunction::WorkflowRoles, workflow, Some(workflow), "a", &desired)
            .await
            .unwrap();
        match ops.as_slice() {
            [Operation::SyncRoles(op)] => {
                assert_eq!(op.to_add, ids(&[3]));
                assert_eq!(op.to_remove, ids(&[1]));
                assert_eq!(op.desired_role_ids, ids(&[2, 3]));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_entity_grants_every_declared_role() {
        let store = InMemoryStore::new();
        let desired = [Uuid::from_u128(5), Uuid::from_u128(5)];
        let ops = RoleSyncer::new(&store)
            .sync(RoleJunction::AgentRoles, Uuid::new_v4(), None, "bot", &desired)
            .await
            .unwrap();
        match ops.as_slice() {
            [Operation::SyncRoles(op)] => assert_eq!(op.to_add, ids(&[5])),
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}

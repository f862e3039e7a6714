use crate::operation::{Deactivate, Operation};
use gitsync_store::{StorageResult, Store};
use gitsync_types::EntityKind;
use std::collections::HashSet;
use uuid::Uuid;

/// Plans deactivation of active rows the manifest no longer declares.
///
/// Rows are never hard-deleted. A row reappearing in a later manifest is
/// reactivated by its resolver.
pub struct DeletionResolver<'a> {
    store: &'a dyn Store,
}

impl<'a> DeletionResolver<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// `retained` holds the ids of `kind` the pass accounts for: declared
    /// ids plus rows claimed by a natural-key match.
    pub async fn plan(
        &self,
        kind: EntityKind,
        retained: &HashSet<Uuid>,
    ) -> StorageResult<Vec<Operation>> {
        Ok(self
            .store
            .list_active(kind)
            .await?
            .into_iter()
            .filter(|row| !retained.contains(&row.id))
            .map(|row| {
                Operation::Deactivate(Deactivate {
                    kind,
                    id: row.id,
                    label: row.label(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitsync_store::{EntityRow, InMemoryStore};
    use gitsync_types::FieldMap;
    use serde_json::json;

    fn org(store: &InMemoryStore, name: &str, active: bool) -> Uuid {
        let id = Uuid::new_v4();
        let mut fields = FieldMap::new();
        fields.insert("name".into(), json!(name));
        store
            .seed(EntityRow::new(EntityKind::Organization, id, fields, "test").with_active(active))
            .unwrap();
        id
    }

    #[tokio::test]
    async fn only_unaccounted_active_rows_are_deactivated() {
        let store = InMemoryStore::new();
        let kept = org(&store, "Kept", true);
        let gone = org(&store, "Gone", true);
        org(&store, "Already", false);

        let retained = HashSet::from([kept]);
        let ops = DeletionResolver::new(&store)
            .plan(EntityKind::Organization, &retained)
            .await
            .unwrap();

        match ops.as_slice() {
            [Operation::Deactivate(op)] => {
                assert_eq!(op.id, gone);
                assert_eq!(op.label, "Gone");
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}

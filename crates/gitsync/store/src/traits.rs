use crate::model::{ChildRow, EntityRow, NaturalKey};
use crate::StorageResult;
use async_trait::async_trait;
use gitsync_types::{EntityKind, FieldMap, RoleJunction};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Read access used while planning a pass.
///
/// Planning never writes, so every method takes `&self` and may run against
/// a pool rather than a transaction.
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Self-identity lookup by primary key, active or not.
    async fn get_row(&self, kind: EntityKind, id: Uuid) -> StorageResult<Option<EntityRow>>;

    /// Lookup by natural key; an active row wins over inactive ones.
    async fn find_by_natural_key(&self, key: &NaturalKey) -> StorageResult<Option<EntityRow>>;

    /// Every active row of a kind.
    async fn list_active(&self, kind: EntityKind) -> StorageResult<Vec<EntityRow>>;

    /// Role ids currently granted to one entity.
    async fn role_assignments(
        &self,
        junction: RoleJunction,
        entity_id: Uuid,
    ) -> StorageResult<BTreeSet<Uuid>>;

    /// Child rows of one table owned by one parent.
    async fn list_children(&self, table: &str, parent_id: Uuid) -> StorageResult<Vec<ChildRow>>;
}

/// Ordered writes against one store transaction.
///
/// Statements run in call order; foreign keys are checked per statement, so
/// callers must write referenced rows first.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn role_assignments(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
    ) -> StorageResult<BTreeSet<Uuid>>;

    async fn insert_row(&mut self, row: EntityRow) -> StorageResult<()>;

    /// Merges `fields` over the stored fields and sets `is_active`.
    async fn update_row(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        fields: &FieldMap,
        is_active: bool,
    ) -> StorageResult<()>;

    /// Rewrites a row's primary key, cascading to every reference.
    async fn reassign_id(&mut self, kind: EntityKind, from: Uuid, to: Uuid) -> StorageResult<()>;

    /// Returns whether the flag changed.
    async fn set_active(&mut self, kind: EntityKind, id: Uuid, active: bool)
        -> StorageResult<bool>;

    /// Insert-or-ignore; returns whether a row was inserted.
    async fn grant_role(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
        role_id: Uuid,
    ) -> StorageResult<bool>;

    /// Returns whether a row was deleted.
    async fn revoke_role(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
        role_id: Uuid,
    ) -> StorageResult<bool>;

    async fn upsert_child(&mut self, row: ChildRow) -> StorageResult<()>;

    /// Returns whether a row was deleted.
    async fn delete_child(&mut self, table: &str, id: Uuid) -> StorageResult<bool>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;

    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// A store that can be read for planning and written transactionally.
#[async_trait]
pub trait Store: StoreReader {
    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>>;
}

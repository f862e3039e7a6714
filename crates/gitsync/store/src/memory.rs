//! In-memory reference implementation of the store traits.
//!
//! This adapter is deterministic and test-friendly. It enforces the same
//! integrity rules as the PostgreSQL schema (per-statement foreign keys,
//! one active row per natural key, cascading id reassignment), and it keeps
//! a journal of committed writes so tests can assert statement order.
//!
//! Transactions work on a copy of the tables and swap it in on commit.
//! Only one transaction is open at a time.

use crate::model::{ChildRow, EntityRow, NaturalKey};
use crate::traits::{Store, StoreReader, StoreTransaction};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use gitsync_types::{EntityKind, FieldMap, RoleJunction, DEPENDENCY_ORDER};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// One committed write, in statement order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Insert { kind: EntityKind, id: Uuid },
    Update { kind: EntityKind, id: Uuid },
    Reassign { kind: EntityKind, from: Uuid, to: Uuid },
    SetActive { kind: EntityKind, id: Uuid, active: bool },
    Grant { junction: RoleJunction, entity_id: Uuid, role_id: Uuid },
    Revoke { junction: RoleJunction, entity_id: Uuid, role_id: Uuid },
    WriteChild { table: String, id: Uuid },
    DeleteChild { table: String, id: Uuid },
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<EntityKind, BTreeMap<Uuid, EntityRow>>,
    grants: BTreeSet<(RoleJunction, Uuid, Uuid)>,
    children: BTreeMap<(String, Uuid), ChildRow>,
}

impl Tables {
    fn get(&self, kind: EntityKind, id: Uuid) -> Option<&EntityRow> {
        self.rows.get(&kind).and_then(|rows| rows.get(&id))
    }

    fn exists(&self, kind: EntityKind, id: Uuid) -> bool {
        self.get(kind, id).is_some()
    }

    fn iter(&self, kind: EntityKind) -> impl Iterator<Item = &EntityRow> {
        self.rows.get(&kind).into_iter().flat_map(|rows| rows.values())
    }

    fn find_by_natural_key(&self, key: &NaturalKey) -> Option<&EntityRow> {
        let mut matches = self.iter(key.kind).filter(|row| key.matches(&row.fields));
        let first = matches.next()?;
        if first.is_active {
            return Some(first);
        }
        Some(matches.find(|row| row.is_active).unwrap_or(first))
    }

    fn role_assignments(&self, junction: RoleJunction, entity_id: Uuid) -> BTreeSet<Uuid> {
        self.grants
            .iter()
            .filter(|(j, e, _)| *j == junction && *e == entity_id)
            .map(|(_, _, role)| *role)
            .collect()
    }

    fn check_references(&self, kind: EntityKind, fields: &FieldMap) -> StorageResult<()> {
        for fk in kind.foreign_keys() {
            let target = match fields.get(fk.field) {
                None | Some(Value::Null) => continue,
                Some(Value::String(raw)) => Uuid::parse_str(raw).map_err(|e| {
                    StorageError::InvalidInput(format!("{kind}.{} is not a uuid: {e}", fk.field))
                })?,
                Some(other) => {
                    return Err(StorageError::InvalidInput(format!(
                        "{kind}.{} must be a uuid string, got {other}",
                        fk.field
                    )))
                }
            };
            if !self.exists(fk.target, target) {
                return Err(StorageError::ForeignKeyViolation(format!(
                    "{kind}.{} references missing {} {target}",
                    fk.field, fk.target
                )));
            }
        }
        Ok(())
    }

    fn check_unique(&self, kind: EntityKind, id: Uuid, fields: &FieldMap) -> StorageResult<()> {
        let key = NaturalKey::from_fields(kind, fields);
        if let Some(other) = self
            .iter(kind)
            .find(|row| row.id != id && row.is_active && key.matches(&row.fields))
        {
            return Err(StorageError::Conflict(format!(
                "{key} is already held by active row {}",
                other.id
            )));
        }
        Ok(())
    }

    fn insert(&mut self, row: EntityRow) -> StorageResult<()> {
        if self.exists(row.kind, row.id) {
            return Err(StorageError::Conflict(format!(
                "{} {} already exists",
                row.kind, row.id
            )));
        }
        self.check_references(row.kind, &row.fields)?;
        if row.is_active {
            self.check_unique(row.kind, row.id, &row.fields)?;
        }
        self.rows.entry(row.kind).or_default().insert(row.id, row);
        Ok(())
    }

    fn update(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        fields: &FieldMap,
        is_active: bool,
    ) -> StorageResult<()> {
        let mut merged = self
            .get(kind, id)
            .ok_or_else(|| StorageError::NotFound(format!("{kind} {id}")))?
            .clone();
        for (name, value) in fields {
            merged.fields.insert(name.clone(), value.clone());
        }
        merged.is_active = is_active;
        merged.updated_at = Utc::now();

        self.check_references(kind, &merged.fields)?;
        if merged.is_active {
            self.check_unique(kind, id, &merged.fields)?;
        }
        self.rows.entry(kind).or_default().insert(id, merged);
        Ok(())
    }

    fn reassign(&mut self, kind: EntityKind, from: Uuid, to: Uuid) -> StorageResult<()> {
        if self.exists(kind, to) {
            return Err(StorageError::Conflict(format!("{kind} {to} already exists")));
        }
        let rows = self.rows.entry(kind).or_default();
        let mut row = rows
            .remove(&from)
            .ok_or_else(|| StorageError::NotFound(format!("{kind} {from}")))?;
        row.id = to;
        row.updated_at = Utc::now();
        rows.insert(to, row);

        let old = Value::String(from.to_string());
        let new = Value::String(to.to_string());
        for referencing in DEPENDENCY_ORDER {
            for fk in referencing.foreign_keys().iter().filter(|fk| fk.target == kind) {
                if let Some(rows) = self.rows.get_mut(&referencing) {
                    for row in rows.values_mut() {
                        if row.fields.get(fk.field) == Some(&old) {
                            row.fields.insert(fk.field.to_string(), new.clone());
                        }
                    }
                }
            }
        }

        let owns_grants = kind.role_junction();
        self.grants = std::mem::take(&mut self.grants)
            .into_iter()
            .map(|(junction, entity, role)| {
                let entity = if Some(junction) == owns_grants && entity == from {
                    to
                } else {
                    entity
                };
                let role = if kind == EntityKind::Role && role == from {
                    to
                } else {
                    role
                };
                (junction, entity, role)
            })
            .collect();

        for child in self.children.values_mut() {
            if child.parent_kind == kind && child.parent_id == from {
                child.parent_id = to;
            }
        }
        Ok(())
    }

    fn set_active(&mut self, kind: EntityKind, id: Uuid, active: bool) -> StorageResult<bool> {
        let row = self
            .get(kind, id)
            .ok_or_else(|| StorageError::NotFound(format!("{kind} {id}")))?;
        if row.is_active == active {
            return Ok(false);
        }
        if active {
            self.check_unique(kind, id, &row.fields)?;
        }
        if let Some(row) = self.rows.get_mut(&kind).and_then(|rows| rows.get_mut(&id)) {
            row.is_active = active;
            row.updated_at = Utc::now();
        }
        Ok(true)
    }

    fn grant(&mut self, junction: RoleJunction, entity_id: Uuid, role_id: Uuid) -> StorageResult<bool> {
        if !self.exists(junction.owner(), entity_id) {
            return Err(StorageError::ForeignKeyViolation(format!(
                "{junction} references missing {} {entity_id}",
                junction.owner()
            )));
        }
        if !self.exists(EntityKind::Role, role_id) {
            return Err(StorageError::ForeignKeyViolation(format!(
                "{junction} references missing Role {role_id}"
            )));
        }
        Ok(self.grants.insert((junction, entity_id, role_id)))
    }

    fn upsert_child(&mut self, row: ChildRow) -> StorageResult<()> {
        if !self.exists(row.parent_kind, row.parent_id) {
            return Err(StorageError::ForeignKeyViolation(format!(
                "{} row {} references missing {} {}",
                row.table, row.id, row.parent_kind, row.parent_id
            )));
        }
        self.children.insert((row.table.clone(), row.id), row);
        Ok(())
    }
}

/// In-memory store adapter.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    journal: Arc<Mutex<Vec<JournalEntry>>>,
    writer: Arc<AsyncMutex<()>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row directly, subject to the usual constraints.
    pub fn seed(&self, row: EntityRow) -> StorageResult<()> {
        self.write_tables()?.insert(row)
    }

    pub fn seed_grant(&self, junction: RoleJunction, entity_id: Uuid, role_id: Uuid) -> StorageResult<()> {
        self.write_tables()?.grant(junction, entity_id, role_id).map(|_| ())
    }

    pub fn seed_child(&self, row: ChildRow) -> StorageResult<()> {
        self.write_tables()?.upsert_child(row)
    }

    /// Every row of a kind, active or not, ordered by id.
    pub fn rows(&self, kind: EntityKind) -> Vec<EntityRow> {
        self.read_tables_lossy().iter(kind).cloned().collect()
    }

    pub fn row(&self, kind: EntityKind, id: Uuid) -> Option<EntityRow> {
        self.read_tables_lossy().get(kind, id).cloned()
    }

    pub fn grants(&self, junction: RoleJunction, entity_id: Uuid) -> BTreeSet<Uuid> {
        self.read_tables_lossy().role_assignments(junction, entity_id)
    }

    pub fn children(&self, table: &str) -> Vec<ChildRow> {
        self.read_tables_lossy()
            .children
            .values()
            .filter(|row| row.table == table)
            .cloned()
            .collect()
    }

    /// Committed writes in statement order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_journal(&self) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn read_tables(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::Backend("store lock poisoned".to_string()))
    }

    fn read_tables_lossy(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::Backend("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl StoreReader for InMemoryStore {
    async fn get_row(&self, kind: EntityKind, id: Uuid) -> StorageResult<Option<EntityRow>> {
        Ok(self.read_tables()?.get(kind, id).cloned())
    }

    async fn find_by_natural_key(&self, key: &NaturalKey) -> StorageResult<Option<EntityRow>> {
        Ok(self.read_tables()?.find_by_natural_key(key).cloned())
    }

    async fn list_active(&self, kind: EntityKind) -> StorageResult<Vec<EntityRow>> {
        Ok(self
            .read_tables()?
            .iter(kind)
            .filter(|row| row.is_active)
            .cloned()
            .collect())
    }

    async fn role_assignments(
        &self,
        junction: RoleJunction,
        entity_id: Uuid,
    ) -> StorageResult<BTreeSet<Uuid>> {
        Ok(self.read_tables()?.role_assignments(junction, entity_id))
    }

    async fn list_children(&self, table: &str, parent_id: Uuid) -> StorageResult<Vec<ChildRow>> {
        Ok(self
            .read_tables()?
            .children
            .values()
            .filter(|row| row.table == table && row.parent_id == parent_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        let guard = self.writer.clone().lock_owned().await;
        let working = self.read_tables()?.clone();
        Ok(Box::new(InMemoryTransaction {
            _guard: guard,
            tables: Arc::clone(&self.tables),
            journal: Arc::clone(&self.journal),
            working,
            pending: Vec::new(),
        }))
    }
}

/// Working copy of the tables, swapped in on commit.
struct InMemoryTransaction {
    _guard: OwnedMutexGuard<()>,
    tables: Arc<RwLock<Tables>>,
    journal: Arc<Mutex<Vec<JournalEntry>>>,
    working: Tables,
    pending: Vec<JournalEntry>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn role_assignments(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
    ) -> StorageResult<BTreeSet<Uuid>> {
        Ok(self.working.role_assignments(junction, entity_id))
    }

    async fn insert_row(&mut self, row: EntityRow) -> StorageResult<()> {
        let (kind, id) = (row.kind, row.id);
        self.working.insert(row)?;
        self.pending.push(JournalEntry::Insert { kind, id });
        Ok(())
    }

    async fn update_row(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        fields: &FieldMap,
        is_active: bool,
    ) -> StorageResult<()> {
        self.working.update(kind, id, fields, is_active)?;
        self.pending.push(JournalEntry::Update { kind, id });
        Ok(())
    }

    async fn reassign_id(&mut self, kind: EntityKind, from: Uuid, to: Uuid) -> StorageResult<()> {
        self.working.reassign(kind, from, to)?;
        debug!(%kind, %from, %to, "reassigned row id");
        self.pending.push(JournalEntry::Reassign { kind, from, to });
        Ok(())
    }

    async fn set_active(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        active: bool,
    ) -> StorageResult<bool> {
        let changed = self.working.set_active(kind, id, active)?;
        if changed {
            self.pending.push(JournalEntry::SetActive { kind, id, active });
        }
        Ok(changed)
    }

    async fn grant_role(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
        role_id: Uuid,
    ) -> StorageResult<bool> {
        let inserted = self.working.grant(junction, entity_id, role_id)?;
        if inserted {
            self.pending.push(JournalEntry::Grant {
                junction,
                entity_id,
                role_id,
            });
        }
        Ok(inserted)
    }

    async fn revoke_role(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
        role_id: Uuid,
    ) -> StorageResult<bool> {
        let removed = self.working.grants.remove(&(junction, entity_id, role_id));
        if removed {
            self.pending.push(JournalEntry::Revoke {
                junction,
                entity_id,
                role_id,
            });
        }
        Ok(removed)
    }

    async fn upsert_child(&mut self, row: ChildRow) -> StorageResult<()> {
        let (table, id) = (row.table.clone(), row.id);
        self.working.upsert_child(row)?;
        self.pending.push(JournalEntry::WriteChild { table, id });
        Ok(())
    }

    async fn delete_child(&mut self, table: &str, id: Uuid) -> StorageResult<bool> {
        let removed = self
            .working
            .children
            .remove(&(table.to_string(), id))
            .is_some();
        if removed {
            self.pending.push(JournalEntry::DeleteChild {
                table: table.to_string(),
                id,
            });
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let this = *self;
        debug!(writes = this.pending.len(), "committing in-memory transaction");
        {
            let mut tables = this
                .tables
                .write()
                .map_err(|_| StorageError::Backend("store lock poisoned".to_string()))?;
            *tables = this.working;
        }
        this.journal
            .lock()
            .map_err(|_| StorageError::Backend("journal lock poisoned".to_string()))?
            .extend(this.pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        debug!(discarded = self.pending.len(), "rolled back in-memory transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::uuid_value;
    use serde_json::json;

    fn org(name: &str) -> EntityRow {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), json!(name));
        EntityRow::new(EntityKind::Organization, Uuid::new_v4(), fields, "test")
    }

    fn role(name: &str, org: Option<Uuid>) -> EntityRow {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), json!(name));
        fields.insert("organization_id".into(), uuid_value(org));
        EntityRow::new(EntityKind::Role, Uuid::new_v4(), fields, "test")
    }

    fn workflow(name: &str, org: Option<Uuid>) -> EntityRow {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), json!(name));
        fields.insert("path".into(), json!(format!("workflows/{name}.py")));
        fields.insert("function_name".into(), json!(name));
        fields.insert("organization_id".into(), uuid_value(org));
        EntityRow::new(EntityKind::Workflow, Uuid::new_v4(), fields, "test")
    }

    #[tokio::test]
    async fn insert_rejects_dangling_reference() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = tx.insert_row(role("Ops", Some(Uuid::new_v4()))).await;
        assert!(matches!(result, Err(StorageError::ForeignKeyViolation(_))));
    }

    #[tokio::test]
    async fn second_active_row_for_natural_key_conflicts() {
        let store = InMemoryStore::new();
        store.seed(org("Acme")).unwrap();
        let result = store.seed(org("Acme"));
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // An inactive duplicate is allowed.
        store.seed(org("Acme").with_active(false)).unwrap();
        assert_eq!(store.rows(EntityKind::Organization).len(), 2);
    }

    #[tokio::test]
    async fn natural_key_lookup_prefers_active_rows() {
        let store = InMemoryStore::new();
        let stale = org("Acme").with_active(false);
        let live = org("Acme");
        store.seed(stale).unwrap();
        store.seed(live.clone()).unwrap();

        let found = store
            .find_by_natural_key(&live.natural_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, live.id);
    }

    #[tokio::test]
    async fn reassign_cascades_to_references_grants_and_children() {
        let store = InMemoryStore::new();
        let acme = org("Acme");
        let ops = role("Ops", Some(acme.id));
        let flow = workflow("onboard", Some(acme.id));
        store.seed(acme.clone()).unwrap();
        store.seed(ops.clone()).unwrap();
        store.seed(flow.clone()).unwrap();
        store
            .seed_grant(RoleJunction::WorkflowRoles, flow.id, ops.id)
            .unwrap();

        let new_org = Uuid::new_v4();
        let new_role = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        tx.reassign_id(EntityKind::Organization, acme.id, new_org)
            .await
            .unwrap();
        tx.reassign_id(EntityKind::Role, ops.id, new_role)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let flow_after = store.row(EntityKind::Workflow, flow.id).unwrap();
        assert_eq!(flow_after.reference("organization_id"), Some(new_org));
        let role_after = store.row(EntityKind::Role, new_role).unwrap();
        assert_eq!(role_after.reference("organization_id"), Some(new_org));
        assert!(store.row(EntityKind::Organization, acme.id).is_none());
        assert_eq!(
            store.grants(RoleJunction::WorkflowRoles, flow.id),
            BTreeSet::from([new_role])
        );
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_row(org("Acme")).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.rows(EntityKind::Organization).is_empty());
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn update_merges_fields_and_keeps_unlisted_ones() {
        let store = InMemoryStore::new();
        let mut acme = org("Acme");
        acme.fields.insert("domain".into(), json!("acme.com"));
        store.seed(acme.clone()).unwrap();

        let mut patch = FieldMap::new();
        patch.insert("name".into(), json!("Acme Corp"));
        let mut tx = store.begin().await.unwrap();
        tx.update_row(EntityKind::Organization, acme.id, &patch, true)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let row = store.row(EntityKind::Organization, acme.id).unwrap();
        assert_eq!(row.fields["name"], json!("Acme Corp"));
        assert_eq!(row.fields["domain"], json!("acme.com"));
    }

    #[tokio::test]
    async fn grant_is_insert_or_ignore_and_journaled_once() {
        let store = InMemoryStore::new();
        let ops = role("Ops", None);
        let flow = workflow("onboard", None);
        store.seed(ops.clone()).unwrap();
        store.seed(flow.clone()).unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx
            .grant_role(RoleJunction::WorkflowRoles, flow.id, ops.id)
            .await
            .unwrap());
        assert!(!tx
            .grant_role(RoleJunction::WorkflowRoles, flow.id, ops.id)
            .await
            .unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.journal().len(), 1);
    }
}

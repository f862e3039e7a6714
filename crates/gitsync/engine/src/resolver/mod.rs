//! Per-kind entity resolvers.
//!
//! Every kind shares one identity algorithm:
//! 1. the declaration's id exists: update in place when a managed field
//!    differs;
//! 2. otherwise a row with the same natural key exists: rewrite its id to
//!    the declaration's id and update it;
//! 3. otherwise create it.
//!
//! Within a kind, writes to existing rows are queued before creates, so a
//! created row can take a natural key that an existing row gives up in the
//! same pass.
//!
//! The per-kind modules supply the field mapping, the protected fields and
//! any kind-specific follow-up (role grants, child rows, content indexing).

mod agent;
mod application;
mod config;
mod event_source;
mod form;
mod integration;
mod organization;
mod role;
mod table;
mod workflow;

use crate::content::{ContentDecl, ContentIndexer, ContentSource};
use crate::error::{SyncResult, SyncWarning};
use crate::operation::{Deactivate, Delete, Operation, Reactivate, Upsert, UpsertStrategy, WriteChild};
use crate::queue::OperationQueue;
use crate::role_sync::RoleSyncer;
use gitsync_store::{field_uuid, uuid_value, ChildRow, NaturalKey, Store};
use gitsync_types::{EntityKind, FieldMap, Manifest, RoleJunction, DEPENDENCY_ORDER};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

/// A declaration the identity algorithm can resolve.
pub(crate) trait Resolvable {
    const KIND: EntityKind;

    fn id(&self) -> Uuid;

    fn label(&self) -> String;

    /// Managed column values, natural-key fields included.
    fn values(&self) -> FieldMap;

    /// Fields owned by the running environment; stripped from every write.
    fn protected(&self) -> &'static [&'static str] {
        &[]
    }

    fn desired_active(&self) -> bool {
        true
    }

    fn managed_values(&self) -> FieldMap {
        let mut values = self.values();
        for field in self.protected() {
            values.remove(*field);
        }
        values
    }
}

/// Planning state threaded through every resolver.
pub(crate) struct PlanContext<'a> {
    pub store: &'a dyn Store,
    pub manifest: &'a Manifest,
    pub origin_marker: &'a str,
    pub content: Option<&'a dyn ContentSource>,
    pub indexer: &'a dyn ContentIndexer,
    pub queue: OperationQueue,
    pub warnings: Vec<SyncWarning>,
    /// Writes to existing rows of the kind being resolved.
    staged: OperationQueue,
    /// Creates of the kind being resolved, with their follow-up writes.
    deferred: OperationQueue,
    deferring: bool,
    declared: HashMap<EntityKind, HashSet<Uuid>>,
    seen: HashMap<EntityKind, HashSet<Uuid>>,
    claimed: HashMap<EntityKind, HashSet<Uuid>>,
    /// Per kind, declared id -> id the matched row still has in the store.
    reassigned: HashMap<EntityKind, HashMap<Uuid, Uuid>>,
}

impl<'a> PlanContext<'a> {
    pub fn new(
        store: &'a dyn Store,
        manifest: &'a Manifest,
        origin_marker: &'a str,
        content: Option<&'a dyn ContentSource>,
        indexer: &'a dyn ContentIndexer,
    ) -> Self {
        let declared = DEPENDENCY_ORDER
            .iter()
            .map(|kind| (*kind, manifest.declared_ids(*kind).into_iter().collect()))
            .collect();
        Self {
            store,
            manifest,
            origin_marker,
            content,
            indexer,
            queue: OperationQueue::new(),
            warnings: Vec::new(),
            staged: OperationQueue::new(),
            deferred: OperationQueue::new(),
            deferring: false,
            declared,
            seen: HashMap::new(),
            claimed: HashMap::new(),
            reassigned: HashMap::new(),
        }
    }

    /// Stages a write for the declaration being resolved.
    pub fn push(&mut self, op: Operation) {
        if self.deferring {
            self.deferred.push(op);
        } else {
            self.staged.push(op);
        }
    }

    /// Moves the kind just resolved into the queue: `deactivations` first,
    /// then writes to existing rows, then creates.
    pub fn seal_kind(&mut self, deactivations: Vec<Operation>) {
        self.queue.extend(deactivations);
        self.queue.extend(std::mem::take(&mut self.staged));
        self.queue.extend(std::mem::take(&mut self.deferred));
        self.deferring = false;
    }

    pub fn warn(&mut self, warning: SyncWarning) {
        warn!(%warning, "sync warning");
        self.warnings.push(warning);
    }

    pub fn declares(&self, kind: EntityKind, id: Uuid) -> bool {
        self.declared.get(&kind).is_some_and(|ids| ids.contains(&id))
    }

    pub fn mark_seen(&mut self, kind: EntityKind, id: Uuid) {
        self.seen.entry(kind).or_default().insert(id);
    }

    /// Ids of `kind` that this pass accounts for: declared, or matched by
    /// natural key and about to take a declared id.
    pub fn retained(&self, kind: EntityKind) -> HashSet<Uuid> {
        let mut ids = self.seen.get(&kind).cloned().unwrap_or_default();
        if let Some(claimed) = self.claimed.get(&kind) {
            ids.extend(claimed.iter().copied());
        }
        ids
    }

    fn can_claim(&self, kind: EntityKind, id: Uuid) -> bool {
        let claimed = self.claimed.get(&kind).is_some_and(|ids| ids.contains(&id));
        !claimed && !self.declares(kind, id)
    }

    fn claim(&mut self, kind: EntityKind, existing_id: Uuid, declared_id: Uuid) {
        self.claimed.entry(kind).or_default().insert(existing_id);
        self.reassigned
            .entry(kind)
            .or_default()
            .insert(declared_id, existing_id);
    }

    /// Rewrites references to rows that are about to take a declared id
    /// back to the id those rows still have in the store.
    fn as_stored(&self, kind: EntityKind, values: &FieldMap) -> FieldMap {
        let mut stored = values.clone();
        for fk in kind.foreign_keys() {
            let existing = field_uuid(values, fk.field).and_then(|declared| {
                self.reassigned
                    .get(&fk.target)
                    .and_then(|ids| ids.get(&declared))
            });
            if let Some(existing) = existing {
                stored.insert(fk.field.to_string(), uuid_value(Some(*existing)));
            }
        }
        stored
    }

    /// Stored role id -> declared role id, for roles being reassigned.
    pub fn role_renames(&self) -> HashMap<Uuid, Uuid> {
        self.reassigned
            .get(&EntityKind::Role)
            .map(|ids| ids.iter().map(|(declared, existing)| (*existing, *declared)).collect())
            .unwrap_or_default()
    }

    fn toggle(&mut self, kind: EntityKind, id: Uuid, label: &str, current: bool, desired: bool) {
        let label = label.to_string();
        match (current, desired) {
            (false, true) => self.push(Operation::Reactivate(Reactivate { kind, id, label })),
            (true, false) => self.push(Operation::Deactivate(Deactivate { kind, id, label })),
            _ => {}
        }
    }
}

/// Runs the resolver for one kind over every declaration of that kind.
pub(crate) async fn resolve_kind(ctx: &mut PlanContext<'_>, kind: EntityKind) -> SyncResult<()> {
    match kind {
        EntityKind::Organization => organization::resolve(ctx).await,
        EntityKind::Role => role::resolve(ctx).await,
        EntityKind::Workflow => workflow::resolve(ctx).await,
        EntityKind::Integration => integration::resolve(ctx).await,
        EntityKind::Config => config::resolve(ctx).await,
        EntityKind::Application => application::resolve(ctx).await,
        EntityKind::Table => table::resolve(ctx).await,
        EntityKind::EventSource => event_source::resolve(ctx).await,
        EntityKind::EventSubscription => event_source::resolve_subscriptions(ctx).await,
        EntityKind::Form => form::resolve(ctx).await,
        EntityKind::Agent => agent::resolve(ctx).await,
    }
}

/// Identity resolution for one declaration.
///
/// Returns the id the row currently has in the store, or `None` when it is
/// about to be created.
pub(crate) async fn resolve_identity<R: Resolvable>(
    ctx: &mut PlanContext<'_>,
    decl: &R,
) -> SyncResult<Option<Uuid>> {
    let kind = R::KIND;
    let id = decl.id();
    let label = decl.label();
    let values = decl.managed_values();
    let stored_view = ctx.as_stored(kind, &values);
    let desired_active = decl.desired_active();
    ctx.mark_seen(kind, id);
    ctx.deferring = false;

    if let Some(row) = ctx.store.get_row(kind, id).await? {
        if differs(&stored_view, &row.fields) {
            debug!(%kind, %id, "matched by id, fields changed");
            ctx.push(Operation::Upsert(Upsert {
                kind,
                id,
                strategy: UpsertStrategy::ById,
                values,
                is_active: row.is_active,
                label: label.clone(),
            }));
        }
        ctx.toggle(kind, id, &label, row.is_active, desired_active);
        return Ok(Some(id));
    }

    let key = NaturalKey::from_fields(kind, &stored_view);
    let candidate = ctx.store.find_by_natural_key(&key).await?;
    if let Some(row) = candidate.filter(|row| ctx.can_claim(kind, row.id)) {
        debug!(%kind, %id, existing_id = %row.id, "matched by natural key");
        ctx.claim(kind, row.id, id);
        ctx.push(Operation::Upsert(Upsert {
            kind,
            id,
            strategy: UpsertStrategy::ByNaturalKey {
                existing_id: row.id,
            },
            values,
            is_active: row.is_active,
            label: label.clone(),
        }));
        ctx.toggle(kind, id, &label, row.is_active, desired_active);
        return Ok(Some(row.id));
    }

    ctx.deferring = true;
    ctx.push(Operation::Upsert(Upsert {
        kind,
        id,
        strategy: UpsertStrategy::New {
            created_by: ctx.origin_marker.to_string(),
        },
        values,
        is_active: desired_active,
        label,
    }));
    Ok(None)
}

fn differs(values: &FieldMap, stored: &FieldMap) -> bool {
    values
        .iter()
        .any(|(name, value)| stored.get(name).unwrap_or(&Value::Null) != value)
}

pub(crate) async fn sync_roles(
    ctx: &mut PlanContext<'_>,
    junction: RoleJunction,
    entity_id: Uuid,
    stored_id: Option<Uuid>,
    label: &str,
    roles: &[Uuid],
) -> SyncResult<()> {
    let renames = ctx.role_renames();
    let ops = RoleSyncer::new(ctx.store)
        .with_renames(&renames)
        .sync(junction, entity_id, stored_id, label, roles)
        .await?;
    for op in ops {
        ctx.push(op);
    }
    Ok(())
}

/// Plans child rows of one parent across the tables it owns.
///
/// Desired rows identical to the stored ones are dropped; stored rows in
/// `tables` that are no longer desired are deleted.
pub(crate) async fn reconcile_children(
    ctx: &mut PlanContext<'_>,
    stored_parent: Option<Uuid>,
    tables: &[String],
    desired: Vec<WriteChild>,
) -> SyncResult<()> {
    let mut current: BTreeMap<(String, Uuid), ChildRow> = BTreeMap::new();
    if let Some(parent_id) = stored_parent {
        for table in tables {
            for row in ctx.store.list_children(table, parent_id).await? {
                current.insert((row.table.clone(), row.id), row);
            }
        }
    }

    for write in desired {
        let stored = current.remove(&(write.row.table.clone(), write.row.id));
        let unchanged = stored.is_some_and(|stored| {
            stored.fields == write.row.fields && stored.parent_id == write.row.parent_id
        });
        if !unchanged {
            ctx.push(Operation::WriteChild(write));
        }
    }

    for ((table, id), stale) in current {
        ctx.push(Operation::Delete(Delete {
            table,
            id,
            label: child_label(&stale),
        }));
    }
    Ok(())
}

/// Reads a form or agent body and plans its indexed child rows.
pub(crate) async fn index_content(
    ctx: &mut PlanContext<'_>,
    decl: ContentDecl<'_>,
    stored_id: Option<Uuid>,
) -> SyncResult<()> {
    let Some(source) = ctx.content else {
        return Ok(());
    };
    let Some(body) = source.read(decl.path()).await? else {
        ctx.warn(SyncWarning::MissingContent {
            kind: decl.kind(),
            id: decl.id(),
            path: decl.path().to_string(),
        });
        return Ok(());
    };

    let mut children = Vec::new();
    for op in ctx.indexer.index(decl, &body)? {
        match op {
            Operation::WriteChild(write) => children.push(write),
            other => ctx.push(other),
        }
    }
    let tables = ctx.indexer.owned_tables(decl.kind());
    reconcile_children(ctx, stored_id, &tables, children).await
}

/// Human label of a child row.
pub(crate) fn child_label(row: &ChildRow) -> String {
    ["name", "entity_name", "entity_id"]
        .iter()
        .find_map(|field| row.fields.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| row.id.to_string())
}

pub(crate) fn fields<const N: usize>(pairs: [(&str, Value); N]) -> FieldMap {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

pub(crate) fn opt_uuid(id: Option<Uuid>) -> Value {
    gitsync_store::uuid_value(id)
}

/// Natural keys of every active declaration, for duplicate detection.
pub(crate) fn declared_natural_keys(manifest: &Manifest) -> Vec<(EntityKind, Uuid, NaturalKey)> {
    fn key_of<R: Resolvable>(decl: &R) -> Option<(EntityKind, Uuid, NaturalKey)> {
        decl.desired_active().then(|| {
            (
                R::KIND,
                decl.id(),
                NaturalKey::from_fields(R::KIND, &decl.managed_values()),
            )
        })
    }

    let mut keys = Vec::new();
    keys.extend(manifest.organizations.iter().filter_map(key_of));
    keys.extend(manifest.roles.iter().filter_map(key_of));
    keys.extend(manifest.workflows.iter().filter_map(key_of));
    keys.extend(manifest.integrations.iter().filter_map(key_of));
    keys.extend(manifest.configs.iter().filter_map(key_of));
    keys.extend(manifest.applications.iter().filter_map(key_of));
    keys.extend(manifest.tables.iter().filter_map(key_of));
    keys.extend(manifest.event_sources.iter().filter_map(key_of));
    keys.extend(event_source::subscriptions(manifest).filter_map(|sub| key_of(&sub)));
    keys.extend(manifest.forms.iter().filter_map(key_of));
    keys.extend(manifest.agents.iter().filter_map(key_of));
    keys
}

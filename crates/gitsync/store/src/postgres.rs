//! PostgreSQL adapter for the gitsync row store.
//!
//! The schema is derived from [`EntityKind`] metadata: one table per kind
//! with typed foreign-key columns, a JSONB `fields` column for everything
//! else, and a partial unique index enforcing one active row per natural
//! key. Every reference to a top-level id is `ON UPDATE CASCADE`, so an id
//! reassignment carries its dependents along. Child rows share one table
//! keyed by `(table_name, id)`; their parent link is rewritten explicitly.

use crate::model::{field_uuid, uuid_value, ChildRow, EntityRow, NaturalKey};
use crate::traits::{Store, StoreReader, StoreTransaction};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use gitsync_types::{EntityKind, FieldMap, RoleJunction, DEPENDENCY_ORDER};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgExecutor, Postgres, Row, Transaction};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

const CHILD_ROWS: &str = "gitsync_child_rows";

/// PostgreSQL-backed row store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and initialize the schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let statements = schema_statements();
        debug!(statements = statements.len(), "initializing gitsync schema");
        for stmt in statements {
            sqlx::query(&stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

/// DDL in creation order: kinds follow their referenced kinds.
fn schema_statements() -> Vec<String> {
    let mut ddl = Vec::new();
    for kind in DEPENDENCY_ORDER {
        let table = kind.table();
        let fk_columns: String = kind
            .foreign_keys()
            .iter()
            .map(|fk| {
                format!(
                    "{} UUID REFERENCES {}(id) ON UPDATE CASCADE,\n",
                    fk.field,
                    fk.target.table()
                )
            })
            .collect();
        ddl.push(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                {fk_columns}
                fields JSONB NOT NULL,
                is_active BOOLEAN NOT NULL,
                created_by TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#
        ));

        let key_exprs: Vec<String> = kind
            .natural_key_fields()
            .iter()
            .map(|field| column_expr(kind, field))
            .collect();
        ddl.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {table}_natural_key ON {table} ({}) \
             NULLS NOT DISTINCT WHERE is_active",
            key_exprs.join(", ")
        ));
    }

    for junction in RoleJunction::ALL {
        ddl.push(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                entity_id UUID NOT NULL REFERENCES {}(id) ON UPDATE CASCADE ON DELETE CASCADE,
                role_id UUID NOT NULL REFERENCES roles(id) ON UPDATE CASCADE ON DELETE CASCADE,
                PRIMARY KEY (entity_id, role_id)
            )
            "#,
            junction.table(),
            junction.owner().table()
        ));
    }

    ddl.push(format!(
        r#"
        CREATE TABLE IF NOT EXISTS {CHILD_ROWS} (
            table_name TEXT NOT NULL,
            id UUID NOT NULL,
            parent_kind TEXT NOT NULL,
            parent_id UUID NOT NULL,
            fields JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (table_name, id)
        )
        "#
    ));
    ddl.push(format!(
        "CREATE INDEX IF NOT EXISTS {CHILD_ROWS}_parent ON {CHILD_ROWS} (table_name, parent_id)"
    ));
    ddl
}

fn is_fk_column(kind: EntityKind, field: &str) -> bool {
    kind.foreign_keys().iter().any(|fk| fk.field == field)
}

/// SQL expression reading one logical field.
fn column_expr(kind: EntityKind, field: &str) -> String {
    if is_fk_column(kind, field) {
        field.to_string()
    } else {
        format!("(fields -> '{field}')")
    }
}

fn select_columns(kind: EntityKind) -> String {
    let mut columns = vec!["id", "fields", "is_active", "created_by", "created_at", "updated_at"];
    columns.extend(kind.foreign_keys().iter().map(|fk| fk.field));
    columns.join(", ")
}

/// Splits a field map into FK column values and the JSONB remainder.
fn encode_fields(kind: EntityKind, fields: &FieldMap) -> StorageResult<(Vec<Option<Uuid>>, Value)> {
    let mut refs = Vec::new();
    for fk in kind.foreign_keys() {
        let value = fields.get(fk.field).unwrap_or(&Value::Null);
        let id = field_uuid(fields, fk.field);
        if id.is_none() && !value.is_null() {
            return Err(StorageError::InvalidInput(format!(
                "{kind}.{} must be a uuid string, got {value}",
                fk.field
            )));
        }
        refs.push(id);
    }
    let rest = fields
        .iter()
        .filter(|(name, _)| !is_fk_column(kind, name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Ok((refs, Value::Object(rest)))
}

fn decode_row(kind: EntityKind, row: &PgRow) -> StorageResult<EntityRow> {
    let stored: Value = row.try_get("fields").map_err(map_decode_error)?;
    let mut fields: FieldMap = match stored {
        Value::Object(map) => map.into_iter().collect(),
        other => {
            return Err(StorageError::Serialization(format!(
                "{kind} fields must be an object, got {other}"
            )))
        }
    };
    for fk in kind.foreign_keys() {
        let id: Option<Uuid> = row.try_get(fk.field).map_err(map_decode_error)?;
        fields.insert(fk.field.to_string(), uuid_value(id));
    }
    Ok(EntityRow {
        kind,
        id: row.try_get("id").map_err(map_decode_error)?,
        fields,
        is_active: row.try_get("is_active").map_err(map_decode_error)?,
        created_by: row.try_get("created_by").map_err(map_decode_error)?,
        created_at: row.try_get("created_at").map_err(map_decode_error)?,
        updated_at: row.try_get("updated_at").map_err(map_decode_error)?,
    })
}

fn decode_child(row: &PgRow) -> StorageResult<ChildRow> {
    let parent_kind: String = row.try_get("parent_kind").map_err(map_decode_error)?;
    let stored: Value = row.try_get("fields").map_err(map_decode_error)?;
    Ok(ChildRow {
        table: row.try_get("table_name").map_err(map_decode_error)?,
        id: row.try_get("id").map_err(map_decode_error)?,
        parent_kind: parse_kind(&parent_kind)?,
        parent_id: row.try_get("parent_id").map_err(map_decode_error)?,
        fields: match stored {
            Value::Object(map) => map.into_iter().collect(),
            _ => FieldMap::new(),
        },
    })
}

fn kind_tag(kind: EntityKind) -> StorageResult<String> {
    match serde_json::to_value(kind) {
        Ok(Value::String(tag)) => Ok(tag),
        Ok(other) => Err(StorageError::Serialization(format!(
            "unexpected kind encoding {other}"
        ))),
        Err(e) => Err(StorageError::Serialization(e.to_string())),
    }
}

fn parse_kind(tag: &str) -> StorageResult<EntityKind> {
    serde_json::from_value(Value::String(tag.to_string()))
        .map_err(|e| StorageError::Serialization(format!("unknown entity kind '{tag}': {e}")))
}

enum Param {
    Uuid(Option<Uuid>),
    Json(Value),
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: Vec<Param>,
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Param::Uuid(id) => query.bind(id),
            Param::Json(value) => query.bind(value),
        };
    }
    query
}

async fn fetch_row<'e, E: PgExecutor<'e>>(
    exec: E,
    kind: EntityKind,
    id: Uuid,
) -> StorageResult<Option<EntityRow>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1",
        select_columns(kind),
        kind.table()
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(map_sqlx_error)?;
    row.map(|row| decode_row(kind, &row)).transpose()
}

async fn fetch_role_assignments<'e, E: PgExecutor<'e>>(
    exec: E,
    junction: RoleJunction,
    entity_id: Uuid,
) -> StorageResult<BTreeSet<Uuid>> {
    let sql = format!("SELECT role_id FROM {} WHERE entity_id = $1", junction.table());
    let rows = sqlx::query(&sql)
        .bind(entity_id)
        .fetch_all(exec)
        .await
        .map_err(map_sqlx_error)?;
    rows.iter()
        .map(|row| row.try_get::<Uuid, _>("role_id").map_err(map_decode_error))
        .collect()
}

async fn row_exists<'e, E: PgExecutor<'e>>(
    exec: E,
    kind: EntityKind,
    id: Uuid,
) -> StorageResult<bool> {
    let sql = format!("SELECT 1 AS present FROM {} WHERE id = $1", kind.table());
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(map_sqlx_error)?;
    Ok(row.is_some())
}

#[async_trait]
impl StoreReader for PostgresStore {
    async fn get_row(&self, kind: EntityKind, id: Uuid) -> StorageResult<Option<EntityRow>> {
        fetch_row(&self.pool, kind, id).await
    }

    async fn find_by_natural_key(&self, key: &NaturalKey) -> StorageResult<Option<EntityRow>> {
        let kind = key.kind;
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for (position, (field, value)) in key.parts.iter().enumerate() {
            let n = position + 1;
            if is_fk_column(kind, field) {
                let id = match value {
                    Value::Null => None,
                    Value::String(raw) => Some(Uuid::parse_str(raw).map_err(|e| {
                        StorageError::InvalidInput(format!("{kind}.{field} is not a uuid: {e}"))
                    })?),
                    other => {
                        return Err(StorageError::InvalidInput(format!(
                            "{kind}.{field} must be a uuid string, got {other}"
                        )))
                    }
                };
                clauses.push(format!("{field} IS NOT DISTINCT FROM ${n}"));
                params.push(Param::Uuid(id));
            } else {
                clauses.push(format!("COALESCE(fields -> '{field}', 'null'::jsonb) = ${n}"));
                params.push(Param::Json(value.clone()));
            }
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY is_active DESC, id LIMIT 1",
            select_columns(kind),
            kind.table(),
            clauses.join(" AND ")
        );
        let row = bind_all(sqlx::query(&sql), params)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(|row| decode_row(kind, &row)).transpose()
    }

    async fn list_active(&self, kind: EntityKind) -> StorageResult<Vec<EntityRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE is_active ORDER BY id",
            select_columns(kind),
            kind.table()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(|row| decode_row(kind, row)).collect()
    }

    async fn role_assignments(
        &self,
        junction: RoleJunction,
        entity_id: Uuid,
    ) -> StorageResult<BTreeSet<Uuid>> {
        fetch_role_assignments(&self.pool, junction, entity_id).await
    }

    async fn list_children(&self, table: &str, parent_id: Uuid) -> StorageResult<Vec<ChildRow>> {
        let rows = sqlx::query(&format!(
            "SELECT table_name, id, parent_kind, parent_id, fields FROM {CHILD_ROWS} \
             WHERE table_name = $1 AND parent_id = $2 ORDER BY id"
        ))
        .bind(table)
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(decode_child).collect()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn role_assignments(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
    ) -> StorageResult<BTreeSet<Uuid>> {
        fetch_role_assignments(&mut *self.tx, junction, entity_id).await
    }

    async fn insert_row(&mut self, row: EntityRow) -> StorageResult<()> {
        let kind = row.kind;
        let (refs, rest) = encode_fields(kind, &row.fields)?;
        let fk_names: Vec<&str> = kind.foreign_keys().iter().map(|fk| fk.field).collect();

        let mut columns = vec!["id", "fields", "is_active", "created_by", "created_at", "updated_at"];
        columns.extend(fk_names.iter().copied());
        let placeholders: Vec<String> = (1..=columns.len()).map(|n| format!("${n}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            kind.table(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql)
            .bind(row.id)
            .bind(rest)
            .bind(row.is_active)
            .bind(&row.created_by)
            .bind(row.created_at)
            .bind(row.updated_at);
        for id in refs {
            query = query.bind(id);
        }
        query
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_row(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        fields: &FieldMap,
        is_active: bool,
    ) -> StorageResult<()> {
        let mut current = fetch_row(&mut *self.tx, kind, id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("{kind} {id}")))?;
        for (name, value) in fields {
            current.fields.insert(name.clone(), value.clone());
        }
        let (refs, rest) = encode_fields(kind, &current.fields)?;

        let mut assignments = vec![
            "fields = $2".to_string(),
            "is_active = $3".to_string(),
            "updated_at = $4".to_string(),
        ];
        for (offset, fk) in kind.foreign_keys().iter().enumerate() {
            assignments.push(format!("{} = ${}", fk.field, offset + 5));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE id = $1",
            kind.table(),
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql)
            .bind(id)
            .bind(rest)
            .bind(is_active)
            .bind(Utc::now());
        for reference in refs {
            query = query.bind(reference);
        }
        query
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn reassign_id(&mut self, kind: EntityKind, from: Uuid, to: Uuid) -> StorageResult<()> {
        let sql = format!(
            "UPDATE {} SET id = $2, updated_at = $3 WHERE id = $1",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(from)
            .bind(to)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("{kind} {from}")));
        }
        debug!(%kind, %from, %to, "reassigned row id");

        sqlx::query(&format!(
            "UPDATE {CHILD_ROWS} SET parent_id = $2 WHERE parent_kind = $3 AND parent_id = $1"
        ))
        .bind(from)
        .bind(to)
        .bind(kind_tag(kind)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn set_active(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        active: bool,
    ) -> StorageResult<bool> {
        let sql = format!(
            "UPDATE {} SET is_active = $2, updated_at = $3 WHERE id = $1 AND is_active <> $2",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if row_exists(&mut *self.tx, kind, id).await? {
            Ok(false)
        } else {
            Err(StorageError::NotFound(format!("{kind} {id}")))
        }
    }

    async fn grant_role(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
        role_id: Uuid,
    ) -> StorageResult<bool> {
        let sql = format!(
            "INSERT INTO {} (entity_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            junction.table()
        );
        let result = sqlx::query(&sql)
            .bind(entity_id)
            .bind(role_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_role(
        &mut self,
        junction: RoleJunction,
        entity_id: Uuid,
        role_id: Uuid,
    ) -> StorageResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE entity_id = $1 AND role_id = $2",
            junction.table()
        );
        let result = sqlx::query(&sql)
            .bind(entity_id)
            .bind(role_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_child(&mut self, row: ChildRow) -> StorageResult<()> {
        if !row_exists(&mut *self.tx, row.parent_kind, row.parent_id).await? {
            return Err(StorageError::ForeignKeyViolation(format!(
                "{} row {} references missing {} {}",
                row.table, row.id, row.parent_kind, row.parent_id
            )));
        }
        let fields = Value::Object(row.fields.into_iter().collect());
        sqlx::query(&format!(
            r#"
            INSERT INTO {CHILD_ROWS} (table_name, id, parent_kind, parent_id, fields, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (table_name, id) DO UPDATE SET
                parent_kind = EXCLUDED.parent_kind,
                parent_id = EXCLUDED.parent_id,
                fields = EXCLUDED.fields,
                updated_at = EXCLUDED.updated_at
            "#
        ))
        .bind(&row.table)
        .bind(row.id)
        .bind(kind_tag(row.parent_kind)?)
        .bind(row.parent_id)
        .bind(fields)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_child(&mut self, table: &str, id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {CHILD_ROWS} WHERE table_name = $1 AND id = $2"
        ))
        .bind(table)
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => return StorageError::Conflict(db_err.message().to_string()),
            Some("23503") => {
                return StorageError::ForeignKeyViolation(db_err.message().to_string())
            }
            _ => {}
        }
    }
    StorageError::Backend(err.to_string())
}

fn map_decode_error(err: sqlx::Error) -> StorageError {
    StorageError::Serialization(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_creates_kinds_before_their_references() {
        let ddl = schema_statements();
        let position = |needle: &str| {
            ddl.iter()
                .position(|stmt| stmt.contains(needle))
                .unwrap_or(usize::MAX)
        };
        assert!(
            position("CREATE TABLE IF NOT EXISTS organizations")
                < position("CREATE TABLE IF NOT EXISTS roles")
        );
        assert!(
            position("CREATE TABLE IF NOT EXISTS roles")
                < position("CREATE TABLE IF NOT EXISTS workflow_roles")
        );
    }

    #[test]
    fn natural_key_index_is_partial_on_active_rows() {
        let ddl = schema_statements();
        let index = ddl
            .iter()
            .find(|stmt| stmt.contains("roles_natural_key ON roles"))
            .unwrap();
        assert!(index.contains("organization_id, (fields -> 'name')"));
        assert!(index.contains("NULLS NOT DISTINCT WHERE is_active"));
    }

    #[test]
    fn encode_splits_references_from_json_fields() {
        let org = Uuid::new_v4();
        let mut fields = FieldMap::new();
        fields.insert("name".into(), json!("Ops"));
        fields.insert("organization_id".into(), uuid_value(Some(org)));

        let (refs, rest) = encode_fields(EntityKind::Role, &fields).unwrap();
        assert_eq!(refs, vec![Some(org)]);
        assert_eq!(rest, json!({"name": "Ops"}));
    }

    #[test]
    fn encode_rejects_malformed_reference() {
        let mut fields = FieldMap::new();
        fields.insert("organization_id".into(), json!("acme"));
        assert!(matches!(
            encode_fields(EntityKind::Role, &fields),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn kind_tags_round_trip_through_serde_names() {
        let tag = kind_tag(EntityKind::EventSource).unwrap();
        assert_eq!(tag, "event_source");
        assert_eq!(parse_kind(&tag).unwrap(), EntityKind::EventSource);
    }
}

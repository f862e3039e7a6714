use chrono::{DateTime, Utc};
use gitsync_types::{EntityKind, FieldMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Child table holding an integration's per-organization mappings.
pub const CHILD_TABLE_MAPPINGS: &str = "integration_mappings";

/// One stored row of a top-level kind.
///
/// Foreign keys live in `fields` as UUID strings (or `null`) under the
/// field names declared by [`EntityKind::foreign_keys`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub kind: EntityKind,
    pub id: Uuid,
    pub fields: FieldMap,
    pub is_active: bool,
    /// Origin marker, e.g. `git-sync` for rows first created by a pull
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRow {
    pub fn new(kind: EntityKind, id: Uuid, fields: FieldMap, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            kind,
            id,
            fields,
            is_active: true,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::from_fields(self.kind, &self.fields)
    }

    /// Human-facing name of the row, falling back to its id.
    pub fn label(&self) -> String {
        self.kind
            .label_field()
            .and_then(|field| self.fields.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn reference(&self, field: &str) -> Option<Uuid> {
        field_uuid(&self.fields, field)
    }
}

/// A row owned by a top-level entity and pruned with hard deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRow {
    pub table: String,
    pub id: Uuid,
    pub parent_kind: EntityKind,
    pub parent_id: Uuid,
    pub fields: FieldMap,
}

/// Natural key of a row: the kind plus the values of its key fields.
///
/// Missing fields compare as `null`, so an unscoped role and a role scoped
/// to no organization share a key.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalKey {
    pub kind: EntityKind,
    pub parts: Vec<(&'static str, Value)>,
}

impl NaturalKey {
    pub fn from_fields(kind: EntityKind, fields: &FieldMap) -> Self {
        let parts = kind
            .natural_key_fields()
            .iter()
            .map(|name| (*name, fields.get(*name).cloned().unwrap_or(Value::Null)))
            .collect();
        Self { kind, parts }
    }

    pub fn matches(&self, fields: &FieldMap) -> bool {
        self.parts
            .iter()
            .all(|(name, value)| fields.get(*name).unwrap_or(&Value::Null) == value)
    }

    /// Stable string form, usable as a map key.
    pub fn canonical(&self) -> String {
        let parts: Vec<String> = self
            .parts
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        format!("{}[{}]", self.kind, parts.join(","))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// JSON form of an optional reference.
pub fn uuid_value(id: Option<Uuid>) -> Value {
    id.map_or(Value::Null, |id| Value::String(id.to_string()))
}

/// Reads a UUID-valued field; `null`, missing and malformed all read as `None`.
pub fn field_uuid(fields: &FieldMap, field: &str) -> Option<Uuid> {
    fields
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn natural_key_treats_missing_scope_as_null() {
        let scoped = NaturalKey::from_fields(
            EntityKind::Role,
            &fields(&[("name", json!("Ops")), ("organization_id", Value::Null)]),
        );
        let unscoped = fields(&[("name", json!("Ops"))]);
        assert!(scoped.matches(&unscoped));
    }

    #[test]
    fn natural_key_distinguishes_scopes() {
        let org = Uuid::new_v4();
        let key = NaturalKey::from_fields(
            EntityKind::Role,
            &fields(&[("name", json!("Ops")), ("organization_id", uuid_value(Some(org)))]),
        );
        assert!(!key.matches(&fields(&[("name", json!("Ops"))])));
        assert!(key.canonical().starts_with("Role[organization_id="));
    }

    #[test]
    fn label_falls_back_to_id() {
        let id = Uuid::new_v4();
        let row = EntityRow::new(EntityKind::EventSubscription, id, FieldMap::new(), "test");
        assert_eq!(row.label(), id.to_string());

        let named = EntityRow::new(
            EntityKind::Organization,
            id,
            fields(&[("name", json!("Acme"))]),
            "test",
        );
        assert_eq!(named.label(), "Acme");
    }

    #[test]
    fn field_uuid_ignores_malformed_values() {
        let id = Uuid::new_v4();
        let map = fields(&[("a", uuid_value(Some(id))), ("b", json!("nope")), ("c", Value::Null)]);
        assert_eq!(field_uuid(&map, "a"), Some(id));
        assert_eq!(field_uuid(&map, "b"), None);
        assert_eq!(field_uuid(&map, "c"), None);
        assert_eq!(field_uuid(&map, "d"), None);
    }
}

//! Backend-facing data model: entity kinds, records, search queries and
//! visibility policies.

use std::fmt;

use serde::Serialize;
use serde_json::{json, Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// EntityKind
// ─────────────────────────────────────────────────────────────────────────────

/// Every entity kind the loader knows how to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Restaurant,
    Menu,
    MenuItem,
    MenuItemPrice,
    ChoiceItem,
    ChoiceItemPrice,
    Tag,
    Size,
    DishType,
    Table,
    Language,
    TableState,
    OrderState,
    User,
}

impl EntityKind {
    /// Backend class name.
    pub fn class_name(self) -> &'static str {
        match self {
            EntityKind::Restaurant => "Restaurant",
            EntityKind::Menu => "Menu",
            EntityKind::MenuItem => "MenuItem",
            EntityKind::MenuItemPrice => "MenuItemPrice",
            EntityKind::ChoiceItem => "ChoiceItem",
            EntityKind::ChoiceItemPrice => "ChoiceItemPrice",
            EntityKind::Tag => "Tag",
            EntityKind::Size => "Size",
            EntityKind::DishType => "DishType",
            EntityKind::Table => "Table",
            EntityKind::Language => "Language",
            EntityKind::TableState => "TableState",
            EntityKind::OrderState => "OrderState",
            EntityKind::User => "_User",
        }
    }

    /// Human-readable name used in log and error messages.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Restaurant => "restaurant",
            EntityKind::Menu => "menu",
            EntityKind::MenuItem => "menu item",
            EntityKind::MenuItemPrice => "menu item price",
            EntityKind::ChoiceItem => "choice item",
            EntityKind::ChoiceItemPrice => "choice item price",
            EntityKind::Tag => "tag",
            EntityKind::Size => "size",
            EntityKind::DishType => "dish type",
            EntityKind::Table => "table",
            EntityKind::Language => "language",
            EntityKind::TableState => "table state",
            EntityKind::OrderState => "order state",
            EntityKind::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

/// The account on whose behalf rows are owned and maintained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub username: String,
}

/// Wire form of a reference to a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPointer {
    #[serde(rename = "__type")]
    pub pointer_type: &'static str,
    pub class_name: &'static str,
    pub object_id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }

    pub fn pointer(&self) -> UserPointer {
        UserPointer {
            pointer_type: "Pointer",
            class_name: EntityKind::User.class_name(),
            object_id: self.id.clone(),
        }
    }

    pub fn pointer_value(&self) -> Value {
        json!({
            "__type": "Pointer",
            "className": EntityKind::User.class_name(),
            "objectId": self.id,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// A stored entity: its identifier plus every field the backend returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Looks up a field by dotted path (e.g. `name.en_NZ`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.fields, path)
    }

    /// Looks up a string field by dotted path.
    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    /// Returns the object id of a pointer-valued field.
    pub fn pointer_id(&self, field: &str) -> Option<&str> {
        self.get_path(field)
            .and_then(|v| v.get("objectId"))
            .and_then(Value::as_str)
    }
}

/// Resolves a dotted path against a JSON object.
pub(crate) fn lookup_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

// ─────────────────────────────────────────────────────────────────────────────
// SearchQuery
// ─────────────────────────────────────────────────────────────────────────────

/// Field holding the owning actor for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorField {
    OwnedBy,
    AddedBy,
}

impl ActorField {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorField::OwnedBy => "ownedByUser",
            ActorField::AddedBy => "addedByUser",
        }
    }
}

/// Restricts a search to records owned by one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorScope {
    pub field: ActorField,
    pub actor_id: String,
}

/// Field name marking a record as superseded.
pub const REMOVED_BY_FIELD: &str = "removedByUser";

/// Search criteria understood by every [`EntityService`](super::EntityService).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub kind: EntityKind,
    pub scope: Option<ActorScope>,
    /// Exact-match conditions, keyed by dotted field path.
    pub conditions: Vec<(String, Value)>,
    /// Skip records carrying a `removedByUser` marker.
    pub exclude_removed: bool,
}

impl SearchQuery {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            scope: None,
            conditions: Vec::new(),
            exclude_removed: false,
        }
    }

    pub fn scoped(mut self, field: ActorField, actor: &Actor) -> Self {
        self.scope = Some(ActorScope {
            field,
            actor_id: actor.id.clone(),
        });
        self
    }

    pub fn matching(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    pub fn active_only(mut self) -> Self {
        self.exclude_removed = true;
        self
    }

    /// Evaluates the query against a record held in memory.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(scope) = &self.scope {
            if record.pointer_id(scope.field.as_str()) != Some(scope.actor_id.as_str()) {
                return false;
            }
        }

        if self.exclude_removed && record.fields.contains_key(REMOVED_BY_FIELD) {
            return false;
        }

        self.conditions
            .iter()
            .all(|(path, expected)| record.get_path(path) == Some(expected))
    }

    /// Renders the query as a Parse `where` clause.
    pub fn to_where(&self) -> Value {
        let mut clause = Map::new();

        if let Some(scope) = &self.scope {
            clause.insert(
                scope.field.as_str().to_string(),
                json!({
                    "__type": "Pointer",
                    "className": EntityKind::User.class_name(),
                    "objectId": scope.actor_id,
                }),
            );
        }

        for (path, value) in &self.conditions {
            clause.insert(path.clone(), value.clone());
        }

        if self.exclude_removed {
            clause.insert(REMOVED_BY_FIELD.to_string(), json!({ "$exists": false }));
        }

        Value::Object(clause)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// VisibilityPolicy
// ─────────────────────────────────────────────────────────────────────────────

/// Role granted administrative access to catalog data.
const ADMINISTRATORS_ROLE: &str = "administrators";

/// Read/write policy attached to a record when it is created.
///
/// The engine passes this through untouched; only the backend interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityPolicy {
    pub public_read: bool,
    pub role_read: Vec<String>,
    pub role_write: Vec<String>,
}

impl VisibilityPolicy {
    /// Anyone may read; only the owner may write.
    pub fn public_read() -> Self {
        Self {
            public_read: true,
            role_read: Vec::new(),
            role_write: Vec::new(),
        }
    }

    /// Anyone may read; administrators may write.
    pub fn public_read_admin_write() -> Self {
        Self {
            public_read: true,
            role_read: Vec::new(),
            role_write: vec![ADMINISTRATORS_ROLE.to_string()],
        }
    }

    /// Anyone may read; administrators may read and write.
    pub fn public_read_admin_read_write() -> Self {
        Self {
            public_read: true,
            role_read: vec![ADMINISTRATORS_ROLE.to_string()],
            role_write: vec![ADMINISTRATORS_ROLE.to_string()],
        }
    }

    /// Renders the policy as a Parse ACL. The owner always gets read and write.
    pub fn to_acl(&self, owner: Option<&Actor>) -> Value {
        let mut acl = Map::new();

        if let Some(owner) = owner {
            acl.insert(owner.id.clone(), json!({ "read": true, "write": true }));
        }

        if self.public_read {
            acl.insert("*".to_string(), json!({ "read": true }));
        }

        for role in &self.role_read {
            grant(&mut acl, format!("role:{}", role), "read");
        }
        for role in &self.role_write {
            grant(&mut acl, format!("role:{}", role), "write");
        }

        Value::Object(acl)
    }
}

fn grant(acl: &mut Map<String, Value>, key: String, permission: &str) {
    let entry = acl.entry(key).or_insert_with(|| json!({}));
    if let Some(obj) = entry.as_object_mut() {
        obj.insert(permission.to_string(), Value::Bool(true));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

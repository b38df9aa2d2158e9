//! Entity importers.
//!
//! Each importer describes one CSV layout: its columns, which column names
//! the actor, the collections to cache per actor, and how a row turns into
//! an [`UpsertRequest`]. Planning is synchronous; every remote read it
//! needs comes from the actor cache.

pub mod accounts;
pub mod catalog;
pub mod payload;
pub mod prices;
pub mod reference_data;

use crate::backend::{Actor, ActorField, EntityKind, SearchQuery, VisibilityPolicy};
use crate::engine::localize::{column_name, compose, localized_columns};
use crate::engine::{ActorBundle, CollectionLoader, LocalizedField, Lookup, UpsertPolicy, UpsertRequest};
use crate::error::RowError;
use crate::tabular::ExtractedValues;

pub use payload::EntityPayload;

/// Column naming the actor in actor-scoped layouts.
pub const USERNAME_COLUMN: &str = "username";

/// Rows per chunk unless an importer says otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Importer trait
// ─────────────────────────────────────────────────────────────────────────────

/// One importable entity kind.
pub trait Importer: Send + Sync {
    /// Entity name as given on the command line.
    fn command(&self) -> &'static str;

    fn kind(&self) -> EntityKind;

    /// Column schema, in file order.
    fn columns(&self, languages: &[String]) -> Vec<String>;

    /// Column holding the actor username, or `None` for global kinds.
    fn actor_column(&self) -> Option<&'static str> {
        Some(USERNAME_COLUMN)
    }

    /// Collections cached once per actor before rows run.
    fn shared_collections(&self) -> Vec<CollectionLoader> {
        Vec::new()
    }

    fn default_chunk_size(&self) -> usize {
        DEFAULT_CHUNK_SIZE
    }

    /// Builds the write for one row.
    fn plan(&self, input: &RowInput<'_>) -> Result<UpsertRequest, RowError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// RowInput
// ─────────────────────────────────────────────────────────────────────────────

/// A row's extracted values plus its actor's cached data.
#[derive(Debug, Clone, Copy)]
pub struct RowInput<'a> {
    pub values: &'a ExtractedValues,
    pub bundle: Option<&'a ActorBundle>,
    pub languages: &'a [String],
}

impl<'a> RowInput<'a> {
    /// The actor bundle; actor-scoped importers always get one.
    pub fn bundle(&self) -> Result<&'a ActorBundle, RowError> {
        self.bundle.ok_or_else(|| RowError::MissingValue {
            column: USERNAME_COLUMN.to_string(),
        })
    }

    pub fn primary_language(&self) -> &'a str {
        self.languages.first().map(String::as_str).unwrap_or("en_NZ")
    }

    /// Dotted path of the primary-language name, e.g. `name.en_NZ`.
    pub fn name_path(&self) -> String {
        format!("name.{}", self.primary_language())
    }

    /// The primary-language name, which identifies the entity.
    pub fn primary_name(&self) -> Result<&'a str, RowError> {
        self.values
            .require(&column_name(self.primary_language(), "name"))
    }

    pub fn localized(&self, base: &str) -> LocalizedField {
        compose(base, self.values, self.languages)
    }

    pub fn optional(&self, column: &str) -> Option<String> {
        self.values.owned(column)
    }

    pub fn require(&self, column: &str) -> Result<&'a str, RowError> {
        self.values.require(column)
    }

    /// Raw `|`-list cell; a missing cell reads as an empty list.
    pub fn list(&self, column: &str) -> &'a str {
        self.values.get(column).unwrap_or("")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers shared by importers
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a column schema from plain and localized column groups.
pub(crate) struct Columns {
    names: Vec<String>,
}

impl Columns {
    pub(crate) fn new() -> Self {
        Self { names: Vec::new() }
    }

    pub(crate) fn plain(mut self, name: &str) -> Self {
        self.names.push(name.to_string());
        self
    }

    pub(crate) fn localized(mut self, base: &str, languages: &[String]) -> Self {
        self.names.extend(localized_columns(base, languages));
        self
    }

    pub(crate) fn build(self) -> Vec<String> {
        self.names
    }
}

/// Upsert of an owned entity matched by its primary-language name.
pub(crate) fn owned_by_name(
    input: &RowInput<'_>,
    kind: EntityKind,
    payload: EntityPayload,
    visibility: VisibilityPolicy,
) -> Result<UpsertRequest, RowError> {
    let actor = &input.bundle()?.actor;
    let name = input.primary_name()?;
    let path = input.name_path();

    let existing = SearchQuery::new(kind)
        .scoped(ActorField::OwnedBy, actor)
        .matching(path.as_str(), name);
    let lookup = Lookup::new(kind, Some(actor), path, name);

    request(kind, existing, lookup, payload, UpsertPolicy::Merge, Some(visibility), Some(actor))
}

pub(crate) fn request(
    kind: EntityKind,
    existing: SearchQuery,
    lookup: Lookup,
    payload: EntityPayload,
    policy: UpsertPolicy,
    visibility: Option<VisibilityPolicy>,
    owner: Option<&Actor>,
) -> Result<UpsertRequest, RowError> {
    Ok(UpsertRequest {
        kind,
        existing,
        lookup,
        merge_keys: payload.merge_keys(),
        compare_keys: payload.compare_keys(),
        payload: payload.into_fields()?,
        policy,
        visibility,
        owner: owner.cloned(),
    })
}

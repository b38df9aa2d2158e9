//! Reference resolution: turns a human-readable name into exactly one
//! stored record, or a row error naming what went wrong.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use tracing::debug;

use super::sort_order::compute_order;
use crate::backend::{Actor, EntityKind, Record, SearchQuery};
use crate::context::ImportContext;
use crate::error::{AppError, RowError};

// ─────────────────────────────────────────────────────────────────────────────
// Lookup context
// ─────────────────────────────────────────────────────────────────────────────

/// What was being looked up, carried into not-found and ambiguity errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub kind: EntityKind,
    pub actor: Option<String>,
    pub field: String,
    pub value: String,
}

impl Lookup {
    pub fn new(
        kind: EntityKind,
        actor: Option<&Actor>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            actor: actor.map(|a| a.username.clone()),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_found(&self) -> RowError {
        RowError::NotFound {
            kind: self.kind,
            actor: self.actor.clone(),
            field: self.field.clone(),
            value: self.value.clone(),
        }
    }

    /// Wraps a failed backend call made while handling this lookup.
    pub fn remote(&self, source: AppError) -> RowError {
        RowError::Remote {
            kind: self.kind,
            actor: self.actor.clone(),
            field: self.field.clone(),
            value: self.value.clone(),
            source,
        }
    }

    pub fn ambiguous(&self, ids: Vec<String>) -> RowError {
        RowError::Ambiguous {
            kind: self.kind,
            actor: self.actor.clone(),
            field: self.field.clone(),
            value: self.value.clone(),
            ids,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of matching a candidate set against one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    NotFound,
    Found(T),
    Ambiguous(Vec<T>),
}

impl<T> Resolution<T> {
    /// Zero, one or many. Applied the same way to every entity kind.
    pub fn classify(mut candidates: Vec<T>) -> Self {
        match candidates.len() {
            0 => Resolution::NotFound,
            1 => match candidates.pop() {
                Some(only) => Resolution::Found(only),
                None => Resolution::NotFound,
            },
            _ => Resolution::Ambiguous(candidates),
        }
    }
}

impl<T: Borrow<Record>> Resolution<T> {
    /// Requires exactly one candidate.
    pub fn require(self, lookup: &Lookup) -> Result<T, RowError> {
        match self {
            Resolution::Found(record) => Ok(record),
            Resolution::NotFound => Err(lookup.not_found()),
            Resolution::Ambiguous(candidates) => Err(lookup.ambiguous(ids_of(&candidates))),
        }
    }
}

/// Identifiers of a candidate set, in the order returned.
pub fn ids_of<T: Borrow<Record>>(candidates: &[T]) -> Vec<String> {
    candidates.iter().map(|c| c.borrow().id.clone()).collect()
}

/// Searches the remote store and classifies the result.
pub async fn resolve_remote(
    ctx: &ImportContext,
    query: &SearchQuery,
) -> Result<Resolution<Record>, AppError> {
    let candidates = ctx.service.search(&ctx.session, query).await?;
    debug!(
        "[IMPORT] {} candidates for {} lookup",
        candidates.len(),
        query.kind
    );
    Ok(Resolution::classify(candidates))
}

/// Classifies the cached records whose `field` equals `value` exactly.
pub fn resolve_cached<'a>(records: &'a [Record], field: &str, value: &str) -> Resolution<&'a Record> {
    Resolution::classify(
        records
            .iter()
            .filter(|record| record.str_at(field) == Some(value))
            .collect(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Multi-reference fields
// ─────────────────────────────────────────────────────────────────────────────

/// Splits a `|`-delimited list, trimming segments and dropping empty ones.
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves every listed name to one cached record.
///
/// Returns `(record, name)` pairs in list order, without repeating a record
/// listed twice. Any segment that is missing or ambiguous fails the whole
/// list.
pub fn resolve_names<'a>(
    records: &'a [Record],
    kind: EntityKind,
    actor: Option<&Actor>,
    field: &str,
    names: &[String],
) -> Result<Vec<(&'a Record, String)>, RowError> {
    let mut resolved: Vec<(&Record, String)> = Vec::with_capacity(names.len());

    for name in names {
        let lookup = Lookup::new(kind, actor, field, name.as_str());
        let record = resolve_cached(records, field, name).require(&lookup)?;
        if !resolved.iter().any(|(r, _)| r.id == record.id) {
            resolved.push((record, name.clone()));
        }
    }

    Ok(resolved)
}

/// Resolved identifiers of a multi-reference field plus their sort order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRefs {
    pub ids: Vec<String>,
    pub sort_order: BTreeMap<String, usize>,
}

impl ResolvedRefs {
    pub fn from_pairs(names: &[String], pairs: &[(String, String)]) -> Self {
        Self {
            ids: pairs.iter().map(|(id, _)| id.clone()).collect(),
            sort_order: compute_order(names, pairs),
        }
    }
}

/// Splits and resolves a raw `|`-list against cached records.
pub fn resolve_refs(
    records: &[Record],
    kind: EntityKind,
    actor: Option<&Actor>,
    field: &str,
    raw: &str,
) -> Result<ResolvedRefs, RowError> {
    let names = split_names(raw);
    let pairs: Vec<(String, String)> = resolve_names(records, kind, actor, field, &names)?
        .into_iter()
        .map(|(record, name)| (record.id.clone(), name))
        .collect();
    Ok(ResolvedRefs::from_pairs(&names, &pairs))
}

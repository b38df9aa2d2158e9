//! Create, update or supersede one entity, depending on what already exists.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::resolve::{ids_of, resolve_remote, Lookup, Resolution};
use crate::backend::{Actor, EntityKind, Record, SearchQuery, VisibilityPolicy, REMOVED_BY_FIELD};
use crate::context::ImportContext;
use crate::error::RowError;

// ─────────────────────────────────────────────────────────────────────────────
// Request / outcome
// ─────────────────────────────────────────────────────────────────────────────

/// How an existing match is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPolicy {
    /// Merge the payload onto the single match.
    Merge,
    /// Mark the single match removed, then create a fresh record. A match
    /// whose compared values already equal the payload is left alone.
    Supersede,
    /// Create when absent; leave a single match untouched.
    CreateIfAbsent,
}

/// Everything needed to write one row's entity.
#[derive(Debug, Clone)]
pub struct UpsertRequest {
    pub kind: EntityKind,
    /// Finds the existing record(s) this row corresponds to.
    pub existing: SearchQuery,
    /// Describes `existing` in error messages.
    pub lookup: Lookup,
    /// Fields to write.
    pub payload: Map<String, Value>,
    /// Payload keys whose object values merge per key instead of replacing.
    pub merge_keys: &'static [&'static str],
    /// Keys compared before superseding; equal values leave the match as is.
    pub compare_keys: &'static [&'static str],
    pub policy: UpsertPolicy,
    /// Attached on create only.
    pub visibility: Option<VisibilityPolicy>,
    /// Owner of newly created records.
    pub owner: Option<Actor>,
}

/// What happened to a row's entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(String),
    Updated(String),
    Superseded { previous: String, created: String },
    Unchanged(String),
}

impl UpsertOutcome {
    /// Identifier of the record now current for the row.
    pub fn id(&self) -> &str {
        match self {
            UpsertOutcome::Created(id)
            | UpsertOutcome::Updated(id)
            | UpsertOutcome::Unchanged(id) => id,
            UpsertOutcome::Superseded { created, .. } => created,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Merge
// ─────────────────────────────────────────────────────────────────────────────

/// Overlays `incoming` onto `existing`.
///
/// New values win and fields absent from `incoming` keep their prior value.
/// For keys in `merge_keys`, two objects merge one level deep so a sparse
/// localized map does not wipe languages it did not mention.
pub fn merge_fields(
    existing: &mut Map<String, Value>,
    incoming: Map<String, Value>,
    merge_keys: &[&str],
) {
    for (key, value) in incoming {
        match (existing.get_mut(&key), value) {
            (Some(Value::Object(current)), Value::Object(update))
                if merge_keys.contains(&key.as_str()) =>
            {
                current.extend(update);
            }
            (_, value) => {
                existing.insert(key, value);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves the existing record(s) and issues the write the policy calls for.
///
/// Multiple matches are a data error and nothing is written.
pub async fn upsert(ctx: &ImportContext, request: UpsertRequest) -> Result<UpsertOutcome, RowError> {
    let UpsertRequest {
        kind,
        existing,
        lookup,
        payload,
        merge_keys,
        compare_keys,
        policy,
        visibility,
        owner,
    } = request;

    let resolution = resolve_remote(ctx, &existing)
        .await
        .map_err(|e| lookup.remote(e))?;

    match resolution {
        Resolution::NotFound => {
            let created = create(ctx, &lookup, payload, visibility.as_ref(), owner.as_ref()).await?;
            Ok(UpsertOutcome::Created(created.id))
        }

        Resolution::Found(record) => match policy {
            UpsertPolicy::Merge => {
                let mut merged = record;
                merge_fields(&mut merged.fields, payload, merge_keys);
                let updated = ctx
                    .service
                    .update(&ctx.session, kind, &merged)
                    .await
                    .map_err(|e| lookup.remote(e))?;
                debug!("[IMPORT] Updated {} {}", kind, updated.id);
                Ok(UpsertOutcome::Updated(updated.id))
            }

            UpsertPolicy::Supersede if same_values(&record.fields, &payload, compare_keys) => {
                debug!("[IMPORT] {} {} already current", kind, record.id);
                Ok(UpsertOutcome::Unchanged(record.id))
            }

            UpsertPolicy::Supersede => {
                let previous = mark_removed(ctx, &lookup, record, owner.as_ref()).await?;
                let created = create(ctx, &lookup, payload, visibility.as_ref(), owner.as_ref()).await?;
                Ok(UpsertOutcome::Superseded {
                    previous: previous.id,
                    created: created.id,
                })
            }

            UpsertPolicy::CreateIfAbsent => Ok(UpsertOutcome::Unchanged(record.id)),
        },

        Resolution::Ambiguous(candidates) => {
            warn!(
                "[IMPORT] {} matches for {} {} '{}'; not writing",
                candidates.len(),
                kind,
                lookup.field,
                lookup.value
            );
            Err(lookup.ambiguous(ids_of(&candidates)))
        }
    }
}

/// True when every key in `keys` holds the same value in both maps.
///
/// Numbers compare by value, so `13` stored by the server equals an
/// incoming `13.0`. A key absent from both sides counts as equal.
pub fn same_values(existing: &Map<String, Value>, incoming: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().all(|key| match (existing.get(*key), incoming.get(*key)) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    })
}

async fn create(
    ctx: &ImportContext,
    lookup: &Lookup,
    payload: Map<String, Value>,
    visibility: Option<&VisibilityPolicy>,
    owner: Option<&Actor>,
) -> Result<Record, RowError> {
    let created = ctx
        .service
        .create(&ctx.session, lookup.kind, payload, visibility, owner)
        .await
        .map_err(|e| lookup.remote(e))?;
    debug!("[IMPORT] Created {} {}", lookup.kind, created.id);
    Ok(created)
}

/// Sets the removal marker to the acting actor and writes it back.
async fn mark_removed(
    ctx: &ImportContext,
    lookup: &Lookup,
    mut record: Record,
    actor: Option<&Actor>,
) -> Result<Record, RowError> {
    let marker = actor.map(Actor::pointer_value).unwrap_or(Value::Bool(true));
    record.fields.insert(REMOVED_BY_FIELD.to_string(), marker);
    let updated = ctx
        .service
        .update(&ctx.session, lookup.kind, &record)
        .await
        .map_err(|e| lookup.remote(e))?;
    debug!("[IMPORT] Superseded {} {}", lookup.kind, updated.id);
    Ok(updated)
}

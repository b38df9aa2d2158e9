//! Per-actor lookups resolved once before any row runs.
//!
//! Rows for the same actor need the same actor record and the same shared
//! collections (tags, menus, sizes...). Building them once per distinct
//! actor turns O(rows) remote calls into O(actors).

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use crate::backend::{Actor, ActorField, EntityKind, Record, SearchQuery};
use crate::context::ImportContext;
use crate::error::AppError;
use crate::tabular::{ColumnSchema, Row};

// ─────────────────────────────────────────────────────────────────────────────
// Loaders and bundles
// ─────────────────────────────────────────────────────────────────────────────

/// One shared collection to pre-fetch for every actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionLoader {
    pub kind: EntityKind,
    /// Field linking records of `kind` to their actor.
    pub field: ActorField,
    /// Skip superseded records.
    pub active_only: bool,
}

impl CollectionLoader {
    /// Records owned by the actor.
    pub const fn owned(kind: EntityKind) -> Self {
        Self {
            kind,
            field: ActorField::OwnedBy,
            active_only: false,
        }
    }

    /// Active records added by the actor (price history kinds).
    pub const fn added_active(kind: EntityKind) -> Self {
        Self {
            kind,
            field: ActorField::AddedBy,
            active_only: true,
        }
    }

    fn query(&self, actor: &Actor) -> SearchQuery {
        let query = SearchQuery::new(self.kind).scoped(self.field, actor);
        if self.active_only {
            query.active_only()
        } else {
            query
        }
    }
}

/// An actor plus the collections pre-fetched for it.
#[derive(Debug, Clone)]
pub struct ActorBundle {
    pub actor: Actor,
    collections: HashMap<EntityKind, Vec<Record>>,
}

impl ActorBundle {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            collections: HashMap::new(),
        }
    }

    pub fn with_collection(mut self, kind: EntityKind, records: Vec<Record>) -> Self {
        self.collections.insert(kind, records);
        self
    }

    /// Cached records of `kind`. Empty when the kind was never loaded.
    pub fn collection(&self, kind: EntityKind) -> &[Record] {
        self.collections
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ActorCache
// ─────────────────────────────────────────────────────────────────────────────

/// Username to bundle. `None` records an actor the backend does not know.
///
/// Built once and read-only afterwards.
#[derive(Debug, Default)]
pub struct ActorCache {
    bundles: HashMap<String, Option<ActorBundle>>,
}

impl ActorCache {
    /// Distinct values of `column` across non-blank rows, in first-seen order.
    pub fn distinct_actors(rows: &[Row], schema: &ColumnSchema, column: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        rows.iter()
            .filter(|row| !row.is_blank())
            .filter_map(|row| schema.extract(row).owned(column))
            .filter(|username| seen.insert(username.clone()))
            .collect()
    }

    /// Resolves every actor and its collections, concurrently across actors.
    ///
    /// # Errors
    ///
    /// Any failed remote call fails the whole build; the run cannot start
    /// without a complete cache.
    pub async fn build(
        ctx: &ImportContext,
        usernames: Vec<String>,
        loaders: &[CollectionLoader],
    ) -> Result<Self, AppError> {
        let start = Instant::now();
        let actor_count = usernames.len();

        let entries = try_join_all(
            usernames
                .into_iter()
                .map(|username| load_bundle(ctx, username, loaders)),
        )
        .await?;

        let cache = Self {
            bundles: entries.into_iter().collect(),
        };

        info!(
            "[CACHE] Resolved {} actors ({} unknown) with {} shared collections in {:?}",
            actor_count,
            cache.unknown_actors().count(),
            loaders.len(),
            start.elapsed()
        );

        Ok(cache)
    }

    /// The bundle for `username`, or `None` if the actor is unknown or was
    /// never scanned.
    pub fn get(&self, username: &str) -> Option<&ActorBundle> {
        self.bundles.get(username).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    fn unknown_actors(&self) -> impl Iterator<Item = &str> {
        self.bundles
            .iter()
            .filter(|(_, bundle)| bundle.is_none())
            .map(|(username, _)| username.as_str())
    }
}

async fn load_bundle(
    ctx: &ImportContext,
    username: String,
    loaders: &[CollectionLoader],
) -> Result<(String, Option<ActorBundle>), AppError> {
    let Some(actor) = ctx.service.find_actor(&ctx.session, &username).await? else {
        info!("[CACHE] No user found with username {}", username);
        return Ok((username, None));
    };

    let collections = try_join_all(loaders.iter().map(|loader| {
        let query = loader.query(&actor);
        async move {
            let records = ctx.service.search(&ctx.session, &query).await?;
            Ok::<_, AppError>((loader.kind, records))
        }
    }))
    .await?;

    let mut bundle = ActorBundle::new(actor);
    for (kind, records) in collections {
        debug!(
            "[CACHE] {} {} records cached for {}",
            records.len(),
            kind,
            username
        );
        bundle = bundle.with_collection(kind, records);
    }

    Ok((username, Some(bundle)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, Session};
    use serde_json::json;
    use std::sync::Arc;

    fn owned_tag(owner: &Actor, id: &str, name: &str) -> Record {
        Record::new(
            id,
            json!({ "ownedByUser": owner.pointer_value(), "name": { "en_NZ": name } })
                .as_object()
                .cloned()
                .unwrap(),
        )
    }

    #[test]
    fn distinct_actors_skips_blank_rows_and_repeats() {
        let schema = ColumnSchema::new(["username", "en_NZ_name"]).unwrap();
        let rows: Vec<Row> = vec![
            ["alice", "A"].into_iter().collect(),
            ["", " "].into_iter().collect(),
            ["bob", "B"].into_iter().collect(),
            ["alice", "C"].into_iter().collect(),
        ];

        assert_eq!(
            ActorCache::distinct_actors(&rows, &schema, "username"),
            vec!["alice", "bob"]
        );
    }

    #[tokio::test]
    async fn build_loads_each_actor_once_and_scopes_collections() {
        let store = Arc::new(MemoryStore::new());
        let alice = store.add_user("u1", "alice");
        let bob = store.add_user("u2", "bob");
        store.insert(EntityKind::Tag, owned_tag(&alice, "t1", "Spicy"));
        store.insert(EntityKind::Tag, owned_tag(&bob, "t2", "Mild"));

        let ctx = ImportContext::new(store.clone(), Session::local_defaults());
        let cache = ActorCache::build(
            &ctx,
            vec!["alice".into(), "bob".into(), "carol".into()],
            &[CollectionLoader::owned(EntityKind::Tag)],
        )
        .await
        .unwrap();

        assert_eq!(cache.len(), 3);
        let alice_tags = cache.get("alice").unwrap().collection(EntityKind::Tag);
        assert_eq!(alice_tags.len(), 1);
        assert_eq!(alice_tags[0].id, "t1");
        assert!(cache.get("carol").is_none());
        assert!(cache
            .get("bob")
            .unwrap()
            .collection(EntityKind::Menu)
            .is_empty());

        let calls = store.calls();
        assert_eq!(calls.find_actor, 3);
        // Unknown actors load nothing.
        assert_eq!(calls.searches(EntityKind::Tag), 2);
    }
}

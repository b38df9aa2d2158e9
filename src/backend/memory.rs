//! In-memory [`EntityService`] for tests and local experiments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::{Map, Value};
use tracing::debug;

use super::{
    Actor, EntityKind, EntityService, Record, SearchQuery, ServiceFuture, Session,
    VisibilityPolicy,
};
use crate::error::AppError;

/// Number of calls made against a [`MemoryStore`], per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub find_actor: u64,
    pub search: HashMap<EntityKind, u64>,
    pub create: u64,
    pub update: u64,
}

impl CallCounts {
    pub fn searches(&self, kind: EntityKind) -> u64 {
        self.search.get(&kind).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> u64 {
        self.create + self.update
    }
}

#[derive(Default)]
struct StoreState {
    users: Vec<Actor>,
    records: HashMap<EntityKind, Vec<Record>>,
    calls: CallCounts,
}

/// Thread-safe store holding every record in memory.
///
/// Records created through the service get sequential ids (`mem-1`, ...).
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user that `find_actor` can return.
    pub fn add_user(&self, id: &str, username: &str) -> Actor {
        let actor = Actor::new(id, username);
        self.lock().users.push(actor.clone());
        actor
    }

    /// Inserts a record directly, bypassing call counting.
    pub fn insert(&self, kind: EntityKind, record: Record) {
        self.lock().records.entry(kind).or_default().push(record);
    }

    /// Returns a snapshot of every record of a kind, in insertion order.
    pub fn records(&self, kind: EntityKind) -> Vec<Record> {
        self.lock().records.get(&kind).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        // A panicking row handler must not poison the store for its siblings.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> String {
        format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl EntityService for MemoryStore {
    fn find_actor<'a>(
        &'a self,
        _session: &'a Session,
        username: &'a str,
    ) -> ServiceFuture<'a, Option<Actor>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.find_actor += 1;
            Ok(state.users.iter().find(|u| u.username == username).cloned())
        })
    }

    fn search<'a>(
        &'a self,
        _session: &'a Session,
        query: &'a SearchQuery,
    ) -> ServiceFuture<'a, Vec<Record>> {
        Box::pin(async move {
            let mut state = self.lock();
            *state.calls.search.entry(query.kind).or_insert(0) += 1;

            if query.kind == EntityKind::User {
                let users = state
                    .users
                    .iter()
                    .map(user_record)
                    .filter(|record| query.matches(record))
                    .collect();
                return Ok(users);
            }

            Ok(state
                .records
                .get(&query.kind)
                .map(|records| {
                    records
                        .iter()
                        .filter(|record| query.matches(record))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn create<'a>(
        &'a self,
        _session: &'a Session,
        kind: EntityKind,
        mut fields: Map<String, Value>,
        policy: Option<&'a VisibilityPolicy>,
        owner: Option<&'a Actor>,
    ) -> ServiceFuture<'a, Record> {
        Box::pin(async move {
            let id = self.next_id();
            if let Some(policy) = policy {
                fields.insert("ACL".to_string(), policy.to_acl(owner));
            }

            let mut state = self.lock();
            state.calls.create += 1;

            if kind == EntityKind::User {
                let username = fields
                    .get("username")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::Backend {
                        code: 200,
                        message: "bad or missing username".to_string(),
                    })?;
                state.users.push(Actor::new(&id, username));
            }

            let record = Record::new(id, fields);
            debug!("[MEMORY] created {} {}", kind, record.id);
            state
                .records
                .entry(kind)
                .or_default()
                .push(record.clone());
            Ok(record)
        })
    }

    fn update<'a>(
        &'a self,
        _session: &'a Session,
        kind: EntityKind,
        record: &'a Record,
    ) -> ServiceFuture<'a, Record> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.update += 1;

            if kind == EntityKind::User {
                let actor = state
                    .users
                    .iter_mut()
                    .find(|u| u.id == record.id)
                    .ok_or_else(|| object_not_found(kind, &record.id))?;
                if let Some(username) = record.fields.get("username").and_then(Value::as_str) {
                    actor.username = username.to_string();
                }
            }

            let records = state.records.entry(kind).or_default();
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                // Users seeded through `add_user` have no stored record yet.
                None if kind == EntityKind::User => records.push(record.clone()),
                None => return Err(object_not_found(kind, &record.id)),
            }

            debug!("[MEMORY] updated {} {}", kind, record.id);
            Ok(record.clone())
        })
    }
}

fn user_record(actor: &Actor) -> Record {
    let mut fields = Map::new();
    fields.insert("username".to_string(), Value::String(actor.username.clone()));
    Record::new(actor.id.clone(), fields)
}

fn object_not_found(kind: EntityKind, id: &str) -> AppError {
    AppError::Backend {
        code: 101,
        message: format!("{} {} not found", kind, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ActorField;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_then_search_by_owner_and_name() {
        let store = MemoryStore::new();
        let session = Session::local_defaults();
        let owner = store.add_user("u1", "owner");

        let created = store
            .create(
                &session,
                EntityKind::Tag,
                fields(json!({ "ownedByUser": owner.pointer_value(), "name": { "en_NZ": "Spicy" } })),
                Some(&VisibilityPolicy::public_read()),
                Some(&owner),
            )
            .await
            .unwrap();
        assert_eq!(created.id, "mem-1");
        assert_eq!(created.fields["ACL"]["u1"]["write"], true);

        let query = SearchQuery::new(EntityKind::Tag)
            .scoped(ActorField::OwnedBy, &owner)
            .matching("name.en_NZ", "Spicy");
        let found = store.search(&session, &query).await.unwrap();
        assert_eq!(found, vec![created]);

        let calls = store.calls();
        assert_eq!(calls.create, 1);
        assert_eq!(calls.searches(EntityKind::Tag), 1);
    }

    #[tokio::test]
    async fn find_actor_matches_exact_username() {
        let store = MemoryStore::new();
        let session = Session::local_defaults();
        store.add_user("u1", "Owner");

        assert!(store.find_actor(&session, "owner").await.unwrap().is_none());
        let actor = store.find_actor(&session, "Owner").await.unwrap().unwrap();
        assert_eq!(actor.id, "u1");
        assert_eq!(store.calls().find_actor, 2);
    }

    #[tokio::test]
    async fn update_unknown_record_fails() {
        let store = MemoryStore::new();
        let session = Session::local_defaults();
        let record = Record::new("nope", Map::new());

        let err = store
            .update(&session, EntityKind::Menu, &record)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Backend { code: 101, .. }));
    }

    #[tokio::test]
    async fn created_users_become_actors() {
        let store = MemoryStore::new();
        let session = Session::local_defaults();

        store
            .create(
                &session,
                EntityKind::User,
                fields(json!({ "username": "new-owner", "password": "pw" })),
                None,
                None,
            )
            .await
            .unwrap();

        let actor = store.find_actor(&session, "new-owner").await.unwrap();
        assert!(actor.is_some());
    }
}

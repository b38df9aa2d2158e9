//! Read-through [`EntityService`] that never writes.
//!
//! Searches and actor lookups go to the wrapped service so references
//! resolve against real data; creates and updates are logged and echoed
//! back without reaching the server.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tracing::info;

use super::{
    Actor, EntityKind, EntityService, Record, SearchQuery, ServiceFuture, Session,
    VisibilityPolicy,
};

pub struct DryRunService<S> {
    inner: S,
    next_id: AtomicU64,
}

impl<S: EntityService> DryRunService<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of writes suppressed so far.
    pub fn suppressed_writes(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    fn placeholder_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("dry-run-{}", n)
    }
}

impl<S: EntityService> EntityService for DryRunService<S> {
    fn find_actor<'a>(
        &'a self,
        session: &'a Session,
        username: &'a str,
    ) -> ServiceFuture<'a, Option<Actor>> {
        self.inner.find_actor(session, username)
    }

    fn search<'a>(
        &'a self,
        session: &'a Session,
        query: &'a SearchQuery,
    ) -> ServiceFuture<'a, Vec<Record>> {
        self.inner.search(session, query)
    }

    fn create<'a>(
        &'a self,
        _session: &'a Session,
        kind: EntityKind,
        fields: Map<String, Value>,
        _policy: Option<&'a VisibilityPolicy>,
        _owner: Option<&'a Actor>,
    ) -> ServiceFuture<'a, Record> {
        Box::pin(async move {
            let id = self.placeholder_id();
            info!("[DRY-RUN] Would create {} ({} fields)", kind, fields.len());
            Ok(Record::new(id, fields))
        })
    }

    fn update<'a>(
        &'a self,
        _session: &'a Session,
        kind: EntityKind,
        record: &'a Record,
    ) -> ServiceFuture<'a, Record> {
        Box::pin(async move {
            self.next_id.fetch_add(1, Ordering::Relaxed);
            info!("[DRY-RUN] Would update {} {}", kind, record.id);
            Ok(record.clone())
        })
    }
}

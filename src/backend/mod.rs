//! Remote entity service boundary.
//!
//! The import engine never speaks the wire protocol itself. It depends only
//! on [`EntityService`]:
//!
//! - [`ParseClient`] talks to a Parse Server over REST
//! - [`DryRunService`] reads through another service and drops writes
//! - [`MemoryStore`] keeps records in memory (tests)

pub mod client;
pub mod dry_run;
pub mod memory;
pub mod model;
pub mod session;

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::error::AppError;

pub use client::{LoggingMode, ParseClient};
pub use dry_run::DryRunService;
pub use memory::{CallCounts, MemoryStore};
pub use model::{
    ActorField, ActorScope, Actor, EntityKind, Record, SearchQuery, UserPointer,
    VisibilityPolicy, REMOVED_BY_FIELD,
};
pub use session::Session;

/// Boxed future returned by [`EntityService`] methods.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

/// Operations the engine needs from the remote store.
///
/// Every call receives the [`Session`] explicitly; implementations hold no
/// ambient credentials of their own.
pub trait EntityService: Send + Sync {
    /// Looks up an actor by username. `None` when no such user exists.
    fn find_actor<'a>(
        &'a self,
        session: &'a Session,
        username: &'a str,
    ) -> ServiceFuture<'a, Option<Actor>>;

    /// Returns every record matching the query.
    fn search<'a>(
        &'a self,
        session: &'a Session,
        query: &'a SearchQuery,
    ) -> ServiceFuture<'a, Vec<Record>>;

    /// Creates a record, attaching the visibility policy when given.
    fn create<'a>(
        &'a self,
        session: &'a Session,
        kind: EntityKind,
        fields: Map<String, Value>,
        policy: Option<&'a VisibilityPolicy>,
        owner: Option<&'a Actor>,
    ) -> ServiceFuture<'a, Record>;

    /// Writes back a record whose fields were already merged.
    fn update<'a>(
        &'a self,
        session: &'a Session,
        kind: EntityKind,
        record: &'a Record,
    ) -> ServiceFuture<'a, Record>;
}

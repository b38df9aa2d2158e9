//! The import engine.
//!
//! Data flow per run:
//!
//! 1. rows are parsed and the distinct actors collected
//! 2. the [`ActorCache`] resolves each actor and its shared collections once
//! 3. the [`BatchScheduler`] runs the per-row pipeline chunk by chunk:
//!    extract, compose localized fields, resolve references, then [`upsert`]

pub mod actor_cache;
pub mod localize;
pub mod resolve;
pub mod run;
pub mod scheduler;
pub mod sort_order;
pub mod upsert;

pub use actor_cache::{ActorBundle, ActorCache, CollectionLoader};
pub use localize::LocalizedField;
pub use resolve::{Lookup, Resolution, ResolvedRefs};
pub use run::{import_file, process_row, run_import};
pub use scheduler::{BatchScheduler, RowFailure, RunSummary};
pub use sort_order::compute_order;
pub use upsert::{merge_fields, upsert, UpsertOutcome, UpsertPolicy, UpsertRequest};

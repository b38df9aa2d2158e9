//! Run orchestration: parse, cache, schedule.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::actor_cache::ActorCache;
use super::scheduler::{BatchScheduler, RunSummary};
use super::upsert::{upsert, UpsertOutcome};
use super::resolve::Lookup;
use crate::backend::EntityKind;
use crate::context::ImportContext;
use crate::error::{AppError, RowError};
use crate::importers::{Importer, RowInput};
use crate::tabular::{read_rows, ColumnSchema, Row, TabularOptions};

/// Reads `path` and imports every row with `importer`.
///
/// `chunk_size` falls back to the importer's default.
pub async fn import_file(
    ctx: Arc<ImportContext>,
    importer: Arc<dyn Importer>,
    path: &Path,
    options: TabularOptions,
    chunk_size: Option<usize>,
) -> Result<RunSummary, AppError> {
    let rows = read_rows(path, options).await?;
    info!(
        "[IMPORT] Read {} data rows from {}",
        rows.len(),
        path.display()
    );
    let chunk_size = chunk_size.unwrap_or_else(|| importer.default_chunk_size());
    run_import(ctx, importer, rows, chunk_size).await
}

/// Imports already-parsed rows.
///
/// # Errors
///
/// Only setup failures are returned: an invalid schema, a zero chunk size,
/// or a remote failure while building the actor cache. Row failures are
/// counted in the summary.
pub async fn run_import(
    ctx: Arc<ImportContext>,
    importer: Arc<dyn Importer>,
    rows: Vec<Row>,
    chunk_size: usize,
) -> Result<RunSummary, AppError> {
    if chunk_size == 0 {
        return Err(AppError::Internal("chunk size must be at least 1".into()));
    }

    let start = Instant::now();
    let schema = Arc::new(ColumnSchema::new(importer.columns(&ctx.languages))?);

    let actors = importer
        .actor_column()
        .map(|column| ActorCache::distinct_actors(&rows, &schema, column))
        .unwrap_or_default();
    let cache = Arc::new(ActorCache::build(&ctx, actors, &importer.shared_collections()).await?);

    info!(
        "[IMPORT] Importing {} rows of {} in chunks of {}",
        rows.len(),
        importer.kind(),
        chunk_size
    );

    let summary = BatchScheduler::new(chunk_size)
        .run(rows, |_record, row| {
            let ctx = ctx.clone();
            let importer = importer.clone();
            let schema = schema.clone();
            let cache = cache.clone();
            async move { process_row(&ctx, importer.as_ref(), &schema, &cache, &row).await }
        })
        .await;

    if summary.failed() > 0 {
        warn!(
            "[IMPORT] {} of {} rows did not import",
            summary.failed(),
            summary.processed()
        );
    }
    info!(
        "[IMPORT] {} finished in {:?}: {}",
        importer.command(),
        start.elapsed(),
        summary
    );

    Ok(summary)
}

/// The per-row pipeline: extract, find the actor bundle, plan, upsert.
pub async fn process_row(
    ctx: &ImportContext,
    importer: &dyn Importer,
    schema: &ColumnSchema,
    cache: &ActorCache,
    row: &Row,
) -> Result<UpsertOutcome, RowError> {
    let values = schema.extract(row);

    let bundle = match importer.actor_column() {
        Some(column) => {
            let username = values.require(column)?;
            let bundle = cache.get(username).ok_or_else(|| {
                Lookup::new(EntityKind::User, None, column, username).not_found()
            })?;
            Some(bundle)
        }
        None => None,
    };

    let request = importer.plan(&RowInput {
        values: &values,
        bundle,
        languages: &ctx.languages,
    })?;

    upsert(ctx, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, Session};
    use crate::importers::catalog::TagImporter;
    use std::io::Write;

    fn context(store: &Arc<MemoryStore>) -> Arc<ImportContext> {
        Arc::new(ImportContext::new(store.clone(), Session::local_defaults()))
    }

    #[tokio::test]
    async fn unknown_actor_rows_are_not_found() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("u1", "known");
        let rows = vec![
            ["known", "Spicy"].into_iter().collect::<Row>(),
            ["ghost", "Mild"].into_iter().collect::<Row>(),
        ];

        let summary = run_import(context(&store), Arc::new(TagImporter), rows, 10)
            .await
            .unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.failures[0].message.contains("ghost"));
        assert_eq!(summary.failures[0].record, 3);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_a_setup_error() {
        let store = Arc::new(MemoryStore::new());
        let result = run_import(context(&store), Arc::new(TagImporter), vec![], 0).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn import_file_uses_default_chunk_size_and_skips_header() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("u1", "owner");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "username,en_NZ_name,zh_name,jp_name\r\nowner,Spicy,辣,\r\n,,,\r\nowner,Mild,,\r\n"
        )
        .unwrap();

        let summary = import_file(
            context(&store),
            Arc::new(TagImporter),
            file.path(),
            TabularOptions::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.blank, 1);
        let tags = store.records(EntityKind::Tag);
        let by_name = |name: &str| {
            tags.iter()
                .find(|t| t.str_at("name.en_NZ") == Some(name))
                .unwrap()
                .clone()
        };
        assert_eq!(by_name("Spicy").fields["name"]["zh"], "辣");
        assert!(by_name("Mild").fields["name"].get("zh").is_none());
    }
}

//! Chunked batch execution.
//!
//! Rows are split into fixed-size chunks. Chunks run strictly one after
//! another; the rows inside a chunk run concurrently. Peak concurrency is
//! therefore bounded by the chunk size.
//!
//! # Usage
//!
//! ```ignore
//! let scheduler = BatchScheduler::new(10);
//!
//! let summary = scheduler
//!     .run(rows, |record, row| async move { handle(record, row).await })
//!     .await;
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::upsert::UpsertOutcome;
use crate::error::RowError;
use crate::tabular::Row;

/// Record number of the first data row; the header is record 1.
const FIRST_DATA_RECORD: usize = 2;

// ─────────────────────────────────────────────────────────────────────────────
// RunSummary
// ─────────────────────────────────────────────────────────────────────────────

/// A row that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// Record number in the input, counting the header as 1.
    pub record: usize,
    pub message: String,
    /// True for input-data defects (skipped), false for backend failures.
    pub data_error: bool,
}

/// Per-outcome row counts for one run.
///
/// Blank rows are counted separately and are neither successes nor errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub superseded: usize,
    pub unchanged: usize,
    /// Rows rejected for data errors (missing or ambiguous references...).
    pub skipped: usize,
    /// Rows whose backend call failed or whose handler panicked.
    pub errored: usize,
    pub blank: usize,
    pub failures: Vec<RowFailure>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.created + self.updated + self.superseded + self.unchanged
    }

    pub fn failed(&self) -> usize {
        self.skipped + self.errored
    }

    /// Rows that reached the handler.
    pub fn processed(&self) -> usize {
        self.succeeded() + self.failed()
    }

    fn tally(&mut self, record: usize, result: Result<UpsertOutcome, RowError>) {
        match result {
            Ok(outcome) => {
                debug!("[BATCH] Row {}: {:?}", record, outcome);
                match outcome {
                    UpsertOutcome::Created(_) => self.created += 1,
                    UpsertOutcome::Updated(_) => self.updated += 1,
                    UpsertOutcome::Superseded { .. } => self.superseded += 1,
                    UpsertOutcome::Unchanged(_) => self.unchanged += 1,
                }
            }
            Err(err) => {
                let data_error = err.is_data_error();
                if data_error {
                    warn!("[BATCH] Row {} skipped: {}", record, err);
                    self.skipped += 1;
                } else {
                    error!("[BATCH] Row {} failed: {}", record, err);
                    self.errored += 1;
                }
                self.failures.push(RowFailure {
                    record,
                    message: err.to_string(),
                    data_error,
                });
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created {}, updated {}, superseded {}, unchanged {}, skipped {}, errored {}, blank {}",
            self.created,
            self.updated,
            self.superseded,
            self.unchanged,
            self.skipped,
            self.errored,
            self.blank
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BatchScheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Runs a row handler over chunks of rows.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    chunk_size: usize,
}

impl BatchScheduler {
    /// Creates a scheduler running `chunk_size` rows at a time.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is 0.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be greater than 0");
        Self { chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Runs `handler` for every non-blank row.
    ///
    /// The handler gets the row's record number (header is 1) and the row.
    /// An error or panic in one row is recorded against that row only;
    /// siblings in the same chunk still run to completion.
    pub async fn run<F, Fut>(&self, rows: Vec<Row>, mut handler: F) -> RunSummary
    where
        F: FnMut(usize, Row) -> Fut,
        Fut: Future<Output = Result<UpsertOutcome, RowError>> + Send + 'static,
    {
        let mut summary = RunSummary::default();
        let total_chunks = rows.len().div_ceil(self.chunk_size);
        let mut rows = rows.into_iter().enumerate().peekable();
        let mut chunk_number = 0usize;

        while rows.peek().is_some() {
            chunk_number += 1;
            let start = Instant::now();
            let mut join_set: JoinSet<(usize, Result<UpsertOutcome, RowError>)> = JoinSet::new();
            let mut pending = BTreeSet::new();

            for (index, row) in rows.by_ref().take(self.chunk_size) {
                let record = index + FIRST_DATA_RECORD;
                if row.is_blank() {
                    debug!("[BATCH] Row {} is blank, skipping", record);
                    summary.blank += 1;
                    continue;
                }

                let task = handler(record, row);
                pending.insert(record);
                join_set.spawn(async move {
                    let result = AssertUnwindSafe(task)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(RowError::Panicked(panic_message(panic))));
                    (record, result)
                });
            }

            // The next chunk starts only once every row here has settled.
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((record, result)) => {
                        pending.remove(&record);
                        summary.tally(record, result);
                    }
                    Err(e) => error!("[BATCH] Task join error: {:?}", e),
                }
            }

            // A task that failed to join never reported its record.
            for record in pending {
                summary.tally(record, Err(RowError::Panicked("row task did not complete".into())));
            }

            debug!(
                "[BATCH] Chunk {}/{} settled in {:?}",
                chunk_number,
                total_chunks,
                start.elapsed()
            );
        }

        summary.failures.sort_by_key(|f| f.record);
        summary
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

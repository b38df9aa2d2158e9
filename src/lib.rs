pub mod backend;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod importers;
pub mod tabular;

pub use context::ImportContext;
pub use engine::{import_file, run_import, RunSummary};
pub use error::{AppError, RowError};

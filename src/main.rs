use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser as ClapParser;
use tracing::error;

use menu_loader::config::Cli;
use menu_loader::{import_file, AppError, ImportContext, RunSummary};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(summary) => {
            println!("{}", summary);
            for failure in &summary.failures {
                println!("  record {}: {}", failure.record, failure.message);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let presentation = e.to_presentation();
            error!("[IMPORT] Import failed: {}", presentation.title);
            eprintln!("{}: {}", presentation.title, presentation.message);
            if let Some(action) = presentation.action {
                eprintln!("{}", action);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary, AppError> {
    let importer = cli.entity.importer();
    let (service, session) = cli.connection.connect(cli.input.dry_run).await?;
    let ctx = Arc::new(ImportContext::new(service, session).with_languages(cli.input.languages.clone()));

    import_file(
        ctx,
        importer,
        &cli.input.csv_file_path,
        cli.input.tabular_options(),
        cli.input.chunk_size,
    )
    .await
}

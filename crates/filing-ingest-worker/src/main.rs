use anyhow::Result;
use clap::{Parser, Subcommand};
use filing_ingest_worker::config::Settings;
use filing_ingest_worker::database::{DbPool, PgVectorStore};
use filing_ingest_worker::embedding::LlamaServerEmbedder;
use filing_ingest_worker::utils::logger;
use filing_ingest_worker::worker::IngestionController;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "filing-ingest-worker")]
#[command(about = "Normalize, chunk, embed and index SEC 10-K filings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Normalize, chunk, embed and index every filing not yet in the store - Default
    Ingest,
    /// Only write Markdown side files for raw filings
    Normalize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Ingest);

    dotenvy::dotenv().ok();
    logger::init_logger()?;

    info!("🚀 Starting filing ingest worker ({:?})", command);

    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let embedder = Arc::new(LlamaServerEmbedder::new(&settings.embedding)?);

    let db_pool = match command {
        Commands::Ingest => DbPool::new(&settings.database).await?,
        Commands::Normalize => DbPool::connect_lazy(&settings.database)?,
    };
    let store = PgVectorStore::new(db_pool.clone(), settings.database.collection.clone());
    if command == Commands::Ingest {
        store.ensure_schema(settings.embedding.dimension).await?;
    }

    let controller = IngestionController::new(settings, embedder, Arc::new(store))?;

    let report = match command {
        Commands::Ingest => controller.ingest().await?,
        Commands::Normalize => controller.normalize_all().await?,
    };

    info!(
        "🎉 Finished: {} processed, {} skipped, {} failed",
        report.processed, report.skipped, report.failed
    );

    db_pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_is_default() {
        let cli = Cli::try_parse_from(["filing-ingest-worker"]).unwrap();
        assert_eq!(cli.command.unwrap_or(Commands::Ingest), Commands::Ingest);
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["filing-ingest-worker", "normalize"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Normalize));

        let cli = Cli::try_parse_from(["filing-ingest-worker", "ingest"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Ingest));
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["filing-ingest-worker", "reindex"]).is_err());
    }
}

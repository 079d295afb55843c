//! newsdesk CLI: coffee news ingestion, enrichment and publishing.
//!
//! Fetches configured sources, stores articles keyed by link, enriches them
//! with an LLM classifier and syncs them to the storefront.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

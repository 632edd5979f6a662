use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod load;

use tally_core::{MatchConfig, SimilarityScorer, reconcile};
use tally_embed::{HttpEmbeddingClient, VectorMatcher, reconcile_two_tier};

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Receipt/bank ledger reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a receipt ledger against a bank ledger and print a JSON report
    Reconcile {
        /// Receipt ledger: JSON array of raw receipt rows
        #[arg(long)]
        receipts: PathBuf,

        /// Bank ledger: CSV (date,description,amount) or JSON array
        #[arg(long)]
        bank: PathBuf,

        /// Run the embedding-backed semantic pass over textual leftovers
        /// (requires EMBEDDING_API_URL and EMBEDDING_API_KEY)
        #[arg(long)]
        semantic: bool,

        /// Optional TOML file overriding match tolerances and threshold
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pretty-print the JSON report
        #[arg(long)]
        pretty: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<MatchConfig> {
    let Some(path) = path else {
        return Ok(MatchConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Reconcile {
            receipts,
            bank,
            semantic,
            config,
            pretty,
        } => {
            let receipt_records = load::load_receipts(&receipts)?;
            let bank_records = load::load_bank(&bank)?;
            tracing::info!(
                receipts = receipt_records.len(),
                bank = bank_records.len(),
                "ledgers loaded"
            );

            let match_config = load_config(config.as_ref())?;
            let scorer = SimilarityScorer::new(match_config.clone());

            let report = if semantic {
                let api_url = std::env::var("EMBEDDING_API_URL")
                    .context("--semantic requires EMBEDDING_API_URL")?;
                let api_key = std::env::var("EMBEDDING_API_KEY")
                    .context("--semantic requires EMBEDDING_API_KEY")?;
                let client = HttpEmbeddingClient::new(api_url, api_key, "usf1-embed")?;
                // One config governs both tiers.
                let matcher = VectorMatcher::new(client)?
                    .with_threshold(match_config.confidence_threshold as f32);
                reconcile_two_tier(&receipt_records, &bank_records, &scorer, &matcher).await?
            } else {
                reconcile(&receipt_records, &bank_records, &scorer)?
            };

            tracing::info!(
                matched = report.matches.len(),
                unmatched_receipts = report.unmatched_receipts.len(),
                unmatched_bank = report.unmatched_bank.len(),
                match_rate = %format!("{:.0}%", report.match_rate() * 100.0),
                "reconciliation complete"
            );

            let json = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{json}");
        }
    }

    Ok(())
}

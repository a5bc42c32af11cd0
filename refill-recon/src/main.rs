//! refill-recon - batch reconciliation runner
//!
//! Reads one crawl batch (JSON array of raw records), reconciles it against
//! the canonical venue set, persists the result and writes the run report.

use anyhow::{Context, Result};
use clap::Parser;
use refill_common::config::ReconConfig;
use refill_common::models::RawVenueRecord;
use refill_recon::db::{run_with_store, MemoryStore, PgVenueStore};
use refill_recon::types::StatusInputs;
use refill_recon::ReconPipeline;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "refill-recon", about = "Venue reconciliation pipeline", version)]
struct Args {
    /// Crawl batch: JSON array of raw venue records
    #[arg(long)]
    input: PathBuf,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// External status inputs: liveness signals and manual overrides (JSON)
    #[arg(long)]
    signals: Option<PathBuf>,

    /// Where to write the run report (JSON); stdout when omitted
    #[arg(long)]
    report: Option<PathBuf>,

    /// Run the full pipeline without touching the database
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting refill-recon v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let config = ReconConfig::load(args.config.as_deref())?;
    let pipeline = ReconPipeline::new(&config)?;

    let batch: Vec<RawVenueRecord> = {
        let content = std::fs::read_to_string(&args.input)
            .with_context(|| format!("read batch {}", args.input.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parse batch {}", args.input.display()))?
    };
    info!(records = batch.len(), "batch loaded from {}", args.input.display());

    let inputs: StatusInputs = match &args.signals {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read signals {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parse signals {}", path.display()))?
        }
        None => StatusInputs::default(),
    };

    let outcome = if args.dry_run {
        info!("dry run: using in-memory store, nothing will be persisted");
        let store = MemoryStore::new();
        run_with_store(&pipeline, &store, &batch, &inputs).await?
    } else {
        let url = args
            .database_url
            .as_deref()
            .context("--database-url (or DATABASE_URL) is required unless --dry-run")?;
        let store = PgVenueStore::connect(url).await?;
        run_with_store(&pipeline, &store, &batch, &inputs).await?
    };

    if !outcome.pending_geocoding.is_empty() {
        warn!(
            count = outcome.pending_geocoding.len(),
            "records deferred for geocoding-by-address"
        );
    }

    let report_json = serde_json::to_string_pretty(&outcome.report)?;
    match &args.report {
        Some(path) => {
            std::fs::write(path, &report_json)
                .with_context(|| format!("write report {}", path.display()))?;
            info!("run report written to {}", path.display());
        }
        None => println!("{report_json}"),
    }

    info!(summary = %outcome.report.summary(), "done");
    Ok(())
}

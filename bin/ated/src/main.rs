//! ---
//! ate_section: "01-core-functionality"
//! ate_subsection: "binary"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Binary entrypoint for the bench daemon."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use ate_common::config::AppConfig;
use ate_common::logging::init_tracing;
use ate_core::TestBench;
use ate_storage::{BenchJournal, JournaledStore, MemoryRunStore, RunStore};

#[derive(Debug, Parser)]
#[command(author, version, about = "ATE-Bench daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the bench daemon")]
    Run,
    #[command(about = "Validate configuration and exit")]
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/bench.toml"));
    candidates.push(PathBuf::from("configs/example.bench.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;

    if matches!(cli.command, Some(Commands::Check)) {
        println!(
            "configuration ok: {} ({} stations, {} profiles)",
            loaded.source.display(),
            config.stations.len(),
            config.profiles.len()
        );
        return Ok(());
    }

    init_tracing("ated", &config.logging)?;
    info!(source = %loaded.source.display(),
        stations = config.stations.len(),
        profiles = config.profiles.len(),
        "configuration loaded");

    if config.stations.is_empty() {
        warn!("no stations configured; the bench will idle");
    }

    let journal = BenchJournal::open(&config.bench.journal_path).with_context(|| {
        format!(
            "failed to open bench journal {}",
            config.bench.journal_path.display()
        )
    })?;
    let store: Arc<dyn RunStore> = Arc::new(JournaledStore::new(
        Arc::new(MemoryRunStore::new()),
        journal,
    ));
    let bench = TestBench::new(config.bench.clone(), store);

    info!("bench daemon ready; awaiting run requests");
    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutdown signal received");
    bench.shutdown();
    info!("bench daemon exited cleanly");
    Ok(())
}

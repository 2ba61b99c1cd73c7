//! Hospital platform pipeline
//!
//! Command-line entry point for the migration, cache synchronization,
//! analytics, activity simulation and service checks.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hospital_platform::activity::ActivitySimulator;
use hospital_platform::cache::RedisCache;
use hospital_platform::config::LogFormat;
use hospital_platform::diagnostics::check_services;
use hospital_platform::pipeline::{AnalyticsJob, CacheSynchronizer, DocumentBuilder};
use hospital_platform::store::MongoStore;
use hospital_platform::Settings;

#[derive(Parser)]
#[command(name = "hospital-platform", about = "Hospital records migration and dashboard cache pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Settings file read in place of config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and rebuild the patient summary documents and operational metrics
    Migrate,
    /// Repopulate the dashboard cache from the document store
    SyncCache,
    /// Recompute and store the analytics summary
    Analytics,
    /// Nudge dashboard counters to simulate live activity
    SimulateActivity {
        #[arg(long)]
        ticks: Option<u32>,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Report whether each store is reachable
    Check,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        settings.log.format
    };
    init_logging(format);

    match cli.command {
        Commands::Migrate => {
            let builder = DocumentBuilder::connect(&settings)
                .await
                .context("Cannot start migration")?;
            let report = builder.run().await.context("Migration aborted")?;
            for failure in &report.failures {
                error!(patient = %failure.patient, reason = %failure.reason, "Failed patient");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::SyncCache => {
            let synchronizer = CacheSynchronizer::connect(&settings)
                .await
                .context("Cannot start cache synchronization")?;
            let report = synchronizer
                .run()
                .await
                .context("Cache synchronization failed; rerun to retry")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Analytics => {
            let documents = MongoStore::connect(&settings.documents, settings.connect_timeout())
                .await
                .context("Cannot reach document store")?;
            let job = AnalyticsJob::new(documents, &settings);
            let summary = job.run().await.context("Analytics summary failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::SimulateActivity { ticks, interval_ms } => {
            let cache = RedisCache::connect(&settings.cache, settings.connect_timeout())
                .await
                .context("Cannot reach cache store")?;
            let ticks = ticks.unwrap_or(settings.activity.ticks);
            let interval = Duration::from_millis(interval_ms.unwrap_or(settings.activity.interval_ms));
            info!(ticks, interval_ms = interval.as_millis() as u64, "Simulating live activity");
            let report = ActivitySimulator::new(cache).run(ticks, interval).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Check => {
            let report = check_services(&settings).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_reachable() {
                anyhow::bail!("One or more services are unreachable");
            }
        }
    }

    Ok(())
}

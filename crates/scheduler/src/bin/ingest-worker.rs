//! ingest-worker: populates per-area timer groups from the upstream outage feed.
//!
//! Subcommands:
//! - `run`: cold-start ingest of the given (or configured) areas, optionally
//!   followed by periodic re-ingest of areas whose timer group is empty
//! - `register`: register one outage record directly, skipping fetch and filter

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use shedwatch_core::config::{load_dotenv, Config};
use shedwatch_scheduler::source::decode_outage;
use shedwatch_scheduler::{
    EventBridgeTimerRegistry, HttpEventSource, InMemoryTimerRegistry, Ingestor, TimerRegistry,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Ingest worker: registers one-shot timers for upcoming outages.
#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    /// Keep timers in process memory instead of EventBridge Scheduler.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest areas (defaults to SCHEDULE_GROUPS).
    Run {
        /// Comma-separated area identifiers.
        #[arg(long, value_delimiter = ',')]
        areas: Vec<String>,

        /// Every N seconds, re-ingest areas with no pending timers; 0 runs once.
        #[arg(long, env = "REINGEST_INTERVAL_SECS")]
        reingest_interval_secs: Option<u64>,
    },
    /// Register a single outage record given as upstream JSON.
    Register {
        /// e.g. '{"area_name":"x","stage":"Stage 2","start":"...","finsh":"...","source":"..."}'
        #[arg(long)]
        event: String,
    },
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    info!(profile = config.profile_label(), "loaded config");

    let registry: Arc<dyn TimerRegistry> = if cli.dry_run {
        warn!("dry run: timers are kept in memory and discarded on exit");
        Arc::new(InMemoryTimerRegistry::new())
    } else {
        Arc::new(
            EventBridgeTimerRegistry::new(&config.aws, &config.scheduler)
                .await
                .context("initializing EventBridge timer registry")?,
        )
    };
    let source = Arc::new(
        HttpEventSource::from_config(&config.source).context("initializing event source")?,
    );
    let ingestor = Ingestor::new(source, registry);

    match cli.command {
        Command::Register { event } => {
            let event = decode_outage(&event).context("parsing --event")?;
            let handle = ingestor.register_one(event).await?;
            info!(group = %handle.group, timer = %handle.name, "timer registered");
            println!("{}", serde_json::to_string_pretty(&handle)?);
        }
        Command::Run {
            areas,
            reingest_interval_secs,
        } => {
            let areas: BTreeSet<String> = if areas.is_empty() {
                config.scheduler.default_areas.iter().cloned().collect()
            } else {
                areas.into_iter().collect()
            };
            if areas.is_empty() {
                anyhow::bail!("no areas given and SCHEDULE_GROUPS is empty");
            }

            let interval_secs =
                reingest_interval_secs.unwrap_or(config.scheduler.reingest_interval_secs);

            let outcome = ingestor.ingest(&areas).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            if interval_secs > 0 {
                run_reingest_loop(&ingestor, &areas, Duration::from_secs(interval_secs)).await;
            }
        }
    }

    info!("ingest-worker exited cleanly");
    Ok(())
}

/// Re-ingest idle areas on a fixed interval until Ctrl-C.
async fn run_reingest_loop(ingestor: &Ingestor, areas: &BTreeSet<String>, every: Duration) {
    info!(interval_secs = every.as_secs(), "re-ingest loop started");
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately and the cold-start ingest already ran.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = ingestor.reingest_idle(areas).await;
                info!(
                    areas_with_new_timers = outcome.len(),
                    "re-ingest cycle finished"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
}

//! recert-worker — periodic recertification sweep.
//!
//! Loads the store snapshot from the data directory, runs the sweep on a
//! cron schedule and persists the snapshot after every pass. Collaborator
//! seams (certificate issuer, enrollment sync, event bus) are wired to the
//! discarding implementations; a deployment plugs its own in here.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use cron::Schedule;
use tracing::{info, warn};

use recert_core::config::{load_dotenv, Config};
use recert_engine::{Discard, PeriodService, RecertSweep};
use recert_store::{MemoryStore, SnapshotStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Recertification sweep worker.
#[derive(Parser, Debug)]
#[command(name = "recert-worker", version, about)]
struct Cli {
    /// Directory holding the store snapshot.
    #[arg(long, env = "RECERT_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// 6-field cron expression for the sweep schedule.
    #[arg(long, env = "RECERT_SWEEP_SCHEDULE")]
    schedule: Option<String>,

    /// How many days past its expiry a period may still be swept.
    #[arg(long, env = "RECERT_SWEEP_LOOKBACK_DAYS")]
    lookback_days: Option<i64>,

    /// Run a single sweep immediately and exit.
    #[arg(long)]
    once: bool,
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

    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(schedule) = cli.schedule {
        config.sweep.schedule = schedule;
    }
    if let Some(days) = cli.lookback_days {
        config.sweep.lookback_days = days;
    }
    config.log_summary();

    let schedule = Schedule::from_str(&config.sweep.schedule)?;
    let snapshots = SnapshotStore::new(&config.data_dir)?;
    let store = match snapshots.load()? {
        Some(state) => {
            info!(path = %snapshots.base_dir().display(), "snapshot loaded");
            MemoryStore::from_state(state)
        }
        None => {
            info!("no snapshot found, starting empty");
            MemoryStore::new()
        }
    };

    let service = PeriodService::new(Arc::new(Discard), Arc::new(Discard));
    let sweep = RecertSweep::new(service, Arc::new(Discard))
        .with_lookback(config.sweep.lookback_days * 86_400);

    if cli.once {
        let report = sweep.run(&store, Utc::now().timestamp());
        store.read(|state| snapshots.save(state))?;
        info!(?report, "single sweep done");
        return Ok(());
    }

    info!("recert-worker starting");
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("schedule yields no further occurrences, exiting");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let report = sweep.run(&store, Utc::now().timestamp());
                if let Err(e) = store.read(|state| snapshots.save(state)) {
                    warn!(error = %e, "failed to persist snapshot");
                }
                info!(spawned = report.spawned, failed = report.failed, "sweep pass persisted");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    store.read(|state| snapshots.save(state))?;
    info!("recert-worker exited cleanly");
    Ok(())
}

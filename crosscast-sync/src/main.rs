//! crosscast-sync - background daemon for periodic connection syncs
//!
//! Runs the sync orchestrator on an interval: pulls profile, metrics,
//! and incremental posts for every active connection, with
//! per-connection failure isolation. Poll timing carries a small jitter
//! so multiple deployments do not synchronize their cycles.
//!
//! SIGTERM/SIGINT request a graceful shutdown: the in-flight cycle
//! finishes, then the loop exits.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use libcrosscast::logging::{LogFormat, LoggingConfig};
use libcrosscast::{Config, ConnectorService};

#[derive(Parser, Debug)]
#[command(name = "crosscast-sync")]
#[command(version)]
#[command(about = "Background daemon for periodic social connection syncs")]
struct Cli {
    /// Path to the config file (default: XDG config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sync interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run one cycle and exit (for testing)
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = std::env::var("CROSSCAST_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);
    LoggingConfig::new(format, "info".to_string(), cli.verbose).init();

    let config = load_config(cli.config.as_ref())?;
    let interval = match cli.interval {
        Some(secs) => Duration::from_secs(secs),
        None => config.sync.interval()?,
    };

    let service = ConnectorService::from_config(&config).await?;

    info!(
        "crosscast-sync daemon starting (interval: {}s)",
        interval.as_secs()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone());

    if cli.once {
        run_cycle(&service).await;
        info!("crosscast-sync: ran one cycle, exiting");
        return Ok(());
    }

    while !shutdown.load(Ordering::SeqCst) {
        run_cycle(&service).await;

        // Jitter the wait by up to 10% so co-deployed daemons drift
        // apart instead of hammering the platforms in lockstep.
        let jitter = rand::thread_rng().gen_range(0..=interval.as_secs() / 10);
        let wait = interval + Duration::from_secs(jitter);

        let mut remaining = wait.as_secs();
        while remaining > 0 && !shutdown.load(Ordering::SeqCst) {
            sleep(Duration::from_secs(1)).await;
            remaining -= 1;
        }
    }

    info!("crosscast-sync daemon stopped");
    Ok(())
}

async fn run_cycle(service: &ConnectorService) {
    match service.run_sync_cycle().await {
        Ok(report) => {
            if !report.failed.is_empty() {
                warn!(
                    synced = report.synced,
                    failed = report.failed.len(),
                    "Sync cycle finished with skipped connections"
                );
            }
        }
        Err(err) => {
            // A cycle-level failure (e.g. the store is unreachable) is
            // retried on the next tick, not fatal to the daemon.
            error!("Sync cycle failed: {}", err);
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load_from_path(path)?),
        None => match Config::load() {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!("No config file found ({}); using defaults", err);
                Ok(Config::default_config())
            }
        },
    }
}

#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            warn!("Failed to install signal handlers: {}", err);
            return;
        }
    };

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, shutting down after current cycle", sig);
            shutdown.store(true, Ordering::SeqCst);
        }
    });
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received ctrl-c, shutting down after current cycle");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
}

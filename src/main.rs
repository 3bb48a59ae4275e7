//! home-watch - GPS geofence presence watcher
//!
//! Polls the latest position of one tracked device, decides whether it is
//! inside the home zone and sends an email when that changes.
//!
//! Module structure:
//! - `domain/` - Zone, samples, presence states and the geofence evaluator
//! - `io/` - External interfaces (ThingsBoard, SMTP)
//! - `services/` - Presence tracker, poll loop, notification worker
//! - `infra/` - Infrastructure (Config, Logging, Metrics)

use anyhow::Context;
use clap::Parser;
use home_watch::infra::{logging, Config, Metrics};
use home_watch::io::{LogNotifier, Notifier, PositionSource, SmtpNotifier, ThingsBoardSource};
use home_watch::services::{create_notify_worker, PollLoop};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Home presence watcher - emails when a tracked device leaves or reaches home
#[derive(Parser, Debug)]
#[command(name = "home-watch", version, about)]
struct Args {
    /// Path to TOML configuration file (settings may also come from HOME_WATCH_* env vars)
    #[arg(short, long, env = "HOME_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log notifications instead of sending email (SMTP credentials become optional)
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let dry_run = args.dry_run;
    let config = Config::load_with_env(args.config.as_deref(), |key| {
        if dry_run && key == "HOME_WATCH_DRY_RUN" {
            return Some("true".to_string());
        }
        std::env::var(key).ok()
    })?;

    logging::init(args.json_logs || config.log_json());

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        build = %home_watch::BUILD_ID,
        "home-watch starting"
    );
    info!(
        config_file = %config.config_file(),
        device_id = %config.device_id(),
        device_label = %config.device_label(),
        home_lat = %config.zone().latitude(),
        home_lon = %config.zone().longitude(),
        radius_m = %config.zone().radius_m(),
        hysteresis_m = %config.hysteresis_m(),
        interval_secs = %config.poll_interval().as_secs(),
        destination = %config.destination(),
        dry_run = %config.dry_run(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    let source: Arc<dyn PositionSource> = Arc::new(
        ThingsBoardSource::new(config.thingsboard()).context("Failed to create ThingsBoard client")?,
    );

    let notifier: Arc<dyn Notifier> = if config.dry_run() {
        warn!("dry_run_enabled");
        Arc::new(LogNotifier)
    } else {
        Arc::new(SmtpNotifier::new(&config.smtp()).context("Failed to create SMTP notifier")?)
    };

    let (notify_tx, notify_worker) = create_notify_worker(
        notifier,
        config.retry_policy(),
        metrics.clone(),
        config.notify_queue_size(),
    );
    let worker_handle = tokio::spawn(notify_worker.run());

    let poll_loop = PollLoop::new(&config, source, notify_tx, metrics.clone())
        .context("Invalid home zone")?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Runs until shutdown; dropping the loop closes the notification queue
    poll_loop.run(shutdown_rx).await;

    // Let queued notifications go out before exit
    if let Err(e) = worker_handle.await {
        warn!(error = %e, "notify_worker_join_failed");
    }

    metrics.report().log();
    info!("home-watch shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "sigterm_handler_unavailable");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}

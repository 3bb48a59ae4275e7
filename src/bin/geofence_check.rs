//! Geofence check - evaluate one position against the configured home zone
//!
//! Usage:
//!   geofence-check --config home-watch.toml --lat 34.0290 --lon -118.2797
//!   geofence-check --config home-watch.toml --fetch
//!
//! With --fetch the latest position is pulled from ThingsBoard, so this also
//! doubles as a credentials / device id smoke test. No notification is sent.

use anyhow::{bail, Context};
use clap::Parser;
use home_watch::domain::{evaluate, PositionSample};
use home_watch::infra::{logging, Config};
use home_watch::io::{format_timestamp, PositionSource, ThingsBoardSource};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "geofence-check", version, about = "Evaluate a position against the home zone")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "HOME_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Latitude in decimal degrees
    #[arg(long, requires = "lon", conflicts_with = "fetch", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude in decimal degrees
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Fetch the device's latest position instead of passing --lat/--lon
    #[arg(long)]
    fetch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Delivery is never used here, so SMTP settings are not required
    let config = Config::load_with_env(args.config.as_deref(), |key| {
        if key == "HOME_WATCH_DRY_RUN" {
            return Some("true".to_string());
        }
        std::env::var(key).ok()
    })?;
    logging::init(false);

    let sample = match (args.lat, args.lon, args.fetch) {
        (Some(lat), Some(lon), false) => PositionSample::new(lat, lon, 0),
        (None, None, true) => {
            let source = ThingsBoardSource::new(config.thingsboard())
                .context("Failed to create ThingsBoard client")?;
            match source.fetch_latest(config.device_id()).await? {
                Some(sample) => sample,
                None => bail!("device {} has no position yet", config.device_id()),
            }
        }
        _ => bail!("pass either --lat and --lon, or --fetch"),
    };

    let zone = config.zone();
    let evaluation = evaluate(&sample, zone)?;

    println!("Home:     {:.6}, {:.6} (radius {} m)", zone.latitude(), zone.longitude(), zone.radius_m());
    println!("Position: {:.6}, {:.6}", sample.latitude, sample.longitude);
    if args.fetch {
        println!("Time:     {}", format_timestamp(sample.timestamp_ms, config.display_offset()));
    }
    println!("Distance: {} m", evaluation.distance_m as u64);
    println!("Inside:   {}", if evaluation.is_inside { "yes" } else { "no" });

    Ok(())
}

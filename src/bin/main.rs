//! Thin CLI entry point: loads a station's configuration, wires up the perception
//! pipeline, and drains synchronized frames from an external acquisition source.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::Point3;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rm_radar_core::config::RadarConfig;
use rm_radar_core::robot::Detection;
use rm_radar_core::RadarStation;

// One synchronized camera/LiDAR tick: a point cloud plus the detector's car and armor
// boxes. Camera/LiDAR sync and neural detection are external collaborators; this
// binary only consumes already-assembled frames.
struct Frame {
    timestamp: f64,
    cloud: Vec<Point3<f32>>,
    cars: Vec<Detection>,
    armors: Vec<Detection>,
}

#[derive(Parser, Debug)]
#[command(about = "Radar station perception core: locates and tracks robots, reports positions to the referee system")]
struct Args {
    /// Path to the station's TOML configuration file.
    #[arg(short, long, default_value = "radar.toml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = RadarConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    let mut station = RadarStation::new(&config)?;
    info!("radar station initialized, referee link connected = {}", station.referee().is_connected());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner:.green} {msg}")
            .context("failed to set spinner template")?,
    );
    spinner.set_message("Waiting for frames...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    // The frame acquisition side (camera/LiDAR sync, neural detection) is not part of
    // this crate; a real deployment spawns that producer against `frame_tx`. Kept alive
    // here so the channel stays open for it.
    let (frame_tx, frame_rx) = mpsc::channel::<Frame>();
    let _frame_tx = frame_tx;

    let mut frame_count: u64 = 0;
    while let Ok(frame) = frame_rx.recv() {
        let robots = station.process_frame(frame.timestamp, &frame.cloud, &frame.cars, &frame.armors);
        frame_count += 1;
        spinner.set_message(format!(
            "processed {frame_count} frames, {} robots tracked",
            robots.len()
        ));

        if !station.referee().is_connected() {
            warn!("referee link disconnected, attempting reconnect");
            station.referee().reconnect();
        }
    }

    spinner.finish_with_message("frame source closed, shutting down");
    info!("processed {frame_count} frames total");
    Ok(())
}

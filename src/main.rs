//! Handhold: flags when two hands come close in a live webcam feed.

use anyhow::{Context, Result};
use clap::Parser;
use handhold::capture::{CaptureBackend, NokhwaCapture};
use handhold::config::{Config, Overrides};
use handhold::hand::{HandTracker, OnnxModel};
use handhold::output::WindowOutput;
use handhold::overlay::OverlayRenderer;
use handhold::processor::FrameProcessor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Detect hands in a webcam feed and highlight when two of them are close.
#[derive(Parser, Debug)]
#[command(name = "handhold")]
#[command(about = "Detect hands in real-time and flag when two wrists are close together")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index
    #[arg(short, long)]
    input: Option<u32>,

    /// Frame width
    #[arg(long)]
    width: Option<u32>,

    /// Frame height
    #[arg(long)]
    height: Option<u32>,

    /// Directory containing palm_detection.onnx and hand_landmark.onnx
    #[arg(long)]
    models: Option<PathBuf>,

    /// Wrist distance in pixels below which two hands count as close
    #[arg(long)]
    threshold: Option<f32>,

    /// List available cameras and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            device_index: self.input,
            width: self.width,
            height: self.height,
            model_dir: self.models.clone(),
            proximity_threshold: self.threshold,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.list_devices {
        println!("Available cameras:");
        match NokhwaCapture::list_devices() {
            Ok(devices) => {
                for device in devices {
                    println!("  [{}] {}", device.index, device.name);
                }
            }
            Err(e) => {
                eprintln!("Failed to list devices: {}", e);
            }
        }
        return Ok(());
    }

    if let Err(e) = run(args) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let config = Config::resolve(args.config.as_deref(), &args.overrides())?;

    info!("Starting Handhold...");
    OnnxModel::init()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        flag.store(true, Ordering::SeqCst);
    })?;

    let tracker = HandTracker::new(config.detector.clone())?;

    info!("Opening camera device {}...", config.camera.device_index);
    let capture = NokhwaCapture::open(config.camera.clone())
        .with_context(|| format!("failed to open camera {}", config.camera.device_index))?;

    let output = WindowOutput::new(config.window.clone()).context("failed to open window")?;

    let summary = FrameProcessor::new(capture, tracker, output, OverlayRenderer::new())
        .with_threshold(config.proximity_threshold)
        .with_wait(Duration::from_millis(config.wait_ms))
        .with_shutdown(shutdown)
        .run()?;

    info!(
        "Processed {} frames, hands close on {} ({:?})",
        summary.frames, summary.close_frames, summary.exit_reason
    );
    Ok(())
}

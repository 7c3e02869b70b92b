/*!
# Simulated Detector

Command-line front end for the simulated area detector. Runs an acquisition
from a TOML configuration file, optionally overridden from the command line,
and reports frames as they are produced.

## Usage

### Acquire from the configuration file (default)
```bash
simdetector --config simdetector.toml
```

### Acquire with overrides, printing one JSON summary per frame
```bash
simdetector acquire --mode multiple --num-images 20 --data-type uint16 --live
```

### Show the parameter table
```bash
simdetector params
```
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use shared::frame::ArcFrame;
use shared::DataType;
use simdetector::{AcquisitionState, AppConfig, ImageMode, SimDetector};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};

#[derive(Parser)]
#[command(name = "simdetector")]
#[command(about = "Simulated area detector producing synthetic image frames")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "simdetector.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an acquisition
    Acquire {
        /// Image mode: single, multiple or continuous
        #[arg(short, long)]
        mode: Option<ImageMode>,

        /// Number of frames in multiple mode
        #[arg(short, long)]
        num_images: Option<i32>,

        /// Exposure time in seconds
        #[arg(long)]
        acquire_time: Option<f64>,

        /// Time between frame starts in seconds
        #[arg(long)]
        acquire_period: Option<f64>,

        /// Pixel representation, e.g. uint8 or float32
        #[arg(short, long)]
        data_type: Option<DataType>,

        /// Print one JSON frame summary per line on stdout
        #[arg(long)]
        live: bool,
    },

    /// Print the parameter table of a freshly configured detector
    Params,

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "simdetector.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for live output
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match cli.command {
        Some(Commands::Acquire {
            mode,
            num_images,
            acquire_time,
            acquire_period,
            data_type,
            live,
        }) => {
            let mut config = load_config_or_default(&cli.config);
            if let Some(mode) = mode {
                config.acquisition.image_mode = mode;
            }
            if let Some(num_images) = num_images {
                config.acquisition.num_images = num_images;
            }
            if let Some(acquire_time) = acquire_time {
                config.acquisition.acquire_time = acquire_time;
            }
            if let Some(acquire_period) = acquire_period {
                config.acquisition.acquire_period = acquire_period;
            }
            if let Some(data_type) = data_type {
                config.detector.data_type = data_type;
            }
            config.output.live_json |= live;

            run_acquisition(config)
        }

        Some(Commands::Params) => print_params(load_config_or_default(&cli.config)),

        Some(Commands::Config { output }) => generate_config_file(output),

        None => {
            let config = AppConfig::load_from_file(&cli.config)?;
            println!("🚀 Starting acquisition from config: {}", cli.config.display());
            run_acquisition(config)
        }
    }
}

fn load_config_or_default(path: &Path) -> AppConfig {
    match AppConfig::load_from_file(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("⚠️ Failed to load config ({:#}), using defaults", e);
            AppConfig::new()
        }
    }
}

/// Create a configured detector without starting it
fn create_detector(config: &AppConfig) -> Result<SimDetector> {
    let detector = SimDetector::from_config(&config.detector).context("Failed to create detector")?;
    detector
        .write_batch(config.acquisition.param_writes())
        .context("Failed to apply acquisition settings")?;
    Ok(detector)
}

/// Run one acquisition to completion or until Ctrl+C
fn run_acquisition(config: AppConfig) -> Result<()> {
    let live = config.output.live_json;
    let detector = create_detector(&config)?;

    if !live {
        println!(
            "📷 Detector: {}x{} {}",
            config.detector.max_size_x, config.detector.max_size_y, config.detector.data_type
        );
        println!(
            "🎞️ Mode: {:?}, exposure {}s, period {}s",
            config.acquisition.image_mode, config.acquisition.acquire_time, config.acquisition.acquire_period
        );
    }

    let stats_interval = config.output.stats_interval_frames;
    let frames_seen = Arc::new(AtomicU64::new(0));
    let started = Instant::now();
    let counter = Arc::clone(&frames_seen);
    detector.add_frame_sink(Arc::new(move |frame: ArcFrame| {
        let seen = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if stats_interval > 0 && seen % stats_interval == 0 {
            let rate = seen as f64 / started.elapsed().as_secs_f64().max(f64::EPSILON);
            info!(
                "📊 {} frames, {:.1} fps, last frame {} ({}x{}, {} bytes)",
                seen,
                rate,
                frame.unique_id(),
                frame.size_x(),
                frame.size_y(),
                frame.total_bytes()
            );
        }
    }));

    if live {
        detector.add_frame_sink(Arc::new(|frame: ArcFrame| {
            match serde_json::to_string(&frame.summary()) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize frame {}: {}", frame.unique_id(), e),
            }
        }));
    }

    let updates = detector.subscribe_params();

    // Set up Ctrl+C handler
    let handle = detector.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, stopping acquisition...");
        if let Err(e) = handle.stop_acquisition() {
            eprintln!("Failed to stop acquisition: {}", e);
        }
    })?;

    detector.start_acquisition().context("Failed to start acquisition")?;

    // Done once acquire is clear and the last frame has been delivered
    loop {
        match updates.recv_timeout(Duration::from_millis(500)) {
            Ok(update) => debug!("{} = {}", update.id, update.value),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if !detector.is_acquiring() && detector.status() == AcquisitionState::Idle {
            break;
        }
    }

    let frames = frames_seen.load(Ordering::Relaxed);
    info!(
        "Acquisition finished: {} frames in {:.3}s, frame counter {}",
        frames,
        started.elapsed().as_secs_f64(),
        detector.frame_counter()
    );
    if !live {
        println!("✅ Acquisition completed: {} frames", frames);
    }
    Ok(())
}

/// Print every parameter with its type, access and current value
fn print_params(config: AppConfig) -> Result<()> {
    let detector = create_detector(&config)?;

    println!("{:<16} {:<6} {:<3} {}", "NAME", "TYPE", "RW", "VALUE");
    for (id, value) in detector.params() {
        let access = if id.is_read_only() { "ro" } else { "rw" };
        println!("{:<16} {:<6} {:<3} {}", id.name(), format!("{:?}", id.kind()), access, value);
    }

    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   simdetector --config {}", output_path.display());

    Ok(())
}

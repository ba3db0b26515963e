// SPDX-License-Identifier: GPL-3.0-only

use camcorder::RecorderKind;
use camcorder::constants::app_info;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camcorder")]
#[command(about = "Record video from V4L2 cameras")]
#[command(version = app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Spawn an external encoder process that reads the device itself
    External,
    /// Capture frames in this process and encode them with GStreamer
    InProcess,
}

impl From<Backend> for RecorderKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::External => RecorderKind::External,
            Backend::InProcess => RecorderKind::InProcess,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available capture devices
    List {
        /// Probe the framerates of every resolution (opens each device)
        #[arg(long)]
        framerates: bool,
    },

    /// Record a video
    Record {
        /// Device index to use (from 'camcorder list')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Frame width (default: last used for the device, or 640)
        #[arg(short = 'W', long)]
        width: Option<u32>,

        /// Frame height (default: last used for the device, or 480)
        #[arg(short = 'H', long)]
        height: Option<u32>,

        /// Framerate (default: last used for the device, or 30)
        #[arg(short, long)]
        fps: Option<u32>,

        /// Recording duration in seconds
        #[arg(short = 't', long, default_value = "10")]
        duration: u64,

        /// Recording backend (default: from config)
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,

        /// Output directory (default: from config, or ~/Videos/Camcorder)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List recorded videos
    Files {
        /// Directory to list (default: from config, or ~/Videos/Camcorder)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camcorder=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { framerates } => cli::list_devices(framerates),
        Commands::Record {
            device,
            width,
            height,
            fps,
            duration,
            backend,
            output,
        } => cli::record_video(cli::RecordOptions {
            device_index: device,
            width,
            height,
            framerate: fps,
            duration,
            backend: backend.map(RecorderKind::from),
            output,
        }),
        Commands::Files { output } => cli::list_files(output),
    }
}

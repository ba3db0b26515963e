// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camcorder operations
//!
//! This module provides command-line functionality for:
//! - Listing capture devices
//! - Recording videos
//! - Listing recorded files

use camcorder::backends::camera::{
    CaptureSession, DeviceDescriptor, DeviceRegistry, FourCc, Resolution,
};
use camcorder::config::{Config, FormatSettings};
use camcorder::constants::format_bitrate;
use camcorder::constants::formats::DEFAULT_FRAMERATE;
use camcorder::pipelines::video::{
    EncoderSettings, ExternalProcessRecorder, GstEncoderFactory, InProcessRecorder, Recorder,
    RecorderKind,
};
use camcorder::storage;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

const DEFAULT_RESOLUTION: Resolution = Resolution::new(640, 480);

/// Arguments of the `record` subcommand
pub struct RecordOptions {
    pub device_index: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub framerate: Option<u32>,
    pub duration: u64,
    pub backend: Option<RecorderKind>,
    pub output: Option<PathBuf>,
}

/// List all capture devices
pub fn list_devices(probe_framerates: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = DeviceRegistry::default();
    let devices = registry.scan_devices();

    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Available devices:");
    println!();
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {} ({})", index, device.name, device.path.display());
        println!("      Driver: {} ({})", device.driver, device.bus);

        let formats: Vec<String> = device.pixel_formats.iter().map(|f| f.to_string()).collect();
        println!("      Pixel formats: {}", formats.join(", "));

        if !probe_framerates {
            let res_strs: Vec<String> = device.resolutions.iter().map(|r| r.to_string()).collect();
            println!("      Resolutions: {}", res_strs.join(", "));
            println!();
            continue;
        }

        if let Err(e) = registry.open_device(&device.path) {
            println!("      Could not open device: {}", e);
            println!();
            continue;
        }
        println!("      Resolutions:");
        for resolution in registry.supported_resolutions() {
            let rates = registry.get_supported_framerates(resolution);
            let rate_strs: Vec<String> = rates.iter().map(|fps| format!("{}fps", fps)).collect();
            println!("        {:>9}  {}", resolution.to_string(), rate_strs.join(", "));
        }
        registry.close_device();
        println!();
    }

    Ok(())
}

/// Record a video from the selected device
pub fn record_video(options: RecordOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load();

    let mut registry = DeviceRegistry::default();
    let devices = registry.scan_devices();
    if devices.is_empty() {
        return Err("No capture devices found".into());
    }
    if options.device_index >= devices.len() {
        return Err(format!(
            "Device index {} out of range (0-{})",
            options.device_index,
            devices.len() - 1
        )
        .into());
    }

    let device = &devices[options.device_index];
    let device_key = device.path.to_string_lossy().into_owned();
    println!("Using device: {} ({})", device.name, device.path.display());

    let remembered = config.settings_for(&device_key).cloned();
    let resolution = Resolution::new(
        options
            .width
            .or(remembered.as_ref().map(|s| s.width))
            .unwrap_or(DEFAULT_RESOLUTION.width),
        options
            .height
            .or(remembered.as_ref().map(|s| s.height))
            .unwrap_or(DEFAULT_RESOLUTION.height),
    );
    let framerate = options
        .framerate
        .or(remembered.as_ref().map(|s| s.framerate))
        .unwrap_or(DEFAULT_FRAMERATE);

    let output_dir = options.output.clone().unwrap_or_else(|| config.output_dir());
    let backend = options.backend.unwrap_or(config.recorder_backend);
    let settings = EncoderSettings::for_resolution(config.bitrate_preset, resolution);

    println!("Backend: {}", backend);
    println!("Bitrate: {}", format_bitrate(settings.bitrate_kbps));
    println!("Output directory: {}", output_dir.display());
    println!("Duration: {} seconds", options.duration);

    let (recorder, mut session): (Arc<dyn Recorder>, Option<CaptureSession>) = match backend {
        RecorderKind::External => {
            if !device.resolutions.contains(&resolution) {
                warn!(%resolution, "Resolution not advertised by device");
            }
            println!("Recording format: {} @ {}fps", resolution, framerate);
            (external_recorder(device, &config, settings), None)
        }
        RecorderKind::InProcess => {
            registry.open_device(&device.path)?;
            let mut session = CaptureSession::new();
            let negotiated = session.init(&registry, resolution, framerate)?;
            println!("Recording format: {}", negotiated);

            let recorder = Arc::new(
                InProcessRecorder::new(Box::new(GstEncoderFactory))
                    .with_settings(settings)
                    .with_input_format(negotiated.pixel_format),
            );
            session.add_sink(recorder.clone());
            let recorder: Arc<dyn Recorder> = recorder;
            (recorder, Some(session))
        }
    };

    recorder.init(&output_dir)?;

    // Frames delivered before the recorder starts are ignored by it
    if let Some(session) = session.as_mut() {
        session.start()?;
    }
    let (resolution, framerate) = session
        .as_ref()
        .and_then(CaptureSession::negotiated)
        .map(|n| (n.resolution, n.framerate))
        .unwrap_or((resolution, framerate));

    println!();
    println!("Recording... (press Ctrl+C to stop early)");
    if let Err(e) = recorder.start(resolution, framerate) {
        if let Some(session) = session.as_mut() {
            session.stop();
        }
        return Err(e.into());
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let start = Instant::now();
    let target_duration = Duration::from_secs(options.duration);

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if !recorder.is_recording() {
            println!();
            println!("Recorder stopped unexpectedly");
            break;
        }

        print!(
            "\rRecording: {}",
            storage::format_duration(recorder.duration().as_secs())
        );
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    recorder.stop();
    if let Some(mut session) = session {
        session.stop();
        session.clear_sinks();
    }

    match recorder.current_path() {
        Some(path) => println!("Video saved: {}", path.display()),
        None => println!("No video was saved"),
    }

    config.remember(
        &device_key,
        FormatSettings {
            width: resolution.width,
            height: resolution.height,
            framerate,
        },
    );
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    Ok(())
}

/// Build the external recorder, letting the device deliver MJPEG when it can
fn external_recorder(
    device: &DeviceDescriptor,
    config: &Config,
    settings: EncoderSettings,
) -> Arc<dyn Recorder> {
    let input_format = device.supports_format(FourCc::MJPG).then_some("mjpeg");
    Arc::new(
        ExternalProcessRecorder::new(device.path.clone())
            .with_program(config.encoder_program.clone())
            .with_input_format(input_format)
            .with_settings(settings),
    )
}

/// List recorded videos, newest first
pub fn list_files(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let dir = output.unwrap_or_else(|| Config::load().output_dir());

    if !dir.is_dir() {
        println!("No recordings in {}", dir.display());
        return Ok(());
    }

    let entries = storage::list_recordings(&dir)?;
    if entries.is_empty() {
        println!("No recordings in {}", dir.display());
        return Ok(());
    }

    println!("Recordings in {}:", dir.display());
    println!();
    for entry in &entries {
        println!("  {}", entry.file_name);
        println!("      Path: {}", entry.path.display());
        if let Some(name) = &entry.name {
            println!("      Recorded: {}", name.timestamp.format("%Y-%m-%d %H:%M:%S"));
            println!("      Format: {} @ {}fps", name.resolution, name.framerate);
        }
        println!("      Size: {}", storage::format_file_size(entry.size));
        println!();
    }

    Ok(())
}

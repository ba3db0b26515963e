// SPDX-License-Identifier: MPL-2.0

//! Video recording backends
//!
//! Two backends share the [`Recorder`] contract:
//! - [`ExternalProcessRecorder`] supervises an encoder process that reads the
//!   device directly
//! - [`InProcessRecorder`] receives frames from a capture session and feeds a
//!   GStreamer encoding pipeline
//!
//! Both name their output with [`crate::storage::recording_file_name`] so
//! recordings list the same way regardless of backend.

pub mod encoder;
pub mod process;
pub mod recorder;

pub use encoder::GstEncoderFactory;
pub use process::{
    EncoderCommand, ExternalProcessRecorder, ProcessExit, ProcessSpawner, SupervisedChild,
    SystemSpawner,
};
pub use recorder::{EncoderFactory, FrameEncoder, InProcessRecorder};

use crate::backends::camera::types::Resolution;
use crate::constants::BitratePreset;
use crate::constants::recording::{
    CONTAINER_EXTENSION, DEFAULT_BITRATE_KBPS, OUTPUT_PIXEL_FORMAT, X264_PRESET, X264_TUNE,
};
use crate::errors::{RecordingError, RecordingResult};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Recording backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecorderKind {
    /// Encoder process reading the device itself
    #[default]
    External,
    /// Frames pushed from the capture session into GStreamer
    InProcess,
}

impl RecorderKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            RecorderKind::External => "external",
            RecorderKind::InProcess => "in-process",
        }
    }
}

impl std::fmt::Display for RecorderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Shared recording contract
///
/// A recorder is Idle until `start` succeeds and returns to Idle on `stop`
/// or when the backend fails. `start` while recording and `stop` while idle
/// are no-ops. Dropping a recorder stops it.
pub trait Recorder: Send + Sync {
    fn kind(&self) -> RecorderKind;

    /// Set and create the output directory
    fn init(&self, output_dir: &Path) -> RecordingResult<()>;

    fn start(&self, resolution: Resolution, framerate: u32) -> RecordingResult<()>;

    /// Stop recording; the output file is finalized when this returns
    fn stop(&self);

    fn is_recording(&self) -> bool;

    /// Path of the running recording, or of the last finished one
    fn current_path(&self) -> Option<PathBuf>;

    /// Time since start while recording, zero otherwise
    fn duration(&self) -> Duration;
}

/// State of one recording
#[derive(Debug, Clone)]
pub struct RecordingJob {
    pub kind: RecorderKind,
    pub path: PathBuf,
    pub started_at: Instant,
    pub resolution: Resolution,
    pub framerate: u32,
    /// Encoder process id for the external backend
    pub process_id: Option<u32>,
}

impl RecordingJob {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Encoding parameters shared by both backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub preset: String,
    pub tune: String,
    pub pixel_format: String,
    pub bitrate_kbps: u32,
    pub container: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            preset: X264_PRESET.to_string(),
            tune: X264_TUNE.to_string(),
            pixel_format: OUTPUT_PIXEL_FORMAT.to_string(),
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            container: CONTAINER_EXTENSION.to_string(),
        }
    }
}

impl EncoderSettings {
    /// Settings with the bitrate picked from a preset, or the fixed default
    pub fn for_resolution(preset: Option<BitratePreset>, resolution: Resolution) -> Self {
        let bitrate_kbps = preset
            .map(|p| p.bitrate_kbps(resolution.width, resolution.height))
            .unwrap_or(DEFAULT_BITRATE_KBPS);
        Self {
            bitrate_kbps,
            ..Self::default()
        }
    }
}

/// Create the output directory for a recorder
pub(crate) fn prepare_output_dir(dir: &Path) -> RecordingResult<PathBuf> {
    storage::ensure_directory(dir)
        .map_err(|e| RecordingError::OutputDirectory(format!("{}: {}", dir.display(), e)))?;
    Ok(dir.to_path_buf())
}

/// Output path for a recording starting now
pub(crate) fn output_path(
    dir: &Path,
    resolution: Resolution,
    framerate: u32,
    settings: &EncoderSettings,
) -> PathBuf {
    let now = chrono::Local::now().naive_local();
    dir.join(storage::recording_file_name(
        &now,
        resolution,
        framerate,
        &settings.container,
    ))
}

// SPDX-License-Identifier: MPL-2.0

//! Storage utilities for recorded video files
//!
//! Recordings are named `{YYYYMMDD}_{HHMMSS}_{W}x{H}_{FPS}fps.{ext}`. Both
//! recording backends generate names with [`recording_file_name`] and the
//! file listing parses them back with [`RecordingName::parse`].

use crate::backends::camera::types::Resolution;
use chrono::NaiveDateTime;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Length of the `YYYYMMDD_HHMMSS` prefix
const TIMESTAMP_LEN: usize = 15;

/// Extensions recognised as video files (lowercase, without dot)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm"];

/// Build the file name for a recording
pub fn recording_file_name(
    started: &NaiveDateTime,
    resolution: Resolution,
    framerate: u32,
    extension: &str,
) -> String {
    format!(
        "{}_{}_{}fps.{}",
        started.format(TIMESTAMP_FORMAT),
        resolution,
        framerate,
        extension
    )
}

/// Metadata recovered from a recording file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingName {
    pub timestamp: NaiveDateTime,
    pub resolution: Resolution,
    pub framerate: u32,
    pub extension: String,
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl RecordingName {
    /// Parse a file name produced by [`recording_file_name`]
    ///
    /// Returns `None` for names that do not follow the naming scheme or
    /// carry an impossible date.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stamp = file_name.get(..TIMESTAMP_LEN)?;
        let (date, time) = stamp.split_once('_')?;
        if date.len() != 8 || time.len() != 6 || !all_digits(date) || !all_digits(time) {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;

        let rest = file_name.get(TIMESTAMP_LEN..)?.strip_prefix('_')?;
        let (resolution, tail) = rest.split_once('_')?;
        let (width, height) = resolution.split_once('x')?;
        if !all_digits(width) || !all_digits(height) {
            return None;
        }
        let resolution = Resolution::new(width.parse().ok()?, height.parse().ok()?);

        let (fps, extension) = tail.split_once("fps.")?;
        if !all_digits(fps) || extension.is_empty() {
            return None;
        }

        Some(Self {
            timestamp,
            resolution,
            framerate: fps.parse().ok()?,
            extension: extension.to_string(),
        })
    }
}

/// Create a directory and its parents
///
/// Succeeds when the directory already exists. Fails when the path exists
/// but is not a directory.
pub fn ensure_directory(path: &Path) -> io::Result<()> {
    if path.exists() {
        if path.is_dir() {
            return Ok(());
        }
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} exists and is not a directory", path.display()),
        ));
    }
    std::fs::create_dir_all(path)?;
    info!(path = %path.display(), "Created directory");
    Ok(())
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// A video file found in the output directory
#[derive(Debug, Clone)]
pub struct RecordingEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// `None` when the name does not follow the naming scheme
    pub name: Option<RecordingName>,
    pub size: u64,
}

/// List video files in `dir`, newest first
///
/// Files are ordered by the timestamp in their name. Files whose name cannot
/// be parsed come last.
pub fn list_recordings(dir: &Path) -> io::Result<Vec<RecordingEntry>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() || !is_video_file(&path) {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        entries.push(RecordingEntry {
            name: RecordingName::parse(&file_name),
            file_name,
            path,
            size: metadata.len(),
        });
    }

    entries.sort_by(|a, b| {
        let key = |e: &RecordingEntry| e.name.as_ref().map(|n| n.timestamp);
        // Some(_) > None, so reversing puts unparsable names last
        key(b)
            .cmp(&key(a))
            .then_with(|| b.file_name.cmp(&a.file_name))
    });

    debug!(dir = %dir.display(), count = entries.len(), "Listed recordings");
    Ok(entries)
}

/// Remove a recording from disk
pub fn delete_recording(path: &Path) -> io::Result<()> {
    std::fs::remove_file(path)?;
    info!(path = %path.display(), "Deleted recording");
    Ok(())
}

/// Human-readable size with two decimals (e.g., "1.50 MB")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Format seconds as HH:MM:SS
pub fn format_duration(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::BitratePreset;
use crate::constants::app_info::APP_DIR;
use crate::constants::recording::ENCODER_PROGRAM;
use crate::errors::AppResult;
use crate::pipelines::video::RecorderKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name under the user's video directory
const VIDEO_SUBDIR: &str = "Camcorder";

const CONFIG_FILE: &str = "config.json";

/// Capture settings remembered for a specific device
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatSettings {
    /// Resolution width
    pub width: u32,
    /// Resolution height
    pub height: u32,
    /// Framerate
    pub framerate: u32,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where recordings are written; `None` uses the default video directory
    pub output_dir: Option<PathBuf>,
    /// Last used device path
    pub last_device_path: Option<String>,
    /// Capture settings per device (key = device path)
    pub video_settings: HashMap<String, FormatSettings>,
    /// Recording backend
    pub recorder_backend: RecorderKind,
    /// Bitrate preset; `None` keeps the fixed default bitrate
    pub bitrate_preset: Option<BitratePreset>,
    /// Program launched by the external recorder
    pub encoder_program: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: None,
            last_device_path: None,
            video_settings: HashMap::new(),
            recorder_backend: RecorderKind::default(),
            bitrate_preset: None,
            encoder_program: ENCODER_PROGRAM.to_string(),
        }
    }
}

impl Config {
    /// Location of the config file
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load the config, falling back to defaults
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from a specific file; a missing or invalid file yields defaults
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No config file, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> AppResult<()> {
        let path = Self::path()
            .ok_or_else(|| crate::errors::AppError::Config("No config directory".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Configured output directory or the default one
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_dir)
    }

    pub fn settings_for(&self, device_path: &str) -> Option<&FormatSettings> {
        self.video_settings.get(device_path)
    }

    /// Remember the settings used for a device
    pub fn remember(&mut self, device_path: &str, settings: FormatSettings) {
        self.last_device_path = Some(device_path.to_string());
        self.video_settings
            .insert(device_path.to_string(), settings);
    }
}

/// `~/Videos/Camcorder`, falling back to the home directory, then `.`
pub fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(VIDEO_SUBDIR)
}

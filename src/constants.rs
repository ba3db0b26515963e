// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};

/// Video encoder bitrate presets
///
/// These presets define the target bitrate for video encoding based on resolution.
/// When no preset is configured the recorders use [`recording::DEFAULT_BITRATE_KBPS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Low bitrate - smaller files, reduced quality
    Low,
    /// Medium bitrate - balanced quality and file size (default)
    #[default]
    Medium,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    /// Get all preset variants for iteration
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Get bitrate in kbps for a given resolution
    ///
    /// - SD (640x480): Low=1, Medium=2, High=4 Mbps
    /// - HD (1280x720): Low=2.5, Medium=5, High=10 Mbps
    /// - Full HD (1920x1080): Low=4, Medium=8, High=16 Mbps
    /// - 2K (2560x1440): Low=8, Medium=16, High=32 Mbps
    /// - 4K (3840x2160): Low=15, Medium=30, High=50 Mbps
    pub fn bitrate_kbps(&self, width: u32, _height: u32) -> u32 {
        self.bitrate_for_tier(get_resolution_tier(width))
    }

    /// Get the bitrate for a specific resolution tier
    pub fn bitrate_for_tier(&self, tier: ResolutionTier) -> u32 {
        match (tier, self) {
            (ResolutionTier::SD, BitratePreset::Low) => 1_000,
            (ResolutionTier::SD, BitratePreset::Medium) => 2_000,
            (ResolutionTier::SD, BitratePreset::High) => 4_000,
            (ResolutionTier::HD, BitratePreset::Low) => 2_500,
            (ResolutionTier::HD, BitratePreset::Medium) => 5_000,
            (ResolutionTier::HD, BitratePreset::High) => 10_000,
            (ResolutionTier::FullHD, BitratePreset::Low) => 4_000,
            (ResolutionTier::FullHD, BitratePreset::Medium) => 8_000,
            (ResolutionTier::FullHD, BitratePreset::High) => 16_000,
            (ResolutionTier::TwoK, BitratePreset::Low) => 8_000,
            (ResolutionTier::TwoK, BitratePreset::Medium) => 16_000,
            (ResolutionTier::TwoK, BitratePreset::High) => 32_000,
            (ResolutionTier::FourK, BitratePreset::Low) => 15_000,
            (ResolutionTier::FourK, BitratePreset::Medium) => 30_000,
            (ResolutionTier::FourK, BitratePreset::High) => 50_000,
        }
    }

    /// Parse a preset from its display name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.display_name().eq_ignore_ascii_case(name))
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// SD: 640x480 and below
    SD,
    /// HD: 1280x720
    HD,
    /// Full HD: 1920x1080
    FullHD,
    /// 2K: 2560x1440
    TwoK,
    /// 4K: 3840x2160 and above
    FourK,
}

/// Get the resolution tier for a given width
pub fn get_resolution_tier(width: u32) -> ResolutionTier {
    match width {
        w if w >= 3840 => ResolutionTier::FourK,
        w if w >= 2560 => ResolutionTier::TwoK,
        w if w >= 1920 => ResolutionTier::FullHD,
        w if w >= 1280 => ResolutionTier::HD,
        _ => ResolutionTier::SD,
    }
}

/// Format bitrate for display (e.g., "8 Mbps" or "2.5 Mbps")
pub fn format_bitrate(kbps: u32) -> String {
    let mbps = kbps as f64 / 1000.0;
    if mbps == mbps.floor() {
        format!("{} Mbps", mbps as u32)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Format negotiation constants
pub mod formats {
    /// Framerates probed against the driver's frame-interval negotiation
    pub const CANDIDATE_FRAMERATES: [u32; 3] = [15, 30, 60];

    /// Framerate reported for drivers without frame-interval negotiation
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// Pixel format requested when negotiating a resolution
    pub const PREFERRED_PIXEL_FORMAT: [u8; 4] = *b"YUYV";

    /// Largest stepwise grid expanded point by point
    ///
    /// Wider ranges fall back to the range bounds plus [`COMMON_RESOLUTIONS`].
    pub const MAX_STEPWISE_RESOLUTIONS: usize = 256;

    /// Well-known resolutions tried inside wide stepwise ranges
    pub const COMMON_RESOLUTIONS: &[(u32, u32)] = &[
        (160, 120),
        (320, 240),
        (640, 480),
        (800, 600),
        (1024, 768),
        (1280, 720),
        (1280, 960),
        (1600, 1200),
        (1920, 1080),
        (2560, 1440),
        (3840, 2160),
    ];
}

/// Capture thread constants
pub mod capture {
    /// Number of mmap buffers queued on the driver
    pub const STREAM_BUFFER_COUNT: u32 = 4;

    /// Name used for the acquisition thread in logs
    pub const THREAD_NAME: &str = "camera-acquisition";
}

/// Recording constants shared by both backends
pub mod recording {
    use std::time::Duration;

    /// Bitrate used when no preset is configured
    pub const DEFAULT_BITRATE_KBPS: u32 = 2_000;

    /// x264 speed preset tuned for realtime capture
    pub const X264_PRESET: &str = "ultrafast";

    /// x264 tuning for low latency
    pub const X264_TUNE: &str = "zerolatency";

    /// Output pixel format
    pub const OUTPUT_PIXEL_FORMAT: &str = "yuv420p";

    /// Container extension of recorded files
    pub const CONTAINER_EXTENSION: &str = "mp4";

    /// External encoder binary
    pub const ENCODER_PROGRAM: &str = "ffmpeg";

    /// How often the supervisor checks the encoder process
    pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// How long closing the in-process encoder waits for EOS
    pub const EOS_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 300;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Directory name used under the config and video directories
    pub const APP_DIR: &str = "camcorder";
}

// SPDX-License-Identifier: GPL-3.0-only
// Shared types for device negotiation and capture

//! Shared types for camera backends

use crate::constants::formats::{COMMON_RESOLUTIONS, MAX_STEPWISE_RESOLUTIONS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Frame dimensions
///
/// Ordered by width, then height. Enumeration results are sorted and
/// deduplicated with this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse "WIDTHxHEIGHT"
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.split_once('x')?;
        let width = w.parse().ok()?;
        let height = h.parse().ok()?;
        Some(Self { width, height })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Framerate as a fraction (numerator/denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Build from a V4L2 frame interval (seconds per frame)
    pub fn from_interval(numerator: u32, denominator: u32) -> Self {
        Self::new(denominator, numerator)
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Get the truncated integer framerate
    pub fn as_int(&self) -> u32 {
        self.num / self.denom
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // NTSC rates keep their decimals
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// Four-character pixel format code as reported by the driver
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const YUYV: FourCc = FourCc(*b"YUYV");
    pub const MJPG: FourCc = FourCc(*b"MJPG");

    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Debug for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

/// Pixel formats the encoders know how to consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    Yuyv,
    /// UYVY - Packed 4:2:2 (U Y0 V Y1 interleaved)
    Uyvy,
    /// NV12 - Semi-planar 4:2:0
    Nv12,
    /// I420 - Planar 4:2:0
    I420,
    /// RGB24 - 3 bytes per pixel
    Rgb24,
    /// Gray8 - single channel
    Gray8,
    /// Motion JPEG, one compressed image per frame
    Mjpeg,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: FourCc) -> Option<Self> {
        match fourcc.as_bytes() {
            b"YUYV" => Some(Self::Yuyv),
            b"UYVY" => Some(Self::Uyvy),
            b"NV12" => Some(Self::Nv12),
            b"YU12" => Some(Self::I420),
            b"RGB3" => Some(Self::Rgb24),
            b"GREY" => Some(Self::Gray8),
            b"MJPG" => Some(Self::Mjpeg),
            _ => None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Mjpeg)
    }

    /// GStreamer `video/x-raw` format string, `None` for compressed formats
    pub fn to_gst_format_string(&self) -> Option<&'static str> {
        match self {
            Self::Yuyv => Some("YUY2"),
            Self::Uyvy => Some("UYVY"),
            Self::Nv12 => Some("NV12"),
            Self::I420 => Some("I420"),
            Self::Rgb24 => Some("RGB"),
            Self::Gray8 => Some("GRAY8"),
            Self::Mjpeg => None,
        }
    }
}

/// Answer to the driver capability query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Name of the device (V4L2 card)
    pub card: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
    /// Bus info (V4L2 bus_info)
    pub bus: String,
    /// Whether the node reports the video capture capability
    pub capture: bool,
}

/// A capture-capable device found during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Device node (e.g., /dev/video0)
    pub path: PathBuf,
    /// Display name (V4L2 card)
    pub name: String,
    pub driver: String,
    pub bus: String,
    /// Pixel formats in driver order
    pub pixel_formats: Vec<FourCc>,
    /// Deduplicated, sorted by width then height
    pub resolutions: Vec<Resolution>,
}

impl DeviceDescriptor {
    pub fn supports_format(&self, fourcc: FourCc) -> bool {
        self.pixel_formats.contains(&fourcc)
    }
}

/// One frame-size entry reported for a pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSizeSpec {
    Discrete(Resolution),
    Stepwise(StepwiseRange),
}

impl FrameSizeSpec {
    /// Concrete resolutions this entry stands for
    pub fn resolutions(&self) -> Vec<Resolution> {
        match self {
            FrameSizeSpec::Discrete(resolution) => vec![*resolution],
            FrameSizeSpec::Stepwise(range) => range.expand(),
        }
    }
}

/// Continuous frame-size range (V4L2 stepwise or continuous)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepwiseRange {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl StepwiseRange {
    /// Number of grid points along each axis
    fn axis_points(min: u32, max: u32, step: u32) -> u64 {
        if max < min {
            return 0;
        }
        ((max - min) / step.max(1)) as u64 + 1
    }

    /// Total number of resolutions on the grid
    pub fn grid_size(&self) -> u64 {
        Self::axis_points(self.min_width, self.max_width, self.step_width)
            .saturating_mul(Self::axis_points(
                self.min_height,
                self.max_height,
                self.step_height,
            ))
    }

    /// Whether a resolution lies inside the range and on the step grid
    pub fn contains(&self, resolution: Resolution) -> bool {
        let on_axis = |value: u32, min: u32, max: u32, step: u32| {
            value >= min && value <= max && (value - min) % step.max(1) == 0
        };
        on_axis(
            resolution.width,
            self.min_width,
            self.max_width,
            self.step_width,
        ) && on_axis(
            resolution.height,
            self.min_height,
            self.max_height,
            self.step_height,
        )
    }

    /// Expand the range into concrete resolutions
    ///
    /// Small grids are expanded point by point. Larger ones yield the range
    /// bounds plus every common resolution that the range accepts.
    pub fn expand(&self) -> Vec<Resolution> {
        let grid = self.grid_size();
        if grid == 0 {
            return Vec::new();
        }

        let mut out = Vec::new();
        if grid <= MAX_STEPWISE_RESOLUTIONS as u64 {
            let step_w = self.step_width.max(1) as usize;
            let step_h = self.step_height.max(1) as usize;
            for width in (self.min_width..=self.max_width).step_by(step_w) {
                for height in (self.min_height..=self.max_height).step_by(step_h) {
                    out.push(Resolution::new(width, height));
                }
            }
            return out;
        }

        out.push(Resolution::new(self.min_width, self.min_height));
        out.extend(
            COMMON_RESOLUTIONS
                .iter()
                .map(|&(w, h)| Resolution::new(w, h))
                .filter(|r| self.contains(*r)),
        );
        out.push(Resolution::new(self.max_width, self.max_height));
        out
    }
}

/// Whether the driver negotiates frame intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameIntervalSupport {
    /// The driver accepts interval requests; `current` is the active rate
    Negotiable { current: Framerate },
    /// The driver runs at a fixed rate and ignores interval requests
    Fixed,
}

/// Format agreed with the driver for a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub resolution: Resolution,
    pub pixel_format: FourCc,
    pub framerate: u32,
}

impl std::fmt::Display for NegotiatedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} @ {}fps",
            self.resolution, self.pixel_format, self.framerate
        )
    }
}

/// A single frame read from the device
///
/// Pixel data is shared immutably, so cloning a frame never aliases a
/// buffer the acquisition thread writes into.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub format: FourCc,
    /// Bytes per row, 0 for compressed formats
    pub stride: u32,
    pub data: Arc<[u8]>,
    /// Monotonically increasing per stream
    pub sequence: u64,
    pub captured_at: Instant,
}

impl CameraFrame {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_fourcc(self.format)
    }
}

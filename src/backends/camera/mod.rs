// SPDX-License-Identifier: MPL-2.0
// Camera backend with trait-based abstraction over the capture driver

//! Camera backend abstraction
//!
//! Device discovery and format negotiation run against a small driver
//! contract so the same logic serves real V4L2 nodes and test doubles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   CLI / Caller      │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐      ┌────────────────┐
//! │   CaptureSession    │ ───► │  FrameSink(s)  │
//! └──────────┬──────────┘      └────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   DeviceRegistry    │  ← Enumeration and negotiation
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ DeviceProvider /    │  ← Driver capability contract
//! │ CaptureDriver       │
//! └──────────┬──────────┘
//!            │
//!            ▼
//!        ┌──────┐
//!        │ V4L2 │  ← Concrete implementation
//!        └──────┘
//! ```

pub mod frame_loop;
pub mod registry;
pub mod session;
pub mod types;
pub mod v4l2_utils;

pub use registry::{DeviceRegistry, OpenDevice};
pub use session::{CaptureSession, FrameSink};
pub use types::*;
pub use v4l2_utils::V4l2Provider;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of device nodes
pub trait DeviceProvider: Send + Sync {
    /// Candidate device nodes, sorted by path
    fn device_nodes(&self) -> io::Result<Vec<PathBuf>>;

    /// Open a node for capability queries and negotiation
    fn open(&self, path: &Path) -> io::Result<Arc<dyn CaptureDriver>>;
}

/// An open device node
///
/// Methods mirror the driver queries: capability bits, format and frame-size
/// enumeration, and get/set of format and frame interval. Setters return the
/// value the driver actually applied, which may differ from the request.
pub trait CaptureDriver: Send + Sync {
    fn capabilities(&self) -> io::Result<DeviceCapabilities>;

    fn pixel_formats(&self) -> io::Result<Vec<FourCc>>;

    fn frame_sizes(&self, fourcc: FourCc) -> io::Result<Vec<FrameSizeSpec>>;

    /// Apply a format, returning the driver-adjusted resolution and fourcc
    fn set_format(&self, resolution: Resolution, fourcc: FourCc)
    -> io::Result<(Resolution, FourCc)>;

    fn frame_interval_support(&self) -> io::Result<FrameIntervalSupport>;

    /// Request a framerate, returning the rate the driver echoed back
    fn set_framerate(&self, fps: u32) -> io::Result<Framerate>;

    /// Start streaming with the currently applied format
    fn open_stream(&self) -> io::Result<Box<dyn FrameSource>>;
}

/// A running capture stream
pub trait FrameSource: Send {
    /// Block until the next frame is available
    fn read_frame(&mut self) -> io::Result<CameraFrame>;
}

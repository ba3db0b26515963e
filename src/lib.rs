// SPDX-License-Identifier: MPL-2.0

//! Camcorder - V4L2 camera capture and recording for Linux
//!
//! This library enumerates capture devices, negotiates formats with their
//! drivers, runs frame acquisition on a background thread, and records video
//! through an external encoder process or an in-process GStreamer pipeline.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Device enumeration, negotiation and the capture session
//! - [`pipelines`]: Recording backends
//! - [`config`]: User configuration handling
//! - [`storage`]: Recording file naming and listing
//!
//! # Example
//!
//! ```ignore
//! let mut registry = DeviceRegistry::default();
//! let device = registry.scan_devices().into_iter().next()?;
//! registry.open_device(&device.path)?;
//!
//! let mut session = CaptureSession::new();
//! session.init(&registry, Resolution::new(640, 480), 30)?;
//! session.add_sink(Arc::new(|frame: &CameraFrame| println!("{}", frame.sequence)));
//! session.start()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{
    CameraFrame, CaptureSession, DeviceDescriptor, DeviceRegistry, FrameSink, NegotiatedFormat,
    Resolution,
};
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{AppError, AppResult, DeviceError, RecordingError};
pub use pipelines::video::{ExternalProcessRecorder, InProcessRecorder, Recorder, RecorderKind};

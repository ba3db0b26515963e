// SPDX-License-Identifier: MPL-2.0

//! Recording pipelines
//!
//! Two interchangeable backends produce an H.264 MP4 file named after the
//! recording start time, resolution and framerate.
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Device Node  │ ──▶ │ External Process  │ ──▶ │   MP4 File   │
//! │ /dev/videoN  │     │  (ffmpeg v4l2)    │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Capture      │ ──▶ │ In-Process        │ ──▶ │   MP4 File   │
//! │ Session sink │     │  (GStreamer x264) │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`video`]: Recorder trait and both recording backends

pub mod video;

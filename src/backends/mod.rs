// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! # Architecture
//!
//! The backend layer hides the kernel video interface behind the
//! [`camera::DeviceProvider`] and [`camera::CaptureDriver`] traits so the
//! registry and capture session can run against real hardware or a stub:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            CLI / Recording Layer             │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌────────────────┐   ┌──────────────────┐  │
//! │  │ DeviceRegistry │──▶│  CaptureSession  │  │
//! │  └───────┬────────┘   └────────┬─────────┘  │
//! │          │      CaptureDriver  │            │
//! │  ┌───────┴─────────────────────┴─────────┐  │
//! │  │              V4L2 (v4l)               │  │
//! │  └───────────────────────────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Device enumeration, format negotiation and frame capture

pub mod camera;

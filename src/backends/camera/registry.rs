// SPDX-License-Identifier: GPL-3.0-only

//! Device enumeration and format negotiation
//!
//! The registry scans device nodes, describes the capture-capable ones, and
//! keeps at most one device open for negotiation. Negotiation runs in two
//! stages, format first and frame interval second, and a failing stage aborts
//! the call.

use super::types::{
    DeviceDescriptor, FourCc, FrameIntervalSupport, NegotiatedFormat, Resolution,
};
use super::v4l2_utils::V4l2Provider;
use super::{CaptureDriver, DeviceProvider};
use crate::constants::formats::{CANDIDATE_FRAMERATES, DEFAULT_FRAMERATE, PREFERRED_PIXEL_FORMAT};
use crate::errors::{DeviceError, DeviceResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle to the device currently held open by a [`DeviceRegistry`]
#[derive(Clone)]
pub struct OpenDevice {
    pub path: PathBuf,
    pub descriptor: DeviceDescriptor,
    pub driver: Arc<dyn CaptureDriver>,
}

impl std::fmt::Debug for OpenDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenDevice")
            .field("path", &self.path)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

pub struct DeviceRegistry {
    provider: Arc<dyn DeviceProvider>,
    pixel_format: FourCc,
    current: Option<OpenDevice>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(Arc::new(V4l2Provider::new()))
    }
}

impl DeviceRegistry {
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        Self {
            provider,
            pixel_format: FourCc(PREFERRED_PIXEL_FORMAT),
            current: None,
        }
    }

    /// Negotiate with a different pixel format than YUYV
    pub fn with_pixel_format(mut self, fourcc: FourCc) -> Self {
        self.pixel_format = fourcc;
        self
    }

    pub fn pixel_format(&self) -> FourCc {
        self.pixel_format
    }

    /// Enumerate capture-capable devices
    ///
    /// Nodes that fail to open, lack the capture capability, or report no
    /// resolutions are skipped. An unreadable device directory yields an
    /// empty list.
    pub fn scan_devices(&self) -> Vec<DeviceDescriptor> {
        let nodes = match self.provider.device_nodes() {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "Cannot list device nodes");
                return Vec::new();
            }
        };

        let mut devices = Vec::new();
        for path in nodes {
            let driver = match self.provider.open(&path) {
                Ok(driver) => driver,
                Err(e) => {
                    debug!(device = %path.display(), error = %e, "Skipping device that failed to open");
                    continue;
                }
            };

            match describe(&path, driver.as_ref()) {
                Ok(descriptor) => {
                    debug!(
                        device = %path.display(),
                        name = %descriptor.name,
                        resolutions = descriptor.resolutions.len(),
                        "Found capture device"
                    );
                    devices.push(descriptor);
                }
                Err(e) => {
                    debug!(device = %path.display(), error = %e, "Skipping device");
                }
            }
        }

        info!(count = devices.len(), "Device scan complete");
        devices
    }

    /// Open a device, replacing any previously open one
    ///
    /// Fails with [`DeviceError::Unavailable`] when the node cannot be opened
    /// and with [`DeviceError::NotCaptureDevice`] when it is not a camera.
    /// On failure the previous device is already closed.
    pub fn open_device(&mut self, path: &Path) -> DeviceResult<DeviceDescriptor> {
        self.close_device();

        let driver = self.provider.open(path).map_err(|e| {
            warn!(device = %path.display(), error = %e, "Failed to open device");
            DeviceError::Unavailable(format!("{}: {}", path.display(), e))
        })?;

        let descriptor = describe(path, driver.as_ref())?;

        info!(
            device = %path.display(),
            name = %descriptor.name,
            driver = %descriptor.driver,
            "Opened device"
        );

        self.current = Some(OpenDevice {
            path: path.to_path_buf(),
            descriptor: descriptor.clone(),
            driver,
        });
        Ok(descriptor)
    }

    pub fn close_device(&mut self) {
        if let Some(device) = self.current.take() {
            info!(device = %device.path.display(), "Closed device");
        }
    }

    pub fn current_device(&self) -> Option<OpenDevice> {
        self.current.clone()
    }

    /// Resolutions of the open device, empty when none is open
    pub fn supported_resolutions(&self) -> Vec<Resolution> {
        self.current
            .as_ref()
            .map(|device| device.descriptor.resolutions.clone())
            .unwrap_or_default()
    }

    /// Framerates the driver accepts at `resolution`
    ///
    /// Each candidate rate is requested and the echoed rate recorded. Drivers
    /// without frame-interval negotiation report only the default rate. Any
    /// failure to apply the resolution yields an empty list.
    pub fn get_supported_framerates(&self, resolution: Resolution) -> Vec<u32> {
        let Some(device) = &self.current else {
            return Vec::new();
        };
        let driver = device.driver.as_ref();

        if let Err(e) = driver.set_format(resolution, self.pixel_format) {
            debug!(device = %device.path.display(), %resolution, error = %e, "Format rejected while probing framerates");
            return Vec::new();
        }

        let support = match driver.frame_interval_support() {
            Ok(support) => support,
            Err(e) => {
                debug!(device = %device.path.display(), error = %e, "Cannot query frame interval support");
                return Vec::new();
            }
        };

        match support {
            FrameIntervalSupport::Fixed => vec![DEFAULT_FRAMERATE],
            FrameIntervalSupport::Negotiable { .. } => {
                let mut rates = Vec::new();
                for fps in CANDIDATE_FRAMERATES {
                    match driver.set_framerate(fps) {
                        Ok(actual) => {
                            let actual = actual.as_int();
                            if actual > 0 && !rates.contains(&actual) {
                                rates.push(actual);
                            }
                        }
                        Err(e) => {
                            debug!(fps, error = %e, "Framerate rejected");
                        }
                    }
                }
                rates.sort_unstable();
                rates
            }
        }
    }

    /// Apply resolution then framerate to the open device
    ///
    /// Returns the negotiated format as echoed by the driver. A format
    /// failure returns before the frame interval is touched.
    pub fn set_resolution_and_framerate(
        &self,
        resolution: Resolution,
        framerate: u32,
    ) -> DeviceResult<NegotiatedFormat> {
        let device = self.current.as_ref().ok_or(DeviceError::NotOpen)?;
        let driver = device.driver.as_ref();

        let (actual_resolution, actual_format) = driver
            .set_format(resolution, self.pixel_format)
            .map_err(|e| {
                warn!(device = %device.path.display(), %resolution, error = %e, "Format rejected");
                DeviceError::UnsupportedFormat(format!("{} {}: {}", resolution, self.pixel_format, e))
            })?;

        if actual_resolution != resolution {
            warn!(
                requested = %resolution,
                actual = %actual_resolution,
                "Driver adjusted resolution"
            );
        }

        let support = driver.frame_interval_support().map_err(|e| {
            DeviceError::UnsupportedFramerate(format!("cannot query frame interval: {}", e))
        })?;

        let actual_framerate = match support {
            FrameIntervalSupport::Fixed if framerate == DEFAULT_FRAMERATE => DEFAULT_FRAMERATE,
            FrameIntervalSupport::Fixed => {
                return Err(DeviceError::UnsupportedFramerate(format!(
                    "{} fps requested but driver has a fixed frame interval",
                    framerate
                )));
            }
            FrameIntervalSupport::Negotiable { .. } => driver
                .set_framerate(framerate)
                .map_err(|e| {
                    warn!(device = %device.path.display(), framerate, error = %e, "Frame interval rejected");
                    DeviceError::UnsupportedFramerate(format!("{} fps: {}", framerate, e))
                })?
                .as_int(),
        };

        let negotiated = NegotiatedFormat {
            resolution: actual_resolution,
            pixel_format: actual_format,
            framerate: actual_framerate,
        };
        info!(device = %device.path.display(), format = %negotiated, "Negotiated format");
        Ok(negotiated)
    }
}

/// Build a descriptor for an opened node
fn describe(path: &Path, driver: &dyn CaptureDriver) -> DeviceResult<DeviceDescriptor> {
    let caps = driver
        .capabilities()
        .map_err(|e| DeviceError::NotCaptureDevice(format!("{}: {}", path.display(), e)))?;

    if !caps.capture {
        return Err(DeviceError::NotCaptureDevice(path.display().to_string()));
    }

    let pixel_formats = driver.pixel_formats().unwrap_or_default();

    let mut resolutions = BTreeSet::new();
    for fourcc in &pixel_formats {
        match driver.frame_sizes(*fourcc) {
            Ok(sizes) => {
                for size in sizes {
                    resolutions.extend(size.resolutions());
                }
            }
            Err(e) => {
                debug!(device = %path.display(), %fourcc, error = %e, "Cannot enumerate frame sizes");
            }
        }
    }

    if resolutions.is_empty() {
        return Err(DeviceError::NoResolutions(path.display().to_string()));
    }

    Ok(DeviceDescriptor {
        path: path.to_path_buf(),
        name: caps.card,
        driver: caps.driver,
        bus: caps.bus,
        pixel_formats,
        resolutions: resolutions.into_iter().collect(),
    })
}

// SPDX-License-Identifier: GPL-3.0-only

//! Capture session: one open device, one acquisition thread
//!
//! Frames are read on a dedicated thread, stored as the most recent frame,
//! and handed to every registered [`FrameSink`] in registration order before
//! the next frame is read. Delivery is synchronous and unbuffered, so a slow
//! sink slows the capture cadence.

use super::frame_loop::{CaptureLoopController, FramePacer, LoopAction};
use super::registry::{DeviceRegistry, OpenDevice};
use super::FrameSource;
use super::types::{CameraFrame, FrameIntervalSupport, NegotiatedFormat, Resolution};
use crate::constants::capture::THREAD_NAME;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{DeviceError, DeviceResult};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Consumer of captured frames
///
/// Called on the acquisition thread for every frame. Implementations must
/// return quickly and must not call [`CaptureSession::stop`] on the session
/// that is delivering to them: `stop` joins the acquisition thread and would
/// wait on itself.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: &CameraFrame);
}

impl<F> FrameSink for F
where
    F: Fn(&CameraFrame) + Send + Sync,
{
    fn on_frame(&self, frame: &CameraFrame) {
        self(frame)
    }
}

type SinkList = Arc<Mutex<Vec<Arc<dyn FrameSink>>>>;

/// Idle until [`start`](Self::start), capturing until [`stop`](Self::stop)
/// or a read failure.
#[derive(Default)]
pub struct CaptureSession {
    device: Option<OpenDevice>,
    negotiated: Option<NegotiatedFormat>,
    sinks: SinkList,
    last_frame: Arc<Mutex<Option<CameraFrame>>>,
    frames_captured: Arc<AtomicU64>,
    controller: Option<CaptureLoopController>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiate a format on the registry's open device
    ///
    /// Any running capture is stopped first. The device and negotiated
    /// parameters are recorded only when negotiation succeeds.
    pub fn init(
        &mut self,
        registry: &DeviceRegistry,
        resolution: Resolution,
        framerate: u32,
    ) -> DeviceResult<NegotiatedFormat> {
        self.stop();

        let device = registry.current_device().ok_or(DeviceError::NotOpen)?;
        let negotiated = registry.set_resolution_and_framerate(resolution, framerate)?;

        info!(device = %device.path.display(), format = %negotiated, "Capture session initialized");
        self.device = Some(device);
        self.negotiated = Some(negotiated);
        Ok(negotiated)
    }

    /// Launch the acquisition thread
    ///
    /// Returns `Ok` without doing anything when already capturing.
    pub fn start(&mut self) -> DeviceResult<()> {
        if self.is_capturing() {
            debug!("Capture already running");
            return Ok(());
        }

        // Reap a thread that ended on its own after a read failure
        if let Some(mut finished) = self.controller.take() {
            finished.join();
        }

        let device = self.device.clone().ok_or(DeviceError::NotOpen)?;
        let negotiated = self.negotiated.ok_or(DeviceError::NotOpen)?;

        self.frames_captured.store(0, Ordering::SeqCst);

        let driver = Arc::clone(&device.driver);
        let sinks = Arc::clone(&self.sinks);
        let last_frame = Arc::clone(&self.last_frame);
        let frames_captured = Arc::clone(&self.frames_captured);
        let framerate = negotiated.framerate;

        let controller = CaptureLoopController::start_with_init(
            THREAD_NAME,
            move || -> io::Result<(Box<dyn FrameSource>, FramePacer)> {
                // Framerate queries on the registry may have moved the driver
                driver.set_format(negotiated.resolution, negotiated.pixel_format)?;
                if let FrameIntervalSupport::Negotiable { .. } = driver.frame_interval_support()? {
                    driver.set_framerate(negotiated.framerate)?;
                }
                let stream = driver.open_stream()?;
                Ok((stream, FramePacer::new(framerate)))
            },
            move |state: &mut (Box<dyn FrameSource>, FramePacer)| {
                let (stream, pacer) = state;
                pacer.begin();

                let frame = match stream.read_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Frame read failed, stopping capture");
                        return LoopAction::Stop;
                    }
                };

                *last_frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame.clone());

                let current_sinks = sinks.lock().unwrap_or_else(PoisonError::into_inner).clone();
                for sink in &current_sinks {
                    sink.on_frame(&frame);
                }

                let count = frames_captured.fetch_add(1, Ordering::SeqCst) + 1;
                if count % FRAME_LOG_INTERVAL == 0 {
                    debug!(frames = count, sequence = frame.sequence, "Capture progress");
                }

                pacer.wait();
                LoopAction::Continue
            },
        );

        info!(
            device = %device.path.display(),
            format = %negotiated,
            "Capture started"
        );
        self.controller = Some(controller);
        Ok(())
    }

    /// Stop the acquisition thread and wait for it to exit
    ///
    /// A no-op when not capturing. Must not be called from a [`FrameSink`]
    /// running on this session's thread.
    pub fn stop(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            info!(
                frames = self.frames_captured.load(Ordering::SeqCst),
                "Capture stopped"
            );
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(CaptureLoopController::is_running)
    }

    /// Copy of the most recent frame
    pub fn get_current_frame(&self) -> Option<CameraFrame> {
        self.last_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn add_sink(&self, sink: Arc<dyn FrameSink>) {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn clear_sinks(&self) {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn negotiated(&self) -> Option<NegotiatedFormat> {
        self.negotiated
    }

    pub fn device(&self) -> Option<&OpenDevice> {
        self.device.as_ref()
    }

    /// Frames delivered since the last `start`
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

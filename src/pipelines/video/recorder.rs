// SPDX-License-Identifier: MPL-2.0

//! Recording by feeding captured frames to an in-process encoder
//!
//! The recorder is registered as a [`FrameSink`] on a capture session. The
//! encoder handle, the job, and the idle check all live behind one lock, so
//! a frame write can never race a concurrent `stop`.

use super::{
    EncoderSettings, Recorder, RecorderKind, RecordingJob, output_path, prepare_output_dir,
};
use crate::backends::camera::session::FrameSink;
use crate::backends::camera::types::{CameraFrame, FourCc, Resolution};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{RecordingError, RecordingResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An open encoder writing one output file
pub trait FrameEncoder: Send {
    fn write_frame(&mut self, frame: &CameraFrame) -> Result<(), String>;

    /// Flush and close the output; called once
    fn finish(&mut self) -> Result<(), String>;
}

/// Opens encoders for new recordings
pub trait EncoderFactory: Send + Sync {
    fn open(
        &self,
        path: &Path,
        resolution: Resolution,
        framerate: u32,
        input_format: FourCc,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn FrameEncoder>, String>;
}

#[derive(Default)]
struct Writer {
    output_dir: Option<PathBuf>,
    encoder: Option<Box<dyn FrameEncoder>>,
    job: Option<RecordingJob>,
    last_path: Option<PathBuf>,
    frames_written: u64,
}

impl Writer {
    /// Close the encoder and retire the job
    fn close(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            if let Err(e) = encoder.finish() {
                warn!(error = %e, "Encoder did not finish cleanly");
            }
        }
        if let Some(job) = self.job.take() {
            info!(
                path = %job.path.display(),
                frames = self.frames_written,
                seconds = job.elapsed().as_secs(),
                "In-process recording stopped"
            );
            self.last_path = Some(job.path);
        }
    }
}

pub struct InProcessRecorder {
    factory: Box<dyn EncoderFactory>,
    settings: EncoderSettings,
    input_format: FourCc,
    recording: AtomicBool,
    writer: Mutex<Writer>,
}

impl InProcessRecorder {
    pub fn new(factory: Box<dyn EncoderFactory>) -> Self {
        Self {
            factory,
            settings: EncoderSettings::default(),
            input_format: FourCc::YUYV,
            recording: AtomicBool::new(false),
            writer: Mutex::new(Writer::default()),
        }
    }

    pub fn with_settings(mut self, settings: EncoderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Pixel format of the frames that will be delivered
    pub fn with_input_format(mut self, fourcc: FourCc) -> Self {
        self.input_format = fourcc;
        self
    }

    fn lock_writer(&self) -> MutexGuard<'_, Writer> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame to the running recording
    ///
    /// Ignored while idle and for frames whose size differs from the
    /// recording resolution. A write failure ends the recording.
    pub fn process_frame(&self, frame: &CameraFrame) {
        let mut writer = self.lock_writer();
        let Some(expected) = writer.job.as_ref().map(|job| job.resolution) else {
            return;
        };
        let Some(encoder) = writer.encoder.as_mut() else {
            return;
        };

        if frame.resolution() != expected {
            debug!(
                frame = %frame.resolution(),
                expected = %expected,
                "Dropping frame with mismatched size"
            );
            return;
        }

        match encoder.write_frame(frame) {
            Ok(()) => {
                writer.frames_written += 1;
                if writer.frames_written % FRAME_LOG_INTERVAL == 0 {
                    debug!(frames = writer.frames_written, "Recording progress");
                }
            }
            Err(e) => {
                warn!(error = %e, "Encoder write failed, stopping recording");
                self.recording.store(false, Ordering::SeqCst);
                writer.close();
            }
        }
    }

    /// Frames written to the current or last recording
    pub fn frames_written(&self) -> u64 {
        self.lock_writer().frames_written
    }
}

impl FrameSink for InProcessRecorder {
    fn on_frame(&self, frame: &CameraFrame) {
        self.process_frame(frame);
    }
}

impl Recorder for InProcessRecorder {
    fn kind(&self) -> RecorderKind {
        RecorderKind::InProcess
    }

    fn init(&self, output_dir: &Path) -> RecordingResult<()> {
        let dir = prepare_output_dir(output_dir)?;
        debug!(dir = %dir.display(), "In-process recorder output directory ready");
        self.lock_writer().output_dir = Some(dir);
        Ok(())
    }

    fn start(&self, resolution: Resolution, framerate: u32) -> RecordingResult<()> {
        let mut writer = self.lock_writer();
        if writer.encoder.is_some() {
            debug!("Recording already running");
            return Ok(());
        }

        let dir = writer
            .output_dir
            .clone()
            .ok_or(RecordingError::NotInitialized)?;
        let path = output_path(&dir, resolution, framerate, &self.settings);

        let encoder = self
            .factory
            .open(&path, resolution, framerate, self.input_format, &self.settings)
            .map_err(|e| {
                warn!(path = %path.display(), error = %e, "Failed to open encoder");
                RecordingError::WriterInit(e)
            })?;

        writer.encoder = Some(encoder);
        writer.frames_written = 0;
        writer.job = Some(RecordingJob {
            kind: RecorderKind::InProcess,
            path: path.clone(),
            started_at: Instant::now(),
            resolution,
            framerate,
            process_id: None,
        });
        self.recording.store(true, Ordering::SeqCst);

        info!(
            path = %path.display(),
            %resolution,
            framerate,
            format = %self.input_format,
            "In-process recording started"
        );
        Ok(())
    }

    fn stop(&self) {
        let mut writer = self.lock_writer();
        self.recording.store(false, Ordering::SeqCst);
        writer.close();
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn current_path(&self) -> Option<PathBuf> {
        let writer = self.lock_writer();
        writer
            .job
            .as_ref()
            .map(|job| job.path.clone())
            .or_else(|| writer.last_path.clone())
    }

    fn duration(&self) -> Duration {
        if !self.is_recording() {
            return Duration::ZERO;
        }
        self.lock_writer()
            .job
            .as_ref()
            .map(RecordingJob::elapsed)
            .unwrap_or_default()
    }
}

impl Drop for InProcessRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

// SPDX-License-Identifier: MPL-2.0

//! Test doubles shared by the integration tests
//!
//! Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use camcorder::backends::camera::{
    CameraFrame, CaptureDriver, DeviceCapabilities, DeviceProvider, FourCc, FrameIntervalSupport,
    FrameSizeSpec, FrameSource, Framerate, Resolution,
};
use camcorder::pipelines::video::{
    EncoderCommand, EncoderFactory, EncoderSettings, FrameEncoder, ProcessExit, ProcessSpawner,
    SupervisedChild,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// ===== Capture stubs =====

/// Behaviour of one stub device
#[derive(Debug, Clone)]
pub struct StubDeviceConfig {
    pub card: String,
    pub capture: bool,
    pub formats: Vec<(FourCc, Vec<FrameSizeSpec>)>,
    /// `None` models a driver with a fixed frame interval
    pub accepted_rates: Option<Vec<u32>>,
    /// Rate echoed for requests outside `accepted_rates`
    pub fallback_rate: u32,
    /// Frames delivered before each stream reports an error
    pub frames_per_stream: u64,
}

impl StubDeviceConfig {
    pub fn camera(card: &str) -> Self {
        Self {
            card: card.to_string(),
            capture: true,
            formats: vec![(
                FourCc::YUYV,
                vec![
                    FrameSizeSpec::Discrete(Resolution::new(1280, 720)),
                    FrameSizeSpec::Discrete(Resolution::new(640, 480)),
                    FrameSizeSpec::Discrete(Resolution::new(320, 240)),
                ],
            )],
            accepted_rates: Some(vec![15, 30]),
            fallback_rate: 30,
            frames_per_stream: 5,
        }
    }

    pub fn with_formats(mut self, formats: Vec<(FourCc, Vec<FrameSizeSpec>)>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_rates(mut self, rates: Option<Vec<u32>>) -> Self {
        self.accepted_rates = rates;
        self
    }

    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames_per_stream = frames;
        self
    }

    pub fn not_capture(mut self) -> Self {
        self.capture = false;
        self
    }
}

/// Device nodes backed by [`StubDriver`]s
///
/// Paths listed without a config exist but fail to open.
#[derive(Default)]
pub struct StubProvider {
    nodes: Vec<(PathBuf, Option<StubDeviceConfig>)>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, path: &str, config: StubDeviceConfig) -> Self {
        self.nodes.push((PathBuf::from(path), Some(config)));
        self
    }

    pub fn with_broken_node(mut self, path: &str) -> Self {
        self.nodes.push((PathBuf::from(path), None));
        self
    }
}

impl DeviceProvider for StubProvider {
    fn device_nodes(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self.nodes.iter().map(|(path, _)| path.clone()).collect())
    }

    fn open(&self, path: &Path) -> io::Result<Arc<dyn CaptureDriver>> {
        match self.nodes.iter().find(|(p, _)| p == path) {
            Some((_, Some(config))) => Ok(Arc::new(StubDriver::new(config.clone()))),
            Some((_, None)) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            )),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such device")),
        }
    }
}

pub struct StubDriver {
    config: StubDeviceConfig,
    format: Mutex<(Resolution, FourCc)>,
    framerate: Mutex<u32>,
}

impl StubDriver {
    pub fn new(config: StubDeviceConfig) -> Self {
        Self {
            config,
            format: Mutex::new((Resolution::new(640, 480), FourCc::YUYV)),
            framerate: Mutex::new(30),
        }
    }

    fn supports(&self, resolution: Resolution, fourcc: FourCc) -> bool {
        self.config
            .formats
            .iter()
            .filter(|(f, _)| *f == fourcc)
            .flat_map(|(_, sizes)| sizes.iter())
            .any(|size| size.resolutions().contains(&resolution))
    }
}

impl CaptureDriver for StubDriver {
    fn capabilities(&self) -> io::Result<DeviceCapabilities> {
        Ok(DeviceCapabilities {
            card: self.config.card.clone(),
            driver: "stub".to_string(),
            bus: "platform:stub".to_string(),
            capture: self.config.capture,
        })
    }

    fn pixel_formats(&self) -> io::Result<Vec<FourCc>> {
        Ok(self.config.formats.iter().map(|(f, _)| *f).collect())
    }

    fn frame_sizes(&self, fourcc: FourCc) -> io::Result<Vec<FrameSizeSpec>> {
        Ok(self
            .config
            .formats
            .iter()
            .find(|(f, _)| *f == fourcc)
            .map(|(_, sizes)| sizes.clone())
            .unwrap_or_default())
    }

    fn set_format(&self, resolution: Resolution, fourcc: FourCc) -> io::Result<(Resolution, FourCc)> {
        if !self.supports(resolution, fourcc) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "format not supported",
            ));
        }
        *self.format.lock().unwrap() = (resolution, fourcc);
        Ok((resolution, fourcc))
    }

    fn frame_interval_support(&self) -> io::Result<FrameIntervalSupport> {
        Ok(match self.config.accepted_rates {
            Some(_) => FrameIntervalSupport::Negotiable {
                current: Framerate::from_int(*self.framerate.lock().unwrap()),
            },
            None => FrameIntervalSupport::Fixed,
        })
    }

    fn set_framerate(&self, fps: u32) -> io::Result<Framerate> {
        let accepted = self.config.accepted_rates.as_deref().unwrap_or_default();
        let actual = if accepted.contains(&fps) {
            fps
        } else {
            self.config.fallback_rate
        };
        *self.framerate.lock().unwrap() = actual;
        Ok(Framerate::from_int(actual))
    }

    fn open_stream(&self) -> io::Result<Box<dyn FrameSource>> {
        let (resolution, fourcc) = *self.format.lock().unwrap();
        Ok(Box::new(StubFrameSource {
            resolution,
            fourcc,
            remaining: self.config.frames_per_stream,
            sequence: 0,
        }))
    }
}

pub struct StubFrameSource {
    resolution: Resolution,
    fourcc: FourCc,
    remaining: u64,
    sequence: u64,
}

impl FrameSource for StubFrameSource {
    fn read_frame(&mut self) -> io::Result<CameraFrame> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.remaining -= 1;

        let stride = self.resolution.width * 2;
        let len = (stride * self.resolution.height) as usize;
        let frame = CameraFrame {
            width: self.resolution.width,
            height: self.resolution.height,
            format: self.fourcc,
            stride,
            data: vec![self.sequence as u8; len].into(),
            sequence: self.sequence,
            captured_at: Instant::now(),
        };
        self.sequence += 1;
        Ok(frame)
    }
}

/// A frame with the given size and sequence number
pub fn frame(width: u32, height: u32, sequence: u64) -> CameraFrame {
    CameraFrame {
        width,
        height,
        format: FourCc::YUYV,
        stride: width * 2,
        data: vec![0u8; (width * height * 2) as usize].into(),
        sequence,
        captured_at: Instant::now(),
    }
}

// ===== Process stubs =====

/// Lifecycle of a fake process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeState {
    Running,
    /// SIGTERM received but not yet reaped
    Terminated,
    /// Exited on its own with the given code, not yet reaped
    Crashed(i32),
    Reaped,
}

/// Spawner whose processes live in a shared table
#[derive(Default)]
pub struct FakeSpawner {
    next_pid: AtomicU32,
    pub table: Arc<Mutex<HashMap<u32, FakeState>>>,
    pub commands: Arc<Mutex<Vec<EncoderCommand>>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        }
    }

    pub fn state(&self, pid: u32) -> Option<FakeState> {
        self.table.lock().unwrap().get(&pid).copied()
    }

    /// Make a running process exit by itself
    pub fn crash(&self, pid: u32, code: i32) {
        self.table.lock().unwrap().insert(pid, FakeState::Crashed(code));
    }

    pub fn last_command(&self) -> Option<EncoderCommand> {
        self.commands.lock().unwrap().last().cloned()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, command: &EncoderCommand) -> io::Result<Box<dyn SupervisedChild>> {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.table.lock().unwrap().insert(pid, FakeState::Running);
        self.commands.lock().unwrap().push(command.clone());
        Ok(Box::new(FakeChild {
            pid,
            table: Arc::clone(&self.table),
        }))
    }
}

struct FakeChild {
    pid: u32,
    table: Arc<Mutex<HashMap<u32, FakeState>>>,
}

impl SupervisedChild for FakeChild {
    fn id(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        let mut table = self.table.lock().unwrap();
        match table.get(&self.pid).copied() {
            Some(FakeState::Crashed(code)) => {
                table.insert(self.pid, FakeState::Reaped);
                Ok(Some(ProcessExit::Exited(code)))
            }
            _ => Ok(None),
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        let mut table = self.table.lock().unwrap();
        if table.get(&self.pid) == Some(&FakeState::Running) {
            table.insert(self.pid, FakeState::Terminated);
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        let mut table = self.table.lock().unwrap();
        let exit = match table.get(&self.pid).copied() {
            Some(FakeState::Crashed(code)) => ProcessExit::Exited(code),
            _ => ProcessExit::Signaled(libc::SIGTERM),
        };
        table.insert(self.pid, FakeState::Reaped);
        Ok(exit)
    }
}

// ===== Encoder stubs =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    Opened(PathBuf, Resolution, u32),
    Frame(u64),
    Finished,
}

/// Encoder factory that records what it is asked to do
#[derive(Default)]
pub struct FakeEncoderFactory {
    pub events: Arc<Mutex<Vec<EncoderEvent>>>,
    /// Fail to open the encoder
    pub fail_open: bool,
    /// Fail the write of the frame with this index
    pub fail_on_frame: Option<u64>,
}

impl FakeEncoderFactory {
    pub fn events(&self) -> Arc<Mutex<Vec<EncoderEvent>>> {
        Arc::clone(&self.events)
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn open(
        &self,
        path: &Path,
        resolution: Resolution,
        framerate: u32,
        _input_format: FourCc,
        _settings: &EncoderSettings,
    ) -> Result<Box<dyn FrameEncoder>, String> {
        if self.fail_open {
            return Err("no encoder available".to_string());
        }
        self.events.lock().unwrap().push(EncoderEvent::Opened(
            path.to_path_buf(),
            resolution,
            framerate,
        ));
        Ok(Box::new(FakeEncoder {
            events: Arc::clone(&self.events),
            fail_on_frame: self.fail_on_frame,
            written: 0,
        }))
    }
}

struct FakeEncoder {
    events: Arc<Mutex<Vec<EncoderEvent>>>,
    fail_on_frame: Option<u64>,
    written: u64,
}

impl FrameEncoder for FakeEncoder {
    fn write_frame(&mut self, frame: &CameraFrame) -> Result<(), String> {
        if self.fail_on_frame == Some(self.written) {
            return Err("disk full".to_string());
        }
        self.written += 1;
        self.events
            .lock()
            .unwrap()
            .push(EncoderEvent::Frame(frame.sequence));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), String> {
        self.events.lock().unwrap().push(EncoderEvent::Finished);
        Ok(())
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 implementation of the driver capability contract
//!
//! Device nodes are discovered under `/dev` and driven through the `v4l`
//! crate: capability query, format and frame-size enumeration, format and
//! frame-interval negotiation, and mmap streaming.

use super::types::{
    CameraFrame, DeviceCapabilities, FourCc, FrameIntervalSupport, FrameSizeSpec, Framerate,
    Resolution, StepwiseRange,
};
use super::{CaptureDriver, DeviceProvider, FrameSource};
use crate::constants::capture::STREAM_BUFFER_COUNT;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::parameters::Capabilities as ParamCapabilities;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// Directory scanned for `video*` nodes
const DEVICE_DIR: &str = "/dev";

/// Enumerates `/dev/video*` and opens nodes with the `v4l` crate
#[derive(Debug, Clone, Default)]
pub struct V4l2Provider {
    root: Option<PathBuf>,
}

impl V4l2Provider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a different directory than `/dev`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl DeviceProvider for V4l2Provider {
    fn device_nodes(&self) -> io::Result<Vec<PathBuf>> {
        let root = self
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEVICE_DIR));

        let mut nodes: Vec<PathBuf> = std::fs::read_dir(&root)?
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("video"))
            .map(|entry| entry.path())
            .collect();
        nodes.sort();

        debug!(root = %root.display(), count = nodes.len(), "Found V4L2 device nodes");
        Ok(nodes)
    }

    fn open(&self, path: &Path) -> io::Result<Arc<dyn CaptureDriver>> {
        let device = Device::with_path(path)?;
        Ok(Arc::new(V4l2Driver {
            path: path.to_path_buf(),
            device,
        }))
    }
}

/// An open V4L2 node
pub struct V4l2Driver {
    path: PathBuf,
    device: Device,
}

fn to_fourcc(fourcc: FourCC) -> FourCc {
    FourCc(fourcc.repr)
}

fn to_v4l_fourcc(fourcc: FourCc) -> FourCC {
    FourCC::new(fourcc.as_bytes())
}

impl CaptureDriver for V4l2Driver {
    fn capabilities(&self) -> io::Result<DeviceCapabilities> {
        let caps = self.device.query_caps()?;
        Ok(DeviceCapabilities {
            card: caps.card,
            driver: caps.driver,
            bus: caps.bus,
            capture: caps.capabilities.contains(Flags::VIDEO_CAPTURE),
        })
    }

    fn pixel_formats(&self) -> io::Result<Vec<FourCc>> {
        Ok(self
            .device
            .enum_formats()?
            .into_iter()
            .map(|desc| to_fourcc(desc.fourcc))
            .collect())
    }

    fn frame_sizes(&self, fourcc: FourCc) -> io::Result<Vec<FrameSizeSpec>> {
        let sizes = self.device.enum_framesizes(to_v4l_fourcc(fourcc))?;
        Ok(sizes
            .into_iter()
            .map(|size| match size.size {
                FrameSizeEnum::Discrete(discrete) => {
                    FrameSizeSpec::Discrete(Resolution::new(discrete.width, discrete.height))
                }
                FrameSizeEnum::Stepwise(step) => FrameSizeSpec::Stepwise(StepwiseRange {
                    min_width: step.min_width,
                    max_width: step.max_width,
                    step_width: step.step_width,
                    min_height: step.min_height,
                    max_height: step.max_height,
                    step_height: step.step_height,
                }),
            })
            .collect())
    }

    fn set_format(
        &self,
        resolution: Resolution,
        fourcc: FourCc,
    ) -> io::Result<(Resolution, FourCc)> {
        let requested = Format::new(resolution.width, resolution.height, to_v4l_fourcc(fourcc));
        let actual = self.device.set_format(&requested)?;
        debug!(
            device = %self.path.display(),
            requested = %resolution,
            width = actual.width,
            height = actual.height,
            fourcc = %actual.fourcc,
            "Driver applied format"
        );
        Ok((
            Resolution::new(actual.width, actual.height),
            to_fourcc(actual.fourcc),
        ))
    }

    fn frame_interval_support(&self) -> io::Result<FrameIntervalSupport> {
        let params = self.device.params()?;
        if !params.capabilities.contains(ParamCapabilities::TIME_PER_FRAME) {
            return Ok(FrameIntervalSupport::Fixed);
        }
        Ok(FrameIntervalSupport::Negotiable {
            current: Framerate::from_interval(
                params.interval.numerator,
                params.interval.denominator,
            ),
        })
    }

    fn set_framerate(&self, fps: u32) -> io::Result<Framerate> {
        let params = v4l::video::capture::Parameters::with_fps(fps);
        let actual = self.device.set_params(&params)?;
        Ok(Framerate::from_interval(
            actual.interval.numerator,
            actual.interval.denominator,
        ))
    }

    fn open_stream(&self) -> io::Result<Box<dyn FrameSource>> {
        let format = self.device.format()?;
        let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, STREAM_BUFFER_COUNT)?;

        info!(
            device = %self.path.display(),
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "V4L2 stream started"
        );

        Ok(Box::new(V4l2FrameSource {
            stream,
            width: format.width,
            height: format.height,
            stride: format.stride,
            fourcc: to_fourcc(format.fourcc),
            sequence: 0,
        }))
    }
}

/// mmap-backed frame stream
pub struct V4l2FrameSource {
    stream: MmapStream<'static>,
    width: u32,
    height: u32,
    stride: u32,
    fourcc: FourCc,
    sequence: u64,
}

impl FrameSource for V4l2FrameSource {
    fn read_frame(&mut self) -> io::Result<CameraFrame> {
        let (buf, meta) = CaptureStream::next(&mut self.stream)?;
        let captured_at = Instant::now();

        // Compressed formats report the payload size in bytesused
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };

        let frame = CameraFrame {
            width: self.width,
            height: self.height,
            format: self.fourcc,
            stride: self.stride,
            data: Arc::from(&buf[..used]),
            sequence: self.sequence,
            captured_at,
        };
        self.sequence += 1;
        Ok(frame)
    }
}

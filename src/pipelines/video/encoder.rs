// SPDX-License-Identifier: MPL-2.0

//! GStreamer encoder for the in-process recorder
//!
//! Pipeline: `appsrc ! [jpegdec] ! videoconvert ! capsfilter ! x264enc !
//! h264parse ! mp4mux ! filesink`. Frames are timestamped from their index so
//! the output plays at the recording framerate regardless of delivery jitter.

use super::EncoderSettings;
use super::recorder::{EncoderFactory, FrameEncoder};
use crate::backends::camera::types::{CameraFrame, FourCc, PixelFormat, Resolution};
use crate::constants::recording::EOS_TIMEOUT;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use gstreamer_video as gst_video;
use std::path::Path;
use tracing::{debug, info, warn};

/// Opens [`GstFrameEncoder`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct GstEncoderFactory;

impl EncoderFactory for GstEncoderFactory {
    fn open(
        &self,
        path: &Path,
        resolution: Resolution,
        framerate: u32,
        input_format: FourCc,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn FrameEncoder>, String> {
        let encoder = GstFrameEncoder::new(path, resolution, framerate, input_format, settings)?;
        Ok(Box::new(encoder))
    }
}

/// Map an ffmpeg-style pixel format name to a GStreamer raw format
fn gst_output_format(pix_fmt: &str) -> gst_video::VideoFormat {
    match pix_fmt {
        "nv12" => gst_video::VideoFormat::Nv12,
        "yuv422p" => gst_video::VideoFormat::Y42b,
        "yuv444p" => gst_video::VideoFormat::Y444,
        _ => gst_video::VideoFormat::I420,
    }
}

pub struct GstFrameEncoder {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    frame_duration: gst::ClockTime,
    frame_index: u64,
    finished: bool,
}

impl GstFrameEncoder {
    pub fn new(
        path: &Path,
        resolution: Resolution,
        framerate: u32,
        input_format: FourCc,
        settings: &EncoderSettings,
    ) -> Result<Self, String> {
        gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

        let pixel_format = PixelFormat::from_fourcc(input_format)
            .ok_or_else(|| format!("Unsupported input pixel format {}", input_format))?;
        let framerate = framerate.max(1);
        let fps = gst::Fraction::new(framerate as i32, 1);

        let input_caps = match pixel_format.to_gst_format_string() {
            Some(format) => gst_video::VideoInfo::builder(
                gst_video::VideoFormat::from_string(format),
                resolution.width,
                resolution.height,
            )
            .fps(fps)
            .build()
            .map_err(|e| format!("Invalid video info: {}", e))?
            .to_caps()
            .map_err(|e| format!("Failed to build input caps: {}", e))?,
            None => gst::Caps::builder("image/jpeg")
                .field("width", resolution.width as i32)
                .field("height", resolution.height as i32)
                .field("framerate", fps)
                .build(),
        };

        let appsrc = AppSrc::builder()
            .name("recorder_src")
            .caps(&input_caps)
            .format(gst::Format::Time)
            .is_live(true)
            .build();

        let jpeg_decoder = if pixel_format.is_compressed() {
            debug!("Adding JPEG decoder for MJPEG input");
            Some(make_element("jpegdec")?)
        } else {
            None
        };

        let videoconvert = make_element("videoconvert")?;

        let output_caps = gst_video::VideoCapsBuilder::new()
            .format(gst_output_format(&settings.pixel_format))
            .build();
        let capsfilter = gst::ElementFactory::make("capsfilter")
            .property("caps", &output_caps)
            .build()
            .map_err(|e| format!("Failed to create capsfilter: {}", e))?;

        let x264enc = gst::ElementFactory::make("x264enc")
            .property("bitrate", settings.bitrate_kbps)
            .property_from_str("speed-preset", &settings.preset)
            .property_from_str("tune", &settings.tune)
            .build()
            .map_err(|e| format!("Failed to create x264enc: {}", e))?;

        let h264parse = make_element("h264parse")?;
        let mp4mux = make_element("mp4mux")?;

        let filesink = gst::ElementFactory::make("filesink")
            .property("location", path.to_string_lossy().as_ref())
            .build()
            .map_err(|e| format!("Failed to create filesink: {}", e))?;

        let pipeline = gst::Pipeline::new();

        let mut elements: Vec<&gst::Element> = vec![appsrc.upcast_ref()];
        if let Some(ref decoder) = jpeg_decoder {
            elements.push(decoder);
        }
        elements.extend_from_slice(&[
            &videoconvert,
            &capsfilter,
            &x264enc,
            &h264parse,
            &mp4mux,
            &filesink,
        ]);

        pipeline
            .add_many(&elements)
            .map_err(|e| format!("Failed to add elements to pipeline: {}", e))?;
        gst::Element::link_many(&elements)
            .map_err(|e| format!("Failed to link encoder pipeline: {}", e))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("Failed to start encoder pipeline: {}", e))?;

        info!(
            path = %path.display(),
            %resolution,
            framerate,
            format = %input_format,
            bitrate_kbps = settings.bitrate_kbps,
            "GStreamer encoder started"
        );

        Ok(Self {
            pipeline,
            appsrc,
            frame_duration: gst::ClockTime::from_nseconds(1_000_000_000 / framerate as u64),
            frame_index: 0,
            finished: false,
        })
    }
}

fn make_element(factory: &str) -> Result<gst::Element, String> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| format!("Failed to create {}: {}", factory, e))
}

impl FrameEncoder for GstFrameEncoder {
    fn write_frame(&mut self, frame: &CameraFrame) -> Result<(), String> {
        let mut buffer = gst::Buffer::from_mut_slice(frame.data.to_vec());
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or("Failed to get mutable buffer reference")?;
            let pts = gst::ClockTime::from_nseconds(
                self.frame_index * self.frame_duration.nseconds(),
            );
            buffer_ref.set_pts(pts);
            buffer_ref.set_duration(self.frame_duration);
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| format!("Failed to push frame: {:?}", e))?;
        self.frame_index += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), String> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        debug!(frames = self.frame_index, "Sending EOS to encoder pipeline");
        let mut result = self
            .appsrc
            .end_of_stream()
            .map(|_| ())
            .map_err(|e| format!("Failed to send EOS: {:?}", e));

        if let (true, Some(bus)) = (result.is_ok(), self.pipeline.bus()) {
            let timeout = gst::ClockTime::from_mseconds(EOS_TIMEOUT.as_millis() as u64);
            match bus.timed_pop_filtered(
                timeout,
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) {
                Some(msg) => {
                    if let gst::MessageView::Error(err) = msg.view() {
                        result = Err(format!("Encoder pipeline error: {}", err.error()));
                    }
                }
                None => warn!("Timed out waiting for encoder EOS"),
            }
        }

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| format!("Failed to stop encoder pipeline: {}", e))?;

        info!(frames = self.frame_index, "GStreamer encoder closed");
        result
    }
}

impl Drop for GstFrameEncoder {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}

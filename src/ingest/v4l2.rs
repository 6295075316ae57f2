//! V4L2 capture for local device nodes (`/dev/videoN`).
//!
//! The device is asked for RGB24, then YUYV, then MJPEG at the requested
//! resolution; whatever it settles on is normalized to RGB24.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::camera::{parse_device_index, CameraConfig, CameraStats};
use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::Frame;

const PREFERRED_FOURCCS: [&[u8; 4]; 3] = [b"RGB3", b"YUYV", b"MJPG"];
const STREAM_BUFFERS: u32 = 4;
const HEALTH_GRACE: Duration = Duration::from_secs(2);

pub(crate) struct V4l2Camera {
    device_path: String,
    state: Option<V4l2State>,
    format: PixelFormat,
    width: u32,
    height: u32,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub(crate) fn open(config: &CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device_path = match parse_device_index(&config.source) {
            Some(index) => format!("/dev/video{}", index),
            None => config.source.clone(),
        };
        let mut device = v4l::Device::with_path(&device_path)
            .with_context(|| format!("open v4l2 device {}", device_path))?;

        let mut negotiated = None;
        for fourcc in PREFERRED_FOURCCS {
            let mut format = device.format().context("read v4l2 format")?;
            format.width = config.width;
            format.height = config.height;
            format.fourcc = v4l::FourCC::new(fourcc);
            match device.set_format(&format) {
                Ok(active) if active.fourcc == format.fourcc => {
                    negotiated = Some(active);
                    break;
                }
                Ok(active) => log::debug!(
                    "{} does not offer {}, got {}",
                    device_path,
                    format.fourcc,
                    active.fourcc
                ),
                Err(err) => log::warn!(
                    "failed to set {} on {}: {}",
                    format.fourcc,
                    device_path,
                    err
                ),
            }
        }
        let active = negotiated.ok_or_else(|| {
            anyhow!(
                "{} supports none of RGB3, YUYV or MJPG at {}x{}",
                device_path,
                config.width,
                config.height
            )
        })?;
        let format = PixelFormat::from_fourcc(&active.fourcc.repr)
            .ok_or_else(|| anyhow!("unsupported v4l2 pixel format {}", active.fourcc))?;
        if (active.width, active.height) != (config.width, config.height) {
            log::warn!(
                "{} capturing at {}x{} instead of {}x{}",
                device_path,
                active.width,
                active.height,
                config.width,
                config.height
            );
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        Ok(Self {
            device_path,
            state: Some(state),
            format,
            width: active.width,
            height: active.height,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    pub(crate) fn read_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (format, width, height) = (self.format, self.width, self.height);
        let state = self.state.as_mut().context("v4l2 device released")?;
        let rgb = state
            .with_mut(|fields| -> Result<Vec<u8>> {
                let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
                let used = meta.bytesused as usize;
                let data = if used > 0 && used <= buf.len() {
                    &buf[..used]
                } else {
                    buf
                };
                normalize_to_rgb(data, width, height, format)
            })
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        self.last_error = None;
        Frame::from_rgb(width, height, rgb, self.frame_count)
    }

    pub(crate) fn release(&mut self) {
        // Dropping the stream stops streaming and unmaps the buffers.
        self.state = None;
    }

    pub(crate) fn is_healthy(&self) -> bool {
        if self.state.is_none() || self.last_error.is_some() {
            return false;
        }
        self.last_frame_at
            .map_or(true, |at| at.elapsed() <= HEALTH_GRACE)
    }

    pub(crate) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.device_path.clone(),
        }
    }
}

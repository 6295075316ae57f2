//! OpenCV `VideoCapture` backend for device indices and paths.

use anyhow::{anyhow, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::time::{Duration, Instant};

use super::camera::{parse_device_index, CameraConfig, CameraStats};
use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::Frame;

const HEALTH_GRACE: Duration = Duration::from_secs(2);

pub(crate) struct OpencvCamera {
    source: String,
    capture: Option<VideoCapture>,
    mat: Mat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl OpencvCamera {
    pub(crate) fn open(config: &CameraConfig) -> Result<Self> {
        let mut capture = match parse_device_index(&config.source) {
            Some(index) => VideoCapture::new(index as i32, videoio::CAP_ANY),
            None => VideoCapture::from_file(&config.source, videoio::CAP_ANY),
        }
        .with_context(|| format!("open opencv capture {}", config.source))?;
        if !capture.is_opened().context("query opencv capture state")? {
            return Err(anyhow!("could not open camera {}", config.source));
        }

        for (property, name, value) in [
            (videoio::CAP_PROP_FRAME_WIDTH, "width", config.width),
            (videoio::CAP_PROP_FRAME_HEIGHT, "height", config.height),
        ] {
            match capture.set(property, value as f64) {
                Ok(true) => {}
                Ok(false) => log::warn!(
                    "{} did not accept frame {} {}",
                    config.source,
                    name,
                    value
                ),
                Err(err) => log::warn!(
                    "failed to set frame {} on {}: {}",
                    name,
                    config.source,
                    err
                ),
            }
        }

        Ok(Self {
            source: config.source.clone(),
            capture: Some(capture),
            mat: Mat::default(),
            frame_count: 0,
            last_frame_at: None,
        })
    }

    pub(crate) fn read_frame(&mut self) -> Result<Frame> {
        let capture = self.capture.as_mut().context("opencv capture released")?;
        let grabbed = capture
            .read(&mut self.mat)
            .with_context(|| format!("read frame from {}", self.source))?;
        if !grabbed || self.mat.empty() {
            return Err(anyhow!("camera {} returned no frame", self.source));
        }

        let size = self.mat.size().context("read frame size")?;
        let (width, height) = (size.width as u32, size.height as u32);
        let continuous;
        let mat = if self.mat.is_continuous() {
            &self.mat
        } else {
            continuous = self.mat.try_clone().context("copy non-contiguous frame")?;
            &continuous
        };
        let bgr = mat.data_bytes().context("access frame bytes")?;
        let rgb = normalize_to_rgb(bgr, width, height, PixelFormat::Bgr24)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::from_rgb(width, height, rgb, self.frame_count)
    }

    pub(crate) fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(err) = capture.release() {
                log::warn!("failed to release camera {}: {}", self.source, err);
            }
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.capture.is_some()
            && self
                .last_frame_at
                .map_or(true, |at| at.elapsed() <= HEALTH_GRACE)
    }

    pub(crate) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.source.clone(),
        }
    }
}

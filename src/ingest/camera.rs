//! Live camera source.
//!
//! `CameraSource` picks a backend from the camera source string:
//! - `stub://...`: synthetic frames, always available
//! - a device index (`0`) or path (`/dev/video0`): V4L2 when built with
//!   `ingest-v4l2`, otherwise OpenCV when built with `opencv`
//!
//! Synthetic query parameters: `width`, `height` and `fail_after=N` (reads
//! after the Nth fail). `stub://offline` refuses to open.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::frame::Frame;

const STUB_SCHEME: &str = "stub://";
const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;
const HEALTH_GRACE: Duration = Duration::from_secs(2);

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device index, device path or `stub://` URL.
    pub source: String,
    /// Requested capture width. Devices may pick a nearby mode.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            width: DEFAULT_STUB_WIDTH,
            height: DEFAULT_STUB_HEIGHT,
        }
    }
}

impl CameraConfig {
    /// Requests a square capture matching the model input size.
    pub fn square(source: impl Into<String>, side: u32) -> Self {
        Self {
            source: source.into(),
            width: side,
            height: side,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub source: String,
}

/// An opened camera.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(super::v4l2::V4l2Camera),
    #[cfg(feature = "opencv")]
    Opencv(super::opencv_capture::OpencvCamera),
}

impl CameraSource {
    /// Opens the camera described by `config`. Failing here means no frame
    /// will ever be read.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let backend = if config.source.starts_with(STUB_SCHEME) {
            CameraBackend::Synthetic(SyntheticCamera::open(config)?)
        } else {
            open_device(config)?
        };
        let source = Self { backend };
        log::info!(
            "camera {} opened ({})",
            config.source,
            source.backend_name()
        );
        Ok(source)
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            CameraBackend::Synthetic(_) => "synthetic",
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(_) => "v4l2",
            #[cfg(feature = "opencv")]
            CameraBackend::Opencv(_) => "opencv",
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(camera) => camera.is_healthy(),
            #[cfg(feature = "opencv")]
            CameraBackend::Opencv(camera) => camera.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(camera) => camera.stats(),
            #[cfg(feature = "opencv")]
            CameraBackend::Opencv(camera) => camera.stats(),
        }
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.read_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(camera) => camera.read_frame(),
            #[cfg(feature = "opencv")]
            CameraBackend::Opencv(camera) => camera.read_frame(),
        }
    }

    fn release(&mut self) {
        let stats = self.stats();
        match &mut self.backend {
            CameraBackend::Synthetic(_) => {}
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(camera) => camera.release(),
            #[cfg(feature = "opencv")]
            CameraBackend::Opencv(camera) => camera.release(),
        }
        log::info!(
            "camera {} released after {} frames",
            stats.source,
            stats.frames_captured
        );
    }
}

/// Device index (`2`) or `/dev/videoN` path to the index, if it is one.
pub fn parse_device_index(source: &str) -> Option<u32> {
    let digits = source.strip_prefix("/dev/video").unwrap_or(source);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(config: &CameraConfig) -> Result<CameraBackend> {
    match super::v4l2::V4l2Camera::open(config) {
        Ok(camera) => Ok(CameraBackend::V4l2(camera)),
        #[cfg(feature = "opencv")]
        Err(err) => {
            log::warn!(
                "v4l2 open of {} failed ({:#}); trying opencv",
                config.source,
                err
            );
            Ok(CameraBackend::Opencv(super::opencv_capture::OpencvCamera::open(
                config,
            )?))
        }
        #[cfg(not(feature = "opencv"))]
        Err(err) => Err(err),
    }
}

#[cfg(all(not(feature = "ingest-v4l2"), feature = "opencv"))]
fn open_device(config: &CameraConfig) -> Result<CameraBackend> {
    Ok(CameraBackend::Opencv(super::opencv_capture::OpencvCamera::open(
        config,
    )?))
}

#[cfg(not(any(feature = "ingest-v4l2", feature = "opencv")))]
fn open_device(config: &CameraConfig) -> Result<CameraBackend> {
    Err(anyhow!(
        "camera {} requires the ingest-v4l2 or opencv feature; use stub:// for a synthetic camera",
        config.source
    ))
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

/// Generates a dark gradient with a bright square sweeping left to right.
struct SyntheticCamera {
    source: String,
    width: u32,
    height: u32,
    fail_after: Option<u64>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticCamera {
    fn open(config: &CameraConfig) -> Result<Self> {
        let url = url::Url::parse(&config.source)
            .with_context(|| format!("parse synthetic camera url {}", config.source))?;
        if url.host_str() == Some("offline") {
            return Err(anyhow!("synthetic camera {} is offline", config.source));
        }

        let mut camera = Self {
            source: config.source.clone(),
            width: config.width.max(1),
            height: config.height.max(1),
            fail_after: None,
            frame_count: 0,
            last_frame_at: None,
        };
        for (key, value) in url.query_pairs() {
            match &*key {
                "width" => camera.width = parse_query_dimension(&key, &value)?,
                "height" => camera.height = parse_query_dimension(&key, &value)?,
                "fail_after" => {
                    camera.fail_after = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid fail_after value {:?}", value))?,
                    )
                }
                other => log::warn!("ignoring unknown synthetic camera option {:?}", other),
            }
        }
        Ok(camera)
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if self
            .fail_after
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Err(anyhow!(
                "synthetic camera {} stopped delivering frames after {}",
                self.source,
                self.frame_count
            ));
        }
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Frame::from_image(self.render(), self.frame_count))
    }

    fn render(&self) -> RgbImage {
        let (width, height) = (self.width, self.height);
        let mut image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 160 / width) as u8,
                (y * 160 / height) as u8,
                64,
            ])
        });

        let side = (width.min(height) / 4).max(1);
        let travel = width.saturating_sub(side).max(1) as u64;
        let left = ((self.frame_count * 8) % travel) as u32;
        let top = (height - side.min(height)) / 2;
        for y in top..(top + side).min(height) {
            for x in left..(left + side).min(width) {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        image
    }

    fn is_healthy(&self) -> bool {
        if self
            .fail_after
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return false;
        }
        self.last_frame_at
            .map_or(true, |at| at.elapsed() <= HEALTH_GRACE)
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.source.clone(),
        }
    }
}

fn parse_query_dimension(key: &str, value: &str) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(anyhow!("synthetic camera {} must be a positive integer, got {:?}", key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(source: &str) -> CameraConfig {
        CameraConfig {
            source: source.to_string(),
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn synthetic_camera_produces_sequenced_frames() -> Result<()> {
        let mut camera = CameraSource::open(&stub("stub://camera"))?;
        assert_eq!(camera.backend_name(), "synthetic");

        let first = camera.read_frame()?;
        let second = camera.read_frame()?;
        assert_eq!((first.width(), first.height()), (64, 48));
        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert_ne!(first.pixels(), second.pixels());
        assert_eq!(camera.stats().frames_captured, 2);
        assert!(camera.is_healthy());
        Ok(())
    }

    #[test]
    fn synthetic_camera_has_bright_square_on_dark_background() -> Result<()> {
        let mut camera = CameraSource::open(&stub("stub://camera"))?;
        let frame = camera.read_frame()?;
        let bright = frame
            .image()
            .pixels()
            .filter(|p| p.0 == [255, 255, 255])
            .count();
        assert_eq!(bright, 12 * 12);
        assert!(frame
            .image()
            .pixels()
            .filter(|p| p.0 != [255, 255, 255])
            .all(|p| p.0.iter().all(|&c| c < 200)));
        Ok(())
    }

    #[test]
    fn query_overrides_dimensions() -> Result<()> {
        let mut camera = CameraSource::open(&stub("stub://camera?width=32&height=16"))?;
        let frame = camera.read_frame()?;
        assert_eq!((frame.width(), frame.height()), (32, 16));
        assert!(CameraSource::open(&stub("stub://camera?width=0")).is_err());
        Ok(())
    }

    #[test]
    fn fail_after_limits_reads() -> Result<()> {
        let mut camera = CameraSource::open(&stub("stub://camera?fail_after=2"))?;
        camera.read_frame()?;
        camera.read_frame()?;
        assert!(camera.read_frame().is_err());
        assert!(!camera.is_healthy());
        Ok(())
    }

    #[test]
    fn offline_stub_fails_to_open() {
        assert!(CameraSource::open(&stub("stub://offline")).is_err());
    }

    #[test]
    fn device_index_parsing() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("rtsp://cam"), None);
    }

    #[cfg(not(any(feature = "ingest-v4l2", feature = "opencv")))]
    #[test]
    fn device_cameras_need_a_capture_feature() {
        let err = CameraSource::open(&stub("0")).err().map(|e| e.to_string());
        assert!(err.is_some_and(|msg| msg.contains("ingest-v4l2")));
    }
}

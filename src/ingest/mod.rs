//! Frame sources.
//!
//! - `CameraSource`: live frames from a synthetic `stub://` camera, a V4L2
//!   device (feature: ingest-v4l2) or OpenCV `VideoCapture` (feature: opencv)
//! - `still`: a single image from disk or an http(s) URL
//!
//! Every source hands out owned RGB24 [`Frame`]s. Sources never retain frames
//! after returning them.

pub mod camera;
pub mod normalize;
#[cfg(feature = "opencv")]
mod opencv_capture;
pub mod still;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use camera::{CameraConfig, CameraSource, CameraStats};

use anyhow::Result;

use crate::frame::Frame;

/// Anything the detection loop can pull frames from.
pub trait FrameSource {
    /// Blocks until the next frame is available.
    fn read_frame(&mut self) -> Result<Frame>;

    /// Releases the underlying device. Called exactly once when the loop ends;
    /// reads after release are not expected.
    fn release(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Frame> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

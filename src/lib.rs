//! Live object detection
//!
//! This crate runs a pretrained YOLO-family detector against a live camera
//! stream and shows each annotated frame with an FPS readout until the user
//! presses the stop key.
//!
//! # Pipeline
//!
//! Each loop iteration is strictly sequential:
//!
//! 1. **Capture** one frame from a [`FrameSource`].
//! 2. **Infer** with a [`DetectorBackend`] at the configured input size and
//!    confidence threshold.
//! 3. **Render** boxes, labels and `FPS: xx.xx` onto the frame.
//! 4. **Present** it through a [`Viewer`] and poll the stop key once.
//!
//! Any per-iteration failure ends the run; the camera is released and the
//! viewer closed regardless of why the loop stopped.
//!
//! # Module Structure
//!
//! - `config`: run configuration (file, `LIVE_DETECT_*` env, CLI overrides)
//! - `input_size` / `prompt`: stride-aligned model input size and the
//!   interactive size menu
//! - `frame`: owned RGB frames
//! - `ingest`: camera and still-image sources
//! - `detect`: detector backends, YOLO pre/post-processing, labels
//! - `annotate`: overlay rendering
//! - `fps`: instantaneous frame rate
//! - `view`: headless and windowed viewers
//! - `live`: the loop itself
//! - `ui`: startup stage output

pub mod annotate;
pub mod config;
pub mod detect;
pub mod fps;
pub mod frame;
pub mod ingest;
pub mod input_size;
pub mod live;
pub mod prompt;
pub mod ui;
pub mod view;

pub use config::{BackendKind, ConfigOverrides, RunConfig};
pub use detect::{
    build_backend, BoundingBox, Detection, DetectionResult, DetectorBackend, Device,
    DevicePreference, InferenceParams, StubBackend,
};
pub use fps::{FpsMeter, FpsTiming};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, FrameSource};
pub use input_size::{align_to_stride, InputSize, SizeWarning};
pub use live::{run_session, LiveLoop, LoopReport, LoopSettings, Step, StopReason};
pub use prompt::{choose_input_size, SizeSelection};
pub use view::{HeadlessViewer, SnapshotViewer, Viewer};
#[cfg(feature = "opencv")]
pub use view::WindowViewer;

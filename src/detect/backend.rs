use anyhow::Result;
use std::fmt;
use std::str::FromStr;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;
use crate::input_size::InputSize;

/// Per-call inference settings, fixed for the lifetime of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceParams {
    /// Minimum class score for a detection to be reported, in `[0, 1]`.
    pub confidence: f32,
    /// Square model input edge.
    pub input_size: InputSize,
    /// Log a per-frame detection summary at info level.
    pub verbose: bool,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            input_size: InputSize::default(),
            verbose: false,
        }
    }
}

/// Compute device requested for inference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DevicePreference {
    /// Accelerator when the backend has one, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(anyhow::anyhow!(
                "unknown device '{}'; expected auto, cpu or cuda",
                other
            )),
        }
    }
}

/// Device a backend actually runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

impl DevicePreference {
    /// Picks the device to run on. An unavailable accelerator falls back to CPU.
    pub fn resolve(self, accelerator_available: bool) -> Device {
        match self {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Auto if accelerator_available => Device::Cuda,
            DevicePreference::Auto => Device::Cpu,
            DevicePreference::Cuda if accelerator_available => Device::Cuda,
            DevicePreference::Cuda => {
                log::warn!("cuda requested but no accelerator is available; falling back to cpu");
                Device::Cpu
            }
        }
    }
}

/// Detector backend trait.
///
/// Backends receive a borrowed frame and return owned detections in frame
/// pixel coordinates. Errors are per-call; the caller decides whether a failed
/// frame ends the run.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Device inference runs on.
    fn device(&self) -> Device {
        Device::Cpu
    }

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame, params: &InferenceParams) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self, _params: &InferenceParams) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn device(&self) -> Device {
        (**self).device()
    }

    fn detect(&mut self, frame: &Frame, params: &InferenceParams) -> Result<DetectionResult> {
        (**self).detect(frame, params)
    }

    fn warm_up(&mut self, params: &InferenceParams) -> Result<()> {
        (**self).warm_up(params)
    }
}

mod backend;
pub mod backends;
pub mod labels;
mod result;
pub mod yolo;

pub use backend::{Device, DevicePreference, DetectorBackend, InferenceParams};
pub use backends::{build_backend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::{ModelSummary, TractBackend};
pub use labels::Labels;
pub use result::{BoundingBox, Detection, DetectionResult};

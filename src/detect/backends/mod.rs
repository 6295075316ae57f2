pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::{ModelSummary, TractBackend};

use anyhow::Result;

use crate::config::{BackendKind, RunConfig};
use crate::detect::backend::DetectorBackend;

/// Constructs the backend selected by `config`, loading its model if any.
pub fn build_backend(config: &RunConfig) -> Result<Box<dyn DetectorBackend>> {
    match config.backend {
        BackendKind::Stub => {
            let backend = StubBackend::new();
            log::info!(
                "using stub detector (device {})",
                config.device.resolve(false)
            );
            Ok(Box::new(backend))
        }
        BackendKind::Tract => build_tract(config),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(config: &RunConfig) -> Result<Box<dyn DetectorBackend>> {
    let backend = TractBackend::new(
        &config.model_path,
        config.input_size,
        config.device,
        config.labels_path.as_deref(),
    )?;
    log::info!(
        "loaded {} ({} classes) for {} input on {}",
        config.model_path.display(),
        backend.summary().num_classes,
        config.input_size,
        backend.device()
    );
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_config: &RunConfig) -> Result<Box<dyn DetectorBackend>> {
    anyhow::bail!("the tract backend requires the backend-tract feature")
}

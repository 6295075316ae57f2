#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{Device, DevicePreference, DetectorBackend, InferenceParams};
use crate::detect::labels::Labels;
use crate::detect::result::DetectionResult;
use crate::detect::yolo::{to_planar_f32, Letterbox, OutputLayout, Postprocess};
use crate::frame::Frame;
use crate::input_size::InputSize;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Input and output shapes of a loaded model.
#[derive(Clone, Debug)]
pub struct ModelSummary {
    pub input: Vec<usize>,
    pub outputs: Vec<Vec<usize>>,
    pub num_classes: usize,
}

/// Tract-based backend for YOLO ONNX models.
///
/// The model is specialized to a fixed `1x3xSxS` input at load time, so the
/// input size cannot change for the lifetime of the backend.
pub struct TractBackend {
    model: Plan,
    input_size: InputSize,
    layout: OutputLayout,
    labels: Labels,
    device: Device,
    summary: ModelSummary,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: InputSize,
        device: DevicePreference,
        labels_path: Option<&Path>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size.get() as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?;

        let mut outputs = Vec::with_capacity(model.outputs.len());
        for index in 0..model.outputs.len() {
            let fact = model
                .output_fact(index)
                .with_context(|| format!("failed to read output {} fact", index))?;
            let shape = fact
                .shape
                .as_concrete()
                .ok_or_else(|| anyhow!("model output {} has a dynamic shape", index))?;
            outputs.push(shape.to_vec());
        }
        let boxes = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        // Segmentation heads emit prototypes as a second output: [1, mask_dim, h, w].
        let mask_dim = outputs.get(1).and_then(|s| s.get(1).copied()).unwrap_or(0);
        let layout = OutputLayout::from_shape(boxes, mask_dim, input_size.get())?;
        let labels = Labels::for_model(layout.num_classes, labels_path)?;

        let summary = ModelSummary {
            input: vec![1, 3, size, size],
            outputs,
            num_classes: layout.num_classes,
        };
        let model = model
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            layout,
            labels,
            // tract executes on the CPU only.
            device: device.resolve(false),
            summary,
        })
    }

    pub fn summary(&self) -> &ModelSummary {
        &self.summary
    }

    fn build_input(&self, frame: &Frame) -> Result<(Tensor, Letterbox)> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let size = self.input_size.get();
        let letterbox = Letterbox::new(frame.width(), frame.height(), size);
        let canvas = letterbox.apply(frame);
        let side = size as usize;
        let input = tract_ndarray::Array4::from_shape_vec((1, 3, side, side), to_planar_f32(&canvas))
            .context("failed to shape input tensor")?;
        Ok((input.into_tensor(), letterbox))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn device(&self) -> Device {
        self.device
    }

    fn detect(&mut self, frame: &Frame, params: &InferenceParams) -> Result<DetectionResult> {
        if params.input_size != self.input_size {
            return Err(anyhow!(
                "model was loaded for input {} but {} was requested",
                self.input_size,
                params.input_size
            ));
        }
        let (input, letterbox) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let boxes = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let data = boxes
            .as_slice::<f32>()
            .context("model output tensor was not f32")?;
        Postprocess::new(params.confidence).run(data, self.layout, &letterbox, &self.labels)
    }

    fn warm_up(&mut self, params: &InferenceParams) -> Result<()> {
        let side = self.input_size.get();
        let blank = Frame::from_rgb(side, side, vec![0; (side * side * 3) as usize], 0)?;
        self.detect(&blank, params).map(|_| ())
    }
}

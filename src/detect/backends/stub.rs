use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectorBackend, InferenceParams};
use crate::detect::labels::Labels;
use crate::detect::result::{BoundingBox, Detection, DetectionResult};
use crate::frame::Frame;

/// Luma above which a pixel counts as part of the highlighted object.
const BRIGHT_LUMA: u32 = 200;
const STUB_CONFIDENCE: f32 = 0.85;

/// Stub backend for testing and demos. Needs no model file.
///
/// Reports one class-0 detection covering every bright pixel in the frame,
/// which matches the moving square drawn by synthetic camera sources.
pub struct StubBackend {
    labels: Labels,
    calls: u64,
    fail_on_call: Option<u64>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            labels: Labels::coco(),
            calls: 0,
            fail_on_call: None,
        }
    }

    /// Makes the `call`-th detect call (1-based) return an error.
    pub fn failing_on(mut self, call: u64) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame, params: &InferenceParams) -> Result<DetectionResult> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(anyhow!("stub inference failure on call {}", self.calls));
        }

        let Some(bbox) = bright_region(frame) else {
            return Ok(DetectionResult::default());
        };
        if STUB_CONFIDENCE < params.confidence {
            return Ok(DetectionResult::default());
        }
        Ok(DetectionResult::new(vec![Detection {
            bbox,
            confidence: STUB_CONFIDENCE,
            class_id: 0,
            label: self.labels.name(0),
        }]))
    }
}

fn bright_region(frame: &Frame) -> Option<BoundingBox> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in frame.image().enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
        if luma < BRIGHT_LUMA {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
        });
    }
    bounds.map(|(x1, y1, x2, y2)| {
        BoundingBox::new(x1 as f32, y1 as f32, (x2 + 1) as f32, (y2 + 1) as f32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_with_square() -> Frame {
        let mut image = RgbImage::from_pixel(32, 24, Rgb([20, 20, 20]));
        for y in 4..10 {
            for x in 8..14 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        Frame::from_image(image, 1)
    }

    #[test]
    fn stub_backend_boxes_bright_region() -> Result<()> {
        let mut backend = StubBackend::new();
        let result = backend.detect(&frame_with_square(), &InferenceParams::default())?;
        assert_eq!(result.len(), 1);
        let detection = &result.detections[0];
        assert_eq!(detection.label, "person");
        assert_eq!(detection.confidence, 0.85);
        assert_eq!(detection.bbox, BoundingBox::new(8.0, 4.0, 14.0, 10.0));
        Ok(())
    }

    #[test]
    fn stub_backend_honors_threshold_and_dark_frames() -> Result<()> {
        let mut backend = StubBackend::new();
        let strict = InferenceParams {
            confidence: 0.9,
            ..InferenceParams::default()
        };
        assert!(backend.detect(&frame_with_square(), &strict)?.is_empty());

        let dark = Frame::from_image(RgbImage::new(8, 8), 2);
        assert!(backend.detect(&dark, &InferenceParams::default())?.is_empty());
        Ok(())
    }

    #[test]
    fn stub_backend_fails_on_requested_call() {
        let mut backend = StubBackend::new().failing_on(2);
        let params = InferenceParams::default();
        assert!(backend.detect(&frame_with_square(), &params).is_ok());
        assert!(backend.detect(&frame_with_square(), &params).is_err());
        assert!(backend.detect(&frame_with_square(), &params).is_ok());
        assert_eq!(backend.calls(), 3);
    }
}

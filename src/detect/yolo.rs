//! Pre- and post-processing for YOLO-family detection models.
//!
//! Models take a square `1x3xSxS` float tensor in `[0, 1]` and emit a
//! `1x(4+classes[+mask coefficients])xN` tensor of candidate boxes in input
//! pixel space (`cx, cy, w, h` followed by per-class scores).

use anyhow::{anyhow, Result};
use image::{imageops, Rgb, RgbImage};

use crate::detect::labels::Labels;
use crate::detect::result::{BoundingBox, Detection, DetectionResult};
use crate::frame::Frame;

/// Grey used for letterbox padding.
pub const LETTERBOX_FILL: u8 = 114;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Downsampling factors of the three detection heads.
pub const HEAD_STRIDES: [u32; 3] = [8, 16, 32];

/// Number of candidate boxes a model emits for a square `input` edge.
pub fn expected_anchors(input: u32) -> usize {
    HEAD_STRIDES
        .iter()
        .map(|stride| {
            let cells = (input / stride) as usize;
            cells * cells
        })
        .sum()
}

/// Mapping between frame coordinates and the square, padded model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub input: u32,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Letterbox {
    pub fn new(frame_width: u32, frame_height: u32, input: u32) -> Self {
        let (w, h) = (frame_width.max(1) as f32, frame_height.max(1) as f32);
        let scale = (input as f32 / w).min(input as f32 / h);
        let resized_width = ((w * scale).round() as u32).clamp(1, input);
        let resized_height = ((h * scale).round() as u32).clamp(1, input);
        Self {
            input,
            scale,
            pad_x: (input - resized_width) / 2,
            pad_y: (input - resized_height) / 2,
            resized_width,
            resized_height,
            frame_width,
            frame_height,
        }
    }

    /// Resizes `frame` preserving aspect ratio and centers it on a grey canvas.
    pub fn apply(&self, frame: &Frame) -> RgbImage {
        let resized = imageops::resize(
            frame.image(),
            self.resized_width,
            self.resized_height,
            imageops::FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(self.input, self.input, Rgb([LETTERBOX_FILL; 3]));
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Maps a box from model input space back onto the original frame.
    pub fn to_frame(&self, bbox: BoundingBox) -> BoundingBox {
        let (px, py) = (self.pad_x as f32, self.pad_y as f32);
        BoundingBox {
            x1: (bbox.x1 - px) / self.scale,
            y1: (bbox.y1 - py) / self.scale,
            x2: (bbox.x2 - px) / self.scale,
            y2: (bbox.y2 - py) / self.scale,
        }
        .clip(self.frame_width, self.frame_height)
    }
}

/// Converts an RGB image into planar (NCHW) floats scaled to `[0, 1]`.
pub fn to_planar_f32(image: &RgbImage) -> Vec<f32> {
    let plane = (image.width() * image.height()) as usize;
    let mut out = vec![0.0f32; plane * 3];
    for (i, pixel) in image.pixels().enumerate() {
        for channel in 0..3 {
            out[channel * plane + i] = pixel.0[channel] as f32 / 255.0;
        }
    }
    out
}

/// Shape of the box output tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    /// Values per candidate: 4 box values, class scores, mask coefficients.
    pub channels: usize,
    /// Number of candidates.
    pub anchors: usize,
    pub num_classes: usize,
    /// True when the tensor is `1xNxC` instead of `1xCxN`.
    pub transposed: bool,
}

impl OutputLayout {
    /// Derives the layout from the output shape of a model run at `input`.
    ///
    /// `mask_dim` is the number of mask coefficients trailing the class scores
    /// (zero for plain detection models). The anchor axis is the one matching
    /// [`expected_anchors`]; when neither does, `1xCxN` is assumed.
    pub fn from_shape(shape: &[usize], mask_dim: usize, input: u32) -> Result<Self> {
        let (a, b) = match shape {
            [1, a, b] => (*a, *b),
            [a, b] => (*a, *b),
            other => return Err(anyhow!("unexpected detection output shape {:?}", other)),
        };
        let anchors = expected_anchors(input);
        let (channels, anchors, transposed) = if a == anchors && b != anchors {
            (b, a, true)
        } else {
            (a, b, false)
        };
        let num_classes = channels
            .checked_sub(4 + mask_dim)
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                anyhow!(
                    "output has {} values per candidate; need more than {} (4 box + {} mask)",
                    channels,
                    4 + mask_dim,
                    mask_dim
                )
            })?;
        Ok(Self {
            channels,
            anchors,
            num_classes,
            transposed,
        })
    }

    fn value(&self, data: &[f32], channel: usize, anchor: usize) -> f32 {
        if self.transposed {
            data[anchor * self.channels + channel]
        } else {
            data[channel * self.anchors + anchor]
        }
    }
}

/// A scored box in model input space, before NMS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: usize,
}

/// Keeps the best class per candidate if it reaches `confidence`.
pub fn decode(data: &[f32], layout: OutputLayout, confidence: f32) -> Result<Vec<Candidate>> {
    let expected = layout.channels * layout.anchors;
    if data.len() < expected {
        return Err(anyhow!(
            "output tensor has {} values, expected {}",
            data.len(),
            expected
        ));
    }

    let mut candidates = Vec::new();
    for anchor in 0..layout.anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..layout.num_classes {
            let score = layout.value(data, 4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < confidence {
            continue;
        }
        let bbox = BoundingBox::from_center(
            layout.value(data, 0, anchor),
            layout.value(data, 1, anchor),
            layout.value(data, 2, anchor),
            layout.value(data, 3, anchor),
        );
        candidates.push(Candidate {
            bbox,
            score: best_score,
            class_id: best_class,
        });
    }
    Ok(candidates)
}

/// Class-aware greedy non-maximum suppression.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Settings for turning raw model output into detections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Postprocess {
    pub confidence: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Postprocess {
    pub fn new(confidence: f32) -> Self {
        Self {
            confidence,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }

    /// Decode, suppress, and map back to frame coordinates.
    pub fn run(
        &self,
        data: &[f32],
        layout: OutputLayout,
        letterbox: &Letterbox,
        labels: &Labels,
    ) -> Result<DetectionResult> {
        let candidates = decode(data, layout, self.confidence)?;
        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);
        let detections = kept
            .into_iter()
            .map(|c| Detection {
                bbox: letterbox.to_frame(c.bbox),
                confidence: c.score,
                class_id: c.class_id,
                label: labels.name(c.class_id),
            })
            .filter(|d| d.bbox.area() > 0.0)
            .collect();
        Ok(DetectionResult::new(detections))
    }
}

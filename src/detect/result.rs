/// Axis-aligned box in frame pixel coordinates (`x1,y1` top-left, `x2,y2` bottom-right).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from center coordinates and extent.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union; zero for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamps the box into `[0, width] x [0, height]`.
    pub fn clip(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// One detected object.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

/// Result of running detection on a frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Detections sorted by descending confidence.
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(mut detections: Vec<Detection>) -> Self {
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Confidence of the strongest detection, or zero.
    pub fn top_confidence(&self) -> f32 {
        self.detections
            .first()
            .map(|d| d.confidence)
            .unwrap_or(0.0)
    }

    /// Short `label xN` summary for logs, e.g. `person x2, bus x1`.
    pub fn summary(&self) -> String {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for detection in &self.detections {
            match counts.iter_mut().find(|(label, _)| *label == detection.label) {
                Some((_, count)) => *count += 1,
                None => counts.push((detection.label.as_str(), 1)),
            }
        }
        if counts.is_empty() {
            return "no detections".to_string();
        }
        counts
            .iter()
            .map(|(label, count)| format!("{label} x{count}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            confidence,
            class_id: 0,
            label: label.to_string(),
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        let c = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&c) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn clip_keeps_box_inside_frame() {
        let clipped = BoundingBox::new(-5.0, 2.0, 700.0, 900.0).clip(640, 480);
        assert_eq!(clipped, BoundingBox::new(0.0, 2.0, 640.0, 480.0));
    }

    #[test]
    fn result_orders_by_confidence_and_summarizes() {
        let result = DetectionResult::new(vec![
            detection("person", 0.4),
            detection("bus", 0.9),
            detection("person", 0.7),
        ]);
        assert_eq!(result.top_confidence(), 0.9);
        assert_eq!(result.detections[1].confidence, 0.7);
        assert_eq!(result.summary(), "bus x1, person x2");
        assert_eq!(DetectionResult::default().summary(), "no detections");
    }
}

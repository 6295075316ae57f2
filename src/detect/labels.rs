use anyhow::{Context, Result};
use std::path::Path;

/// COCO class names in model output order.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Class id to display name mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    pub fn coco() -> Self {
        Self::from_names(COCO_LABELS.iter().map(|s| s.to_string()).collect())
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Reads one label per line; blank lines are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        Self::from_names(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Picks labels for a model with `num_classes` outputs.
    ///
    /// An explicit labels file wins; otherwise COCO names are used when the
    /// class count matches, and generated names when it does not.
    pub fn for_model(num_classes: usize, labels_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = labels_path {
            let labels = Self::from_file(path)?;
            if labels.len() != num_classes {
                log::warn!(
                    "labels file {} has {} entries but the model has {} classes",
                    path.display(),
                    labels.len(),
                    num_classes
                );
            }
            return Ok(labels);
        }
        if num_classes == COCO_LABELS.len() {
            Ok(Self::coco())
        } else {
            Ok(Self::from_names(Vec::new()))
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for `class_id`, or `class<N>` when unknown.
    pub fn name(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{class_id}"))
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::coco()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_names_cover_common_classes() {
        let labels = Labels::coco();
        assert_eq!(labels.len(), 80);
        assert_eq!(labels.name(0), "person");
        assert_eq!(labels.name(5), "bus");
        assert_eq!(labels.name(79), "toothbrush");
        assert_eq!(labels.name(80), "class80");
    }

    #[test]
    fn parse_skips_blank_lines() {
        let labels = Labels::parse("cat\n\n  dog  \n");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.name(1), "dog");
    }

    #[test]
    fn for_model_generates_names_for_custom_class_counts() -> Result<()> {
        let labels = Labels::for_model(3, None)?;
        assert!(labels.is_empty());
        assert_eq!(labels.name(2), "class2");

        let mut file = tempfile::NamedTempFile::new()?;
        std::io::Write::write_all(&mut file, b"helmet\nvest\nboots\n")?;
        let labels = Labels::for_model(3, Some(file.path()))?;
        assert_eq!(labels.name(0), "helmet");
        Ok(())
    }
}

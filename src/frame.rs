//! Frames flowing through the detection loop.
//!
//! - `Frame`: one captured RGB image, owned by a single loop iteration.
//!
//! A frame is produced by a source, borrowed by the detector, then moved into
//! the renderer, which hands the annotated frame to the viewer. Nothing keeps
//! frames around after the iteration ends.

use anyhow::{anyhow, Result};
use image::{DynamicImage, RgbImage};

/// A captured RGB8 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Capture sequence number assigned by the source (1-based).
    pub sequence: u64,
}

impl Frame {
    /// Wraps tightly packed RGB24 bytes.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("invalid RGB buffer for {}x{}", width, height))?;
        Ok(Self { image, sequence })
    }

    pub fn from_image(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn from_dynamic(image: DynamicImage, sequence: u64) -> Self {
        Self::from_image(image.into_rgb8(), sequence)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Packed RGB24 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(2, 2, vec![0; 12], 1).is_ok());
        assert!(Frame::from_rgb(2, 2, vec![0; 11], 1).is_err());
        assert!(Frame::from_rgb(u32::MAX, u32::MAX, Vec::new(), 1).is_err());
    }

    #[test]
    fn frame_exposes_dimensions_and_pixels() -> Result<()> {
        let frame = Frame::from_rgb(3, 1, vec![1, 2, 3, 4, 5, 6, 7, 8, 9], 7)?;
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 1);
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.pixels()[3..6], [4, 5, 6]);
        assert_eq!(frame.image().get_pixel(2, 0).0, [7, 8, 9]);
        Ok(())
    }
}

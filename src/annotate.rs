//! Overlay rendering: detection boxes, class labels and the FPS readout.
//!
//! Drawing overwrites pixels; there is no blending. Shapes that leave the
//! frame are clipped.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii, MonoFont, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use image::RgbImage;

use crate::detect::{Detection, DetectionResult};
use crate::frame::Frame;

/// Baseline origin of the FPS text, in pixels from the top-left corner.
pub const FPS_ORIGIN: (i32, i32) = (10, 30);
pub const FPS_COLOR: Rgb888 = Rgb888::new(0, 255, 0);

const BOX_STROKE: u32 = 2;
const LABEL_FONT: &MonoFont<'static> = &ascii::FONT_7X13;
const FPS_FONT: &MonoFont<'static> = &ascii::FONT_10X20;
const LABEL_PADDING: u32 = 2;

const PALETTE: [Rgb888; 10] = [
    Rgb888::new(255, 56, 56),
    Rgb888::new(255, 157, 151),
    Rgb888::new(255, 112, 31),
    Rgb888::new(255, 178, 29),
    Rgb888::new(207, 210, 49),
    Rgb888::new(72, 249, 10),
    Rgb888::new(26, 147, 52),
    Rgb888::new(0, 212, 187),
    Rgb888::new(52, 69, 147),
    Rgb888::new(255, 55, 199),
];

/// Stable color for a class id.
pub fn class_color(class_id: usize) -> Rgb888 {
    PALETTE[class_id % PALETTE.len()]
}

impl DetectionResult {
    /// Returns `frame` with every detection drawn onto it.
    pub fn plot(&self, mut frame: Frame) -> Frame {
        for detection in &self.detections {
            draw_detection(frame.image_mut(), detection);
        }
        frame
    }
}

/// Draws the FPS readout (e.g. `FPS: 30.00`) in the top-left corner.
pub fn draw_fps(frame: &mut Frame, text: &str) {
    let style = MonoTextStyle::new(FPS_FONT, FPS_COLOR);
    let origin = Point::new(FPS_ORIGIN.0, FPS_ORIGIN.1);
    match Text::with_baseline(text, origin, style, Baseline::Alphabetic)
        .draw(&mut Canvas(frame.image_mut()))
    {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

fn draw_detection(image: &mut RgbImage, detection: &Detection) {
    let color = class_color(detection.class_id);
    let bbox = detection.bbox;
    let top_left = Point::new(bbox.x1.round() as i32, bbox.y1.round() as i32);
    let size = Size::new(
        bbox.width().round().max(1.0) as u32,
        bbox.height().round().max(1.0) as u32,
    );
    match Rectangle::new(top_left, size)
        .into_styled(PrimitiveStyle::with_stroke(color, BOX_STROKE))
        .draw(&mut Canvas(image))
    {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }

    let text = format!("{} {:.2}", detection.label, detection.confidence);
    let text_width = LABEL_FONT.character_size.width * text.chars().count() as u32;
    let label_height = LABEL_FONT.character_size.height + 2 * LABEL_PADDING;
    // Above the box when there is room, otherwise just inside its top edge.
    let label_top = if top_left.y >= label_height as i32 {
        top_left.y - label_height as i32
    } else {
        top_left.y
    };
    let background = Rectangle::new(
        Point::new(top_left.x, label_top),
        Size::new(text_width + 2 * LABEL_PADDING, label_height),
    );
    match background
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(&mut Canvas(image))
    {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }

    let style = MonoTextStyle::new(LABEL_FONT, Rgb888::WHITE);
    let origin = Point::new(
        top_left.x + LABEL_PADDING as i32,
        label_top + LABEL_PADDING as i32,
    );
    match Text::with_baseline(&text, origin, style, Baseline::Top).draw(&mut Canvas(image)) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

struct Canvas<'a>(&'a mut RgbImage);

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && (point.x as u32) < width
                && point.y >= 0
                && (point.y as u32) < height
            {
                self.0.put_pixel(
                    point.x as u32,
                    point.y as u32,
                    image::Rgb([color.r(), color.g(), color.b()]),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use image::Rgb;

    fn black_frame(width: u32, height: u32) -> Frame {
        Frame::from_image(RgbImage::new(width, height), 1)
    }

    #[test]
    fn plot_draws_box_outline_in_class_color() {
        let result = DetectionResult::new(vec![Detection {
            bbox: BoundingBox::new(40.0, 40.0, 80.0, 80.0),
            confidence: 0.9,
            class_id: 3,
            label: "motorcycle".to_string(),
        }]);
        let frame = result.plot(black_frame(120, 120));
        let color = class_color(3);
        let expected = Rgb([color.r(), color.g(), color.b()]);

        // Left and bottom edges of the outline.
        assert_eq!(*frame.image().get_pixel(40, 60), expected);
        assert_eq!(*frame.image().get_pixel(60, 79), expected);
        // Interior stays untouched.
        assert_eq!(*frame.image().get_pixel(60, 60), Rgb([0, 0, 0]));
        // Label background sits above the box.
        assert_eq!(*frame.image().get_pixel(41, 40 - 2), expected);
    }

    #[test]
    fn plot_clips_boxes_at_frame_edges() {
        let result = DetectionResult::new(vec![Detection {
            bbox: BoundingBox::new(0.0, 0.0, 500.0, 500.0),
            confidence: 0.5,
            class_id: 0,
            label: "person".to_string(),
        }]);
        let frame = result.plot(black_frame(32, 32));
        assert_eq!(frame.width(), 32);
        assert_ne!(*frame.image().get_pixel(0, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn fps_text_is_drawn_in_green_near_origin() {
        let mut frame = black_frame(200, 60);
        draw_fps(&mut frame, "FPS: 30.00");
        let green = frame
            .image()
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == Rgb([0, 255, 0]))
            .collect::<Vec<_>>();
        assert!(!green.is_empty());
        assert!(green
            .iter()
            .all(|(x, y, _)| *x >= FPS_ORIGIN.0 as u32 && *y <= FPS_ORIGIN.1 as u32 + 5));
    }

    #[test]
    fn palette_wraps_around() {
        assert_eq!(class_color(0), class_color(PALETTE.len()));
    }
}

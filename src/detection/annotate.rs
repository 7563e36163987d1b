// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测框绘制
//! Draws detection boxes and labels onto RGB frames

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::info;

use super::types::Detection;
use crate::error::ModelLoadError;

const LINE_WIDTH: i32 = 2;
const LABEL_SCALE: f32 = 18.0;

// 与YOLOv8调色板一致
const PALETTE: [(u8, u8, u8); 12] = [
    (255, 0, 0),
    (0, 255, 0),
    (0, 0, 255),
    (255, 255, 0),
    (255, 0, 255),
    (0, 255, 255),
    (255, 128, 0),
    (255, 0, 128),
    (128, 255, 0),
    (0, 128, 255),
    (128, 0, 255),
    (255, 128, 128),
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    let (r, g, b) = PALETTE[class_id % PALETTE.len()];
    Rgb([r, g, b])
}

/// 标注器: 无字体时只画框
#[derive(Clone, Default)]
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    pub fn from_font_file(path: &Path) -> Result<Self, ModelLoadError> {
        let font_err = |reason: String| ModelLoadError::Font {
            path: path.display().to_string(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| font_err(e.to_string()))?;
        let font = FontArc::try_from_vec(bytes).map_err(|e| font_err(e.to_string()))?;
        info!("🔤 标签字体: {}", path.display());
        Ok(Self::new(Some(font)))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return;
        }

        for det in detections {
            let color = class_color(det.class_id);
            let x = det.bbox.x1.round() as i32;
            let y = det.bbox.y1.round() as i32;
            let bw = det.bbox.width().round().max(1.0) as u32;
            let bh = det.bbox.height().round().max(1.0) as u32;

            for t in 0..LINE_WIDTH {
                let (tw, th) = (bw + 2 * t as u32, bh + 2 * t as u32);
                draw_hollow_rect_mut(image, Rect::at(x - t, y - t).of_size(tw, th), color);
            }

            if let Some(font) = &self.font {
                let text = format!("{} {:.2}", det.label(), det.confidence);
                let scale = PxScale::from(LABEL_SCALE);
                let (text_w, text_h) = text_size(scale, font, &text);
                let label_y = if y >= text_h as i32 { y - text_h as i32 } else { y };
                draw_filled_rect_mut(
                    image,
                    Rect::at(x, label_y).of_size(text_w.max(1), text_h.max(1)),
                    color,
                );
                draw_text_mut(image, Rgb([0, 0, 0]), x, label_y, scale, font, &text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::BBox;

    #[test]
    fn test_draws_box_outline_in_class_color() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let det = Detection::new(BBox::new(5.0, 5.0, 15.0, 15.0), 1, 0.8);

        Annotator::default().draw(&mut img, &[det]);

        assert_eq!(*img.get_pixel(5, 5), class_color(1));
        assert_eq!(*img.get_pixel(4, 10), class_color(1));
        // 内部不填充
        assert_eq!(*img.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_outside_frame_is_clipped() {
        let mut img = RgbImage::new(4, 4);
        let det = Detection::new(BBox::new(-10.0, -10.0, 100.0, 100.0), 0, 0.8);
        Annotator::default().draw(&mut img, &[det]);
        assert_eq!(img.dimensions(), (4, 4));
    }

    #[test]
    fn test_missing_font_file() {
        let err = Annotator::from_font_file(Path::new("/nonexistent/font.ttf"));
        assert!(matches!(err, Err(ModelLoadError::Font { .. })));
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(class_color(0), class_color(PALETTE.len()));
    }
}

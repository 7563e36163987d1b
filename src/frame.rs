// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 视频帧数据结构
//! Frame types passed between capture, detection and display

use std::time::Instant;

use image::RgbImage;

use crate::detection::Detection;

/// 一次采集得到的原始帧 (H × W × 3, RGB)
///
/// 每个tick产生一次, 最多经过一次检测+渲染, 然后丢弃
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// 检测器输出: 叠加了检测框的帧 + 检测结果
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub detections: Vec<Detection>,
    pub inference_ms: f64,
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! minifb窗口显示
//! Window created on the first frame; `Q` / `Esc` or closing the window quits

use image::RgbImage;
use minifb::{Key, Window, WindowOptions};
use tracing::info;

use super::{rgb_to_argb, DisplaySink};
use crate::error::DisplayError;

pub struct MinifbSink {
    title: String,
    target_fps: usize,
    window: Option<Window>,
    size: (usize, usize),
    buffer: Vec<u32>,
    closed: bool,
}

impl MinifbSink {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            target_fps: 60,
            window: None,
            size: (0, 0),
            buffer: Vec::new(),
            closed: false,
        }
    }

    pub fn with_target_fps(mut self, fps: usize) -> Self {
        self.target_fps = fps;
        self
    }

    fn ensure_window(&mut self, width: usize, height: usize) -> Result<&mut Window, DisplayError> {
        if self.window.is_none() || self.size != (width, height) {
            // 分辨率变化时重建窗口
            self.window = None;
            let mut window = Window::new(&self.title, width, height, WindowOptions::default())
                .map_err(|e| DisplayError::Open(e.to_string()))?;
            window.set_target_fps(self.target_fps);
            info!("🖥️ 窗口创建: {}x{}", width, height);
            self.size = (width, height);
            self.window = Some(window);
        }
        self.window
            .as_mut()
            .ok_or_else(|| DisplayError::Open("window unavailable".into()))
    }
}

impl DisplaySink for MinifbSink {
    fn show(&mut self, image: &RgbImage) -> Result<(), DisplayError> {
        if self.closed {
            return Err(DisplayError::Present("display closed".into()));
        }
        let (w, h) = (image.width() as usize, image.height() as usize);
        let mut buffer = std::mem::take(&mut self.buffer);
        rgb_to_argb(image, &mut buffer);

        let result = self
            .ensure_window(w, h)
            .and_then(|window| {
                window
                    .update_with_buffer(&buffer, w, h)
                    .map_err(|e| DisplayError::Present(e.to_string()))
            });
        self.buffer = buffer;
        result
    }

    fn poll_quit(&mut self) -> bool {
        match &self.window {
            Some(window) => {
                !window.is_open() || window.is_key_down(Key::Escape) || window.is_key_down(Key::Q)
            }
            None => self.closed,
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.window.take().is_some() {
            info!("🖥️ 窗口已关闭");
        }
    }
}

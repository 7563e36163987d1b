// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 显示输出 (Display Sink)
//!
//! - `show`:      渲染一帧
//! - `poll_quit`: 非阻塞地检查用户退出请求
//! - `close`:     释放窗口资源, 可重复调用

#[cfg(feature = "window")]
pub mod window;

#[cfg(feature = "window")]
pub use window::MinifbSink;

use image::RgbImage;

use crate::error::DisplayError;

pub trait DisplaySink {
    fn show(&mut self, image: &RgbImage) -> Result<(), DisplayError>;
    fn poll_quit(&mut self) -> bool;
    fn close(&mut self);
}

/// RGB → minifb的 0RGB u32
pub fn rgb_to_argb(image: &RgbImage, out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        image
            .as_raw()
            .chunks_exact(3)
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
    );
}

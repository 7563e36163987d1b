// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 视频输入系统 (Video Input System)
//!
//! 拉取式帧源: `open` → 多次 `next_frame` → `close`
//! - FfmpegSource: 飞行器UDP视频流解码 (ez-ffmpeg)
//! - CameraSource: 本地摄像头 (ez-ffmpeg)
//! - decode:       两者共用的后台解码线程
//! - convert:      YUV420P → RGB 转换

#[cfg(feature = "ffmpeg")]
pub mod camera;
pub mod convert;
#[cfg(feature = "ffmpeg")]
pub mod decode;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(feature = "ffmpeg")]
pub use camera::CameraSource;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSource;

use crate::error::{CaptureError, ConnectionError};
use crate::frame::Frame;

pub trait FrameSource {
    /// 开启视频流并启动传输, 在第一次 `next_frame` 之前调用一次
    fn open(&mut self) -> Result<(), ConnectionError>;

    /// 取下一帧
    ///
    /// `CaptureError::NoFrame` 表示本tick无帧, 调用方应在下一tick重试;
    /// `CaptureError::Closed` 表示链路断开
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    /// 关闭视频流并释放采集资源, 可重复调用
    fn close(&mut self);
}

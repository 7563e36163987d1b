// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 本地摄像头帧源
//!
//! V4L2(Linux) / AVFoundation(macOS) / DirectShow(Windows), 不需要飞行器

use std::time::Duration;

use tracing::info;

use super::decode::{DecodeThread, InputSpec};
use super::FrameSource;
use crate::error::{CaptureError, ConnectionError};
use crate::frame::Frame;

pub struct CameraSource {
    index: u32,
    frame_timeout: Duration,
    decoder: Option<DecodeThread>,
}

impl CameraSource {
    pub fn new(index: u32, frame_timeout: Duration) -> Self {
        Self {
            index,
            frame_timeout,
            decoder: None,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// 按平台生成摄像头输入
fn camera_input(index: u32) -> Result<InputSpec, ConnectionError> {
    #[cfg(target_os = "linux")]
    let spec = InputSpec::new(format!("/dev/video{}", index)).with_format("v4l2");

    #[cfg(target_os = "macos")]
    let spec = InputSpec::new(index.to_string()).with_format("avfoundation");

    #[cfg(target_os = "windows")]
    let spec = {
        let devices = ez_ffmpeg::device::get_input_video_devices().map_err(|e| {
            ConnectionError::Transport {
                address: format!("camera {}", index),
                reason: e.to_string(),
            }
        })?;
        let name = devices
            .get(index as usize)
            .ok_or_else(|| ConnectionError::Transport {
                address: format!("camera {}", index),
                reason: format!("only {} camera(s) found", devices.len()),
            })?;
        InputSpec::new(format!("video={}", name)).with_format("dshow")
    };

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    let spec = InputSpec::new(index.to_string()).with_format("video4linux2");

    Ok(spec)
}

impl FrameSource for CameraSource {
    fn open(&mut self) -> Result<(), ConnectionError> {
        let spec = camera_input(self.index)?;
        info!("📷 打开摄像头 #{}: {}", self.index, spec.url);
        self.decoder = Some(DecodeThread::spawn(spec)?);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        match &self.decoder {
            Some(decoder) => decoder.next_frame(self.frame_timeout),
            None => Err(CaptureError::Closed("camera not open".into())),
        }
    }

    fn close(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            decoder.shutdown();
            info!("📴 摄像头 #{} 已关闭", self.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_twice_without_open() {
        let mut camera = CameraSource::new(0, Duration::from_millis(10));
        camera.close();
        camera.close();
        assert!(matches!(camera.next_frame(), Err(CaptureError::Closed(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_camera_uses_v4l2() {
        let spec = camera_input(2).unwrap();
        assert_eq!(spec.url, "/dev/video2");
        assert_eq!(spec.format.as_deref(), Some("v4l2"));
    }
}

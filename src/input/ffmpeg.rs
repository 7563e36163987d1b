// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 飞行器UDP视频流帧源
//! Drone UDP video source decoded with ez-ffmpeg

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::decode::{DecodeThread, InputSpec};
use super::FrameSource;
use crate::error::{CaptureError, ConnectionError};
use crate::frame::Frame;
use crate::vehicle::VideoControl;

/// 飞行器视频帧源
///
/// `open` 开启飞行器视频流并在后台线程启动FFmpeg解码;
/// 解码线程退出后通道断开, `next_frame` 返回 `CaptureError::Closed`
pub struct FfmpegSource<V: VideoControl + ?Sized> {
    video: Arc<V>,
    address: String,
    frame_timeout: Duration,
    decoder: Option<DecodeThread>,
    /// 视频流已开启, `close` 时需要关闭
    streaming: bool,
}

impl<V: VideoControl + ?Sized + 'static> FfmpegSource<V> {
    pub fn new(video: Arc<V>, frame_timeout: Duration) -> Self {
        let address = video.video_source_address();
        Self {
            video,
            address,
            frame_timeout,
            decoder: None,
            streaming: false,
        }
    }

    /// 替换解码地址 (例如回放录制的视频流)
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn input_spec(&self) -> InputSpec {
        InputSpec::new(self.address.as_str())
            .with_opt("fifo_size", "5000000")
            .with_opt("overrun_nonfatal", "1")
            .with_opt("fflags", "nobuffer")
    }
}

impl<V: VideoControl + ?Sized + 'static> FrameSource for FfmpegSource<V> {
    fn open(&mut self) -> Result<(), ConnectionError> {
        info!("📹 开启视频流: {}", self.address);
        self.video
            .enable_stream()
            .map_err(ConnectionError::StreamEnable)?;
        self.streaming = true;
        self.decoder = Some(DecodeThread::spawn(self.input_spec())?);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        match &self.decoder {
            Some(decoder) => decoder.next_frame(self.frame_timeout),
            None => Err(CaptureError::Closed("source not open".into())),
        }
    }

    fn close(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            decoder.shutdown();
        }
        if !self.streaming {
            return;
        }
        self.streaming = false;
        if let Err(e) = self.video.disable_stream() {
            warn!("⚠️ 关闭视频流失败: {}", e);
        }
        info!("📴 视频源已关闭");
    }
}

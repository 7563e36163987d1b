// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! FFmpeg解码线程 (飞行器视频流 / 本地摄像头共用)
//! Background FFmpeg decoding into a bounded RGB frame channel
//!
//! 解码线程: FFmpeg → DecodeFilter → 有界通道 → `DecodeThread::next_frame`
//! 通道满时丢弃新帧, 消费端永远只落后不超过两帧。
//! 停止标志置位后解码线程中止调度器, 不依赖下一帧到达。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame as AvFrame, Input};
use image::RgbImage;
use tracing::{debug, info, warn};

use super::convert::{yuv420p_to_rgb, Yuv420p};
use crate::error::{CaptureError, ConnectionError};
use crate::frame::Frame;

const FRAME_QUEUE_DEPTH: usize = 2;
const MAX_DIMENSION: u32 = 4096;
/// 解码线程检查停止标志的间隔
const STOP_POLL: Duration = Duration::from_millis(20);
/// 关闭时等待解码线程退出的上限
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// FFmpeg输入描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub url: String,
    /// 强制输入格式, 例如 `v4l2` / `dshow`
    pub format: Option<String>,
    pub opts: Vec<(String, String)>,
}

impl InputSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: None,
            opts: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_opt(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.push((key.into(), value.into()));
        self
    }

    fn to_input(&self) -> Input {
        let mut input = Input::new(self.url.as_str());
        if let Some(format) = &self.format {
            input = input.set_format(format.as_str());
        }
        if !self.opts.is_empty() {
            let opts: HashMap<String, String> = self.opts.iter().cloned().collect();
            input = input.set_input_opts(opts);
        }
        input
    }
}

/// FFmpeg解码过滤器: YUV420P → RGB帧
#[derive(Clone)]
struct DecodeFilter {
    tx: Sender<Frame>,
    stop: Arc<AtomicBool>,
    count: usize,
    total_frames: usize,
    dropped_frames: usize,
    last: Instant,
    buffer: Vec<u8>,
}

impl DecodeFilter {
    fn new(tx: Sender<Frame>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop,
            count: 0,
            total_frames: 0,
            dropped_frames: 0,
            last: Instant::now(),
            buffer: Vec::new(),
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }

    fn log_stats(&mut self) {
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return;
        }
        let fps = self.count as f64 / elapsed;
        let drop_rate = self.dropped_frames as f64 / self.total_frames.max(1) as f64 * 100.0;
        debug!(
            "📺 解码统计: 解码{}帧 | 实际{:.1}fps | 总帧{} | 丢弃{} ({:.1}%)",
            self.count, fps, self.total_frames, self.dropped_frames, drop_rate
        );
        self.last = Instant::now();
        self.count = 0;
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AvFrame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<AvFrame>, String> {
        if self.stop.load(Ordering::Relaxed) {
            return Err("video source closed".to_string());
        }

        self.total_frames += 1;

        let image = unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.drop_frame("空帧/损坏帧");
                return Ok(None);
            }

            let raw = &*frame.as_ptr();
            let (w, h) = (raw.width as u32, raw.height as u32);
            if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
                self.drop_frame("非法分辨率");
                return Ok(None);
            }

            if raw.data[0].is_null() || raw.data[1].is_null() || raw.data[2].is_null() {
                self.drop_frame("YUV指针为空");
                return Ok(None);
            }
            if raw.linesize[0] <= 0 || raw.linesize[1] <= 0 || raw.linesize[2] <= 0 {
                self.drop_frame("步长异常");
                return Ok(None);
            }

            let (width, height) = (w as usize, h as usize);
            let y_stride = raw.linesize[0] as usize;
            let uv_stride = raw.linesize[1] as usize;
            let chroma_rows = height.div_ceil(2);

            let planes = Yuv420p {
                y: std::slice::from_raw_parts(raw.data[0], y_stride * height),
                u: std::slice::from_raw_parts(raw.data[1], uv_stride * chroma_rows),
                v: std::slice::from_raw_parts(raw.data[2], uv_stride * chroma_rows),
                y_stride,
                uv_stride,
                width,
                height,
            };
            if !planes.is_consistent() {
                self.drop_frame("步长异常");
                return Ok(None);
            }

            yuv420p_to_rgb(&planes, &mut self.buffer);
            RgbImage::from_raw(w, h, std::mem::take(&mut self.buffer))
        };

        let Some(image) = image else {
            self.drop_frame("RGB缓冲区尺寸不符");
            return Ok(None);
        };

        self.count += 1;
        match self.tx.try_send(Frame::new(image)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped_frames += 1,
            Err(TrySendError::Disconnected(_)) => {
                return Err("frame consumer gone".to_string());
            }
        }

        self.log_stats();
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!("✅ 解码线程退出");
    }
}

/// 运行中的解码线程
pub struct DecodeThread {
    stop: Arc<AtomicBool>,
    rx: Option<Receiver<Frame>>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeThread {
    /// 启动解码线程, 等到FFmpeg上下文启动成功或失败后返回
    pub fn spawn(spec: InputSpec) -> Result<Self, ConnectionError> {
        let (tx, rx) = bounded(FRAME_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let filter = DecodeFilter::new(tx, Arc::clone(&stop));
        let thread_stop = Arc::clone(&stop);
        let thread_spec = spec.clone();

        let handle = std::thread::Builder::new()
            .name("video-decode".to_string())
            .spawn(move || {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("decode", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                let started = FfmpegContext::builder()
                    .input(thread_spec.to_input())
                    .filter_descs(["format=yuv420p"].into())
                    .output(out)
                    .build()
                    .map_err(|e| format!("构建失败: {}", e))
                    .and_then(|ctx| ctx.start().map_err(|e| format!("启动失败: {}", e)));

                let sch = match started {
                    Ok(sch) => sch,
                    Err(reason) => {
                        let _ = ready_tx.send(Err(reason));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // 输入阻塞在网络读取时收不到新帧, 由这里中止调度器
                while !sch.is_ended() {
                    if thread_stop.load(Ordering::Relaxed) {
                        debug!("🛑 中止解码: {}", thread_spec.url);
                        sch.abort();
                        break;
                    }
                    std::thread::sleep(STOP_POLL);
                }
                let _ = sch.wait();
                info!("📴 视频解码结束: {}", thread_spec.url);
            })
            .map_err(|e| ConnectionError::Transport {
                address: spec.url.clone(),
                reason: e.to_string(),
            })?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err("decoder thread exited".into()));
        if let Err(reason) = started {
            let _ = handle.join();
            return Err(ConnectionError::Transport {
                address: spec.url,
                reason,
            });
        }

        Ok(Self {
            stop,
            rx: Some(rx),
            handle: Some(handle),
        })
    }

    /// 最多等待 `timeout`; 超时为 `NoFrame`, 解码结束为 `Closed`
    pub fn next_frame(&self, timeout: Duration) -> Result<Frame, CaptureError> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| CaptureError::Closed("decoder stopped".into()))?;
        match rx.recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::NoFrame),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CaptureError::Closed("decoder stopped".into()))
            }
        }
    }

    /// 停止解码并在限定时间内等待线程退出
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            if !join_within(handle, JOIN_TIMEOUT) {
                warn!("⚠️ 解码线程 {:?} 内未退出, 放弃等待", JOIN_TIMEOUT);
            }
        }
    }
}

impl Drop for DecodeThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// 在 `timeout` 内等待线程结束, 超时返回false且不阻塞
fn join_within(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    let _ = handle.join();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_within_finished_thread() {
        let handle = std::thread::spawn(|| {});
        assert!(join_within(handle, Duration::from_secs(1)));
    }

    #[test]
    fn test_join_within_gives_up_on_stuck_thread() {
        let handle = std::thread::spawn(|| std::thread::sleep(Duration::from_secs(2)));
        let start = Instant::now();
        assert!(!join_within(handle, Duration::from_millis(50)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_missing_input_fails_to_start() {
        let err = DecodeThread::spawn(InputSpec::new("/nonexistent/drone-vision/stream.h264"));
        assert!(matches!(err, Err(ConnectionError::Transport { .. })));
    }

    #[test]
    fn test_input_spec_builder() {
        let spec = InputSpec::new("/dev/video0")
            .with_format("v4l2")
            .with_opt("framerate", "30");
        assert_eq!(spec.format.as_deref(), Some("v4l2"));
        assert_eq!(spec.opts, vec![("framerate".to_string(), "30".to_string())]);
    }
}

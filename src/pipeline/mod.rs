// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 视频处理流水线 (Frame Pipeline)
//!
//! 单线程拉取式循环: 采集 → [检测] → 渲染 → 检查退出
//! - 每次成功采集 frame_count 加一, 只有 `frame_count % K == 0` 时才检测
//! - 其余帧直接渲染原图, 不等待检测结果
//! - 无帧 (NoFrame) 跳过本tick, 不改变状态
//! - 未配置检测器时 (仅视频模式) 所有帧直接渲染
//! - 每个tick检查退出请求: 显示端退出或进程中断标志
//!
//! `ActivePipeline` 在Drop时关闭帧源与显示, 任何退出路径都会执行

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::detection::Detector;
use crate::display::DisplaySink;
use crate::error::{CaptureError, PipelineError};
use crate::input::FrameSource;

pub const DEFAULT_SKIP_FACTOR: u32 = 3;

/// 检测节流: 每K帧检测一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle(NonZeroU32);

impl Throttle {
    pub fn new(skip_factor: NonZeroU32) -> Self {
        Self(skip_factor)
    }

    pub fn factor(&self) -> u32 {
        self.0.get()
    }

    pub fn should_detect(&self, frame_count: u64) -> bool {
        frame_count % self.0.get() as u64 == 0
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self(NonZeroU32::MIN.saturating_add(DEFAULT_SKIP_FACTOR - 1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub frame_count: u64,
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// 用户在显示端请求退出
    UserQuit,
    /// 视频链路断开
    SourceLost(String),
    /// 进程收到中断信号 (Ctrl-C)
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub frames: u64,
    pub detections_run: u64,
    pub skipped_ticks: u64,
    pub renders: u64,
    pub stop: StopReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// K: 两次检测之间的采集次数
    pub skip_factor: NonZeroU32,
    /// 单次取帧最长等待
    pub frame_timeout_ms: u64,
    /// 关闭时只显示视频, 不加载模型
    pub detect: bool,
    /// 使用本地摄像头 (设备序号) 代替飞行器视频, 此时不连接飞行器
    pub camera: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            skip_factor: Throttle::default().0,
            frame_timeout_ms: 100,
            detect: true,
            camera: None,
        }
    }
}

impl PipelineConfig {
    pub fn throttle(&self) -> Throttle {
        Throttle::new(self.skip_factor)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

pub struct FramePipeline<S, D, K>
where
    S: FrameSource,
    D: Detector,
    K: DisplaySink,
{
    source: S,
    detector: Option<D>,
    sink: K,
    throttle: Throttle,
    shutdown: Arc<AtomicBool>,
}

impl<S, D, K> FramePipeline<S, D, K>
where
    S: FrameSource,
    D: Detector,
    K: DisplaySink,
{
    pub fn new(source: S, detector: D, sink: K, throttle: Throttle) -> Self {
        Self::with_optional_detector(source, Some(detector), sink, throttle)
    }

    /// `detector` 为 `None` 时只采集和显示
    pub fn with_optional_detector(
        source: S,
        detector: Option<D>,
        sink: K,
        throttle: Throttle,
    ) -> Self {
        Self {
            source,
            detector,
            sink,
            throttle,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 外部中断标志, 置位后流水线在下一个tick结束
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// 开启帧源; 失败时释放帧源与显示后返回错误
    pub fn start(self) -> Result<ActivePipeline<S, D, K>, PipelineError> {
        let Self {
            mut source,
            detector,
            mut sink,
            throttle,
            shutdown,
        } = self;

        if let Err(e) = source.open() {
            error!("❌ 帧源开启失败: {}", e);
            source.close();
            sink.close();
            return Err(PipelineError::Open(e));
        }
        match &detector {
            Some(d) => info!(
                "🎬 流水线启动: 每{}帧检测一次, 后端 {}",
                throttle.factor(),
                d.backend()
            ),
            None => info!("🎬 流水线启动: 仅视频, 不检测"),
        }

        Ok(ActivePipeline {
            source,
            detector,
            sink,
            throttle,
            shutdown,
            state: PipelineState::default(),
        })
    }
}

/// 已开启的流水线 (STREAMING)
pub struct ActivePipeline<S, D, K>
where
    S: FrameSource,
    D: Detector,
    K: DisplaySink,
{
    source: S,
    detector: Option<D>,
    sink: K,
    throttle: Throttle,
    shutdown: Arc<AtomicBool>,
    state: PipelineState,
}

impl<S, D, K> ActivePipeline<S, D, K>
where
    S: FrameSource,
    D: Detector,
    K: DisplaySink,
{
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// 运行至用户退出或链路断开
    pub fn run(mut self) -> Result<PipelineReport, PipelineError> {
        let mut detections_run = 0u64;
        let mut skipped_ticks = 0u64;
        let mut renders = 0u64;

        let mut stats = Stats::new();

        let stop = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("🛑 收到中断信号");
                break StopReason::Interrupted;
            }

            match self.source.next_frame() {
                Ok(frame) => {
                    self.state.frame_count += 1;
                    let count = self.state.frame_count;

                    let due = self.throttle.should_detect(count);
                    let image = match self.detector.as_mut().filter(|_| due) {
                        Some(detector) => {
                            let annotated = detector.infer(frame).map_err(|source| {
                                error!("❌ 检测失败 (帧 {}): {}", count, source);
                                PipelineError::Detect {
                                    frame: count,
                                    source,
                                }
                            })?;
                            detections_run += 1;
                            stats.objects += annotated.detections.len();
                            annotated.image
                        }
                        None => frame.into_image(),
                    };

                    self.sink.show(&image).map_err(|source| {
                        error!("❌ 渲染失败 (帧 {}): {}", count, source);
                        PipelineError::Render {
                            frame: count,
                            source,
                        }
                    })?;
                    renders += 1;
                    stats.frames += 1;
                }
                Err(CaptureError::NoFrame) => skipped_ticks += 1,
                Err(CaptureError::Closed(reason)) => {
                    warn!("📴 视频链路断开: {}", reason);
                    break StopReason::SourceLost(reason);
                }
            }

            if self.sink.poll_quit() {
                info!("🛑 用户退出");
                break StopReason::UserQuit;
            }

            stats.tick(detections_run, skipped_ticks);
        };

        self.state.stopped = true;
        let report = PipelineReport {
            frames: self.state.frame_count,
            detections_run,
            skipped_ticks,
            renders,
            stop,
        };
        info!(
            "🏁 流水线结束: 采集{}帧 | 检测{}次 | 空tick {} | {:?}",
            report.frames, report.detections_run, report.skipped_ticks, report.stop
        );
        Ok(report)
    }
}

impl<S, D, K> Drop for ActivePipeline<S, D, K>
where
    S: FrameSource,
    D: Detector,
    K: DisplaySink,
{
    fn drop(&mut self) {
        self.state.stopped = true;
        self.source.close();
        self.sink.close();
    }
}

/// 每秒一次的统计日志
struct Stats {
    last: Instant,
    frames: usize,
    objects: usize,
}

impl Stats {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
            objects: 0,
        }
    }

    fn tick(&mut self, detections_run: u64, skipped_ticks: u64) {
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return;
        }
        info!(
            "📊 渲染 {:.1}fps | 目标 {} | 累计检测 {} | 空tick {}",
            self.frames as f64 / elapsed,
            self.objects,
            detections_run,
            skipped_ticks
        );
        self.last = Instant::now();
        self.frames = 0;
        self.objects = 0;
    }
}

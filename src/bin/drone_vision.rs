// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 无人机飞行 + 实时检测
//!
//! 主程序入口 - 直接运行: cargo run --bin drone-vision --release
//!
//! 线程:
//! 1. 主线程:   视频帧源 → YOLOv8检测 (每K帧) → 窗口显示
//! 2. 动作线程: 飞行例程 (起飞 / 翻滚或扫描 / 降落)
//! 3. 解码线程: FFmpeg UDP视频解码
//!
//! `--camera N` 只在本地摄像头上运行流水线, 不连接飞行器;
//! `--no-detect` 只显示视频。
//! 第一次 Ctrl-C 与关闭窗口相同: 结束流水线, 例程执行到降落后断开飞行器;
//! 第二次 Ctrl-C 立即退出进程。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use drone_vision_rs::actuation::ThreadPacer;
use drone_vision_rs::detection::YoloDetector;
use drone_vision_rs::display::MinifbSink;
use drone_vision_rs::input::{CameraSource, FfmpegSource};
use drone_vision_rs::vehicle::TelloClient;
use drone_vision_rs::{
    ActuationOutcome, Args, FramePipeline, MissionConfig, PipelineReport, Session,
};
use mimalloc::MiMalloc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_shutdown.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    }) {
        warn!("⚠️ 注册Ctrl-C处理失败: {}", e);
    }

    let args = Args::parse();

    let mut mission = MissionConfig::load(&args.config)
        .with_context(|| format!("加载任务配置失败: {}", args.config.display()))?;
    mission.apply_args(&args).context("命令行参数无效")?;

    // 起飞前加载模型, 失败时不会连接飞行器
    let detector = if mission.pipeline.detect {
        Some(YoloDetector::load(&mission.detector).context("加载检测模型失败")?)
    } else {
        info!("📺 仅视频模式, 不加载模型");
        None
    };
    let sink = MinifbSink::new("Drone Vision - Q/ESC 退出");

    if let Some(index) = mission.pipeline.camera {
        info!("📷 摄像头模式: 设备 #{}, 不连接飞行器", index);
        let source = CameraSource::new(index, mission.pipeline.frame_timeout());
        let report = FramePipeline::with_optional_detector(
            source,
            detector,
            sink,
            mission.pipeline.throttle(),
        )
        .with_shutdown(shutdown)
        .start()
        .context("摄像头启动失败")?
        .run()
        .context("视频流水线失败")?;
        log_pipeline(&report);
        return Ok(());
    }

    let steps = mission.routine.steps().context("飞行例程无效")?;
    info!(
        "🗺️ 例程 {:?}: {} 步 | 每{}帧检测 | 最低电量 {}%",
        mission.routine.kind(),
        steps.len(),
        mission.pipeline.skip_factor,
        mission.session.min_battery
    );

    let vehicle = Arc::new(TelloClient::new(mission.vehicle.clone()));
    let session = Session::new(vehicle, mission.session.clone());

    let source = FfmpegSource::new(
        Arc::clone(session.vehicle()),
        mission.pipeline.frame_timeout(),
    );
    let pipeline =
        FramePipeline::with_optional_detector(source, detector, sink, mission.pipeline.throttle())
            .with_shutdown(Arc::clone(&shutdown));

    if shutdown.load(Ordering::SeqCst) {
        bail!("起飞前收到中断信号");
    }
    let report = session
        .run(pipeline, steps, ThreadPacer)
        .context("会话中止")?;

    info!("🔋 起飞前电量: {}%", report.battery);
    match &report.actuation {
        ActuationOutcome::Completed(seq) => info!(
            "✅ 飞行例程完成: {} 步, 电量读数 {:?}, 遥测异常 {}",
            seq.steps_executed,
            seq.battery_readings,
            seq.advisory_faults.len()
        ),
        ActuationOutcome::Aborted(e) => error!("❌ 飞行例程中止: {}", e),
        ActuationOutcome::Abandoned => warn!("⏱️ 飞行例程未在时限内结束"),
        ActuationOutcome::Panicked => error!("💥 飞行例程线程崩溃"),
    }

    let pipeline = report.pipeline.context("视频流水线失败")?;
    log_pipeline(&pipeline);

    match report.actuation {
        ActuationOutcome::Completed(_) => Ok(()),
        ActuationOutcome::Aborted(e) => Err(e).context("飞行例程失败"),
        ActuationOutcome::Abandoned => bail!("飞行例程超时"),
        ActuationOutcome::Panicked => bail!("飞行例程线程崩溃"),
    }
}

fn log_pipeline(report: &PipelineReport) {
    info!(
        "📊 采集 {} 帧 | 检测 {} 次 | 空tick {} | 结束原因 {:?}",
        report.frames, report.detections_run, report.skipped_ticks, report.stop
    );
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 会话协调 (Session Coordinator)
//!
//! 连接 → 电量检查 → 并发启动 [视频流水线 | 动作序列] → 等待结束 → 断开
//!
//! 流水线在当前线程运行直到用户退出; 动作序列在独立线程运行到结束。
//! 等待动作序列的期限从线程启动时开始计算: 计划时长 + `actuation_join_timeout`。
//! 用户退出或中断信号只结束流水线, 动作序列照常执行到降落。
//! 断开连接在任何退出路径上都会执行。

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::actuation::{planned_duration, ActuationStep, Pacer, SequenceReport, Sequencer};
use crate::detection::Detector;
use crate::display::DisplaySink;
use crate::error::{ActuationError, PipelineError, SessionError};
use crate::input::FrameSource;
use crate::pipeline::{FramePipeline, PipelineReport};
use crate::vehicle::Vehicle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 电量必须高于此值 (百分比)
    pub min_battery: u8,
    /// 超出计划时长后额外等待动作序列的时间
    pub actuation_join_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_battery: 10,
            actuation_join_timeout_ms: 5000,
        }
    }
}

impl SessionConfig {
    pub fn actuation_join_timeout(&self) -> Duration {
        Duration::from_millis(self.actuation_join_timeout_ms)
    }
}

/// 电量等于或低于最低值时禁止起飞
pub fn battery_permits_flight(level: u8, minimum: u8) -> bool {
    level > minimum
}

#[derive(Debug)]
pub enum ActuationOutcome {
    Completed(SequenceReport),
    /// 必须步骤失败, 剩余步骤未执行
    Aborted(ActuationError),
    /// 超过计划时长仍未结束, 线程被放弃
    Abandoned,
    Panicked,
}

#[derive(Debug)]
pub struct SessionReport {
    /// 起飞前检查时的电量
    pub battery: u8,
    pub pipeline: Result<PipelineReport, PipelineError>,
    pub actuation: ActuationOutcome,
}

/// 作用域结束时断开连接
struct LinkGuard<'a, V: Vehicle + ?Sized>(&'a V);

impl<V: Vehicle + ?Sized> Drop for LinkGuard<'_, V> {
    fn drop(&mut self) {
        match self.0.disconnect() {
            Ok(()) => info!("🔌 已断开飞行器连接"),
            Err(e) => warn!("⚠️ 断开连接失败: {}", e),
        }
    }
}

pub struct Session<V: Vehicle + 'static> {
    vehicle: Arc<V>,
    config: SessionConfig,
}

impl<V: Vehicle + 'static> Session<V> {
    pub fn new(vehicle: Arc<V>, config: SessionConfig) -> Self {
        Self { vehicle, config }
    }

    /// 会话内唯一的飞行器句柄, 帧源从这里取得视频控制能力
    pub fn vehicle(&self) -> &Arc<V> {
        &self.vehicle
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn run<S, D, K, P>(
        &self,
        pipeline: FramePipeline<S, D, K>,
        steps: Vec<ActuationStep>,
        pacer: P,
    ) -> Result<SessionReport, SessionError>
    where
        S: FrameSource,
        D: Detector,
        K: DisplaySink,
        P: Pacer + 'static,
    {
        let _link = LinkGuard(&*self.vehicle);

        self.vehicle.connect().map_err(|e| {
            error!("❌ 连接飞行器失败: {}", e);
            SessionError::Connection(e)
        })?;
        info!("🔗 已连接飞行器");

        let battery = self.vehicle.get_battery().map_err(|e| {
            error!("❌ 读取电量失败: {}", e);
            SessionError::BatteryUnknown(e)
        })?;
        if !battery_permits_flight(battery, self.config.min_battery) {
            warn!(
                "🪫 电量 {}% 不高于最低要求 {}%, 中止",
                battery, self.config.min_battery
            );
            return Err(SessionError::Precondition {
                battery,
                minimum: self.config.min_battery,
            });
        }
        info!("🔋 电量 {}%, 检查通过", battery);

        let active = pipeline.start().map_err(|e| {
            error!("❌ 视频流水线启动失败: {}", e);
            SessionError::Stream(e)
        })?;

        let budget = planned_duration(&steps, self.vehicle.command_timeout())
            + self.config.actuation_join_timeout();
        let deadline = Instant::now() + budget;

        let (tx, rx) = bounded(1);
        let vehicle = Arc::clone(&self.vehicle);
        let handle = std::thread::Builder::new()
            .name("actuation".to_string())
            .spawn(move || {
                let result = Sequencer::new(pacer).run(&steps, &*vehicle);
                let _ = tx.send(result);
            })
            .map_err(|e| {
                error!("❌ 动作线程启动失败: {}", e);
                SessionError::Spawn(e)
            })?;

        let pipeline = active.run();
        if let Err(e) = &pipeline {
            error!("❌ 视频流水线异常结束: {}", e);
        }

        let actuation = match rx.recv_deadline(deadline) {
            Ok(result) => {
                let _ = handle.join();
                match result {
                    Ok(report) => ActuationOutcome::Completed(report),
                    Err(e) => {
                        error!("❌ 动作序列中止: {}", e);
                        ActuationOutcome::Aborted(e)
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("⏱️ 动作序列 {:?} 内未结束, 放弃等待", budget);
                ActuationOutcome::Abandoned
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                error!("💥 动作线程panic");
                ActuationOutcome::Panicked
            }
        };

        Ok(SessionReport {
            battery,
            pipeline,
            actuation,
        })
    }
}

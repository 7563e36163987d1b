// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 无人机飞行 + 实时目标检测
//! Scripted drone flight with a concurrent, throttled YOLOv8 video pipeline
//!
//! 两个并发任务共享一个飞行器连接:
//! - `pipeline`:  视频帧源 → 检测 (每K帧) → 显示, 在主线程运行到用户退出
//! - `actuation`: 按时间编排的飞行动作序列, 在独立线程运行
//!
//! `session` 负责连接、电量检查、启动两者并在任何情况下断开连接。

pub mod actuation;
pub mod config;
pub mod detection;
pub mod display;
pub mod error;
pub mod frame;
pub mod input;
pub mod pipeline;
pub mod session;
pub mod vehicle;

#[cfg(test)]
mod testing;

pub use config::{Args, MissionConfig, RoutineConfig};
pub use error::{
    ActuationError, CaptureError, ConfigError, ConnectionError, DetectError, DisplayError,
    ModelLoadError, PipelineError, SessionError, VehicleError,
};
pub use frame::{AnnotatedFrame, Frame};
pub use pipeline::{FramePipeline, PipelineReport, StopReason, Throttle};
pub use session::{ActuationOutcome, Session, SessionReport};

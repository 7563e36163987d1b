// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 飞行器能力接口 (Vehicle capability interface)
//!
//! 两个并发任务只使用各自的能力子集:
//! - 视频流水线: `VideoControl` (开关视频流, 视频地址)
//! - 动作序列:   `FlightControl` (运动命令 + 电量遥测)
//!
//! 实现方负责在内部串行化共享连接上的命令

pub mod tello;

pub use tello::{TelloClient, TelloConfig};

use std::time::Duration;

use crate::error::VehicleError;

/// 翻滚方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

impl FlipDirection {
    pub fn code(&self) -> &'static str {
        match self {
            FlipDirection::Left => "l",
            FlipDirection::Right => "r",
            FlipDirection::Forward => "f",
            FlipDirection::Back => "b",
        }
    }
}

/// 视频控制能力 (流水线使用)
pub trait VideoControl: Send + Sync {
    fn enable_stream(&self) -> Result<(), VehicleError>;

    /// 多次调用安全, 已关闭时不产生副作用
    fn disable_stream(&self) -> Result<(), VehicleError>;

    /// 视频源地址, 例如 `udp://@0.0.0.0:11111`
    fn video_source_address(&self) -> String;
}

/// 运动 + 遥测能力 (动作序列使用)
pub trait FlightControl: Send + Sync {
    fn takeoff(&self) -> Result<(), VehicleError>;
    fn land(&self) -> Result<(), VehicleError>;
    /// 前进, 单位cm
    fn move_forward(&self, distance_cm: u32) -> Result<(), VehicleError>;
    /// 顺时针旋转, 单位度
    fn rotate_clockwise(&self, degrees: u32) -> Result<(), VehicleError>;
    /// 逆时针旋转, 单位度
    fn rotate_counter_clockwise(&self, degrees: u32) -> Result<(), VehicleError>;
    fn flip(&self, direction: FlipDirection) -> Result<(), VehicleError>;
    /// 电量百分比
    fn get_battery(&self) -> Result<u8, VehicleError>;

    /// 单条命令最长等待回复的时间
    fn command_timeout(&self) -> Duration {
        Duration::ZERO
    }
}

/// 完整的飞行器连接 (每个会话唯一)
pub trait Vehicle: VideoControl + FlightControl {
    fn connect(&self) -> Result<(), VehicleError>;

    /// 断开连接, 必须可重复调用, 连接失败后调用也安全
    fn disconnect(&self) -> Result<(), VehicleError>;
}

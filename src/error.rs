// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型定义
//! Error taxonomy for vehicle, video, detection and session faults

use std::time::Duration;

use thiserror::Error;

use crate::actuation::Maneuver;

/// 飞行器命令/遥测错误
#[derive(Error, Debug)]
pub enum VehicleError {
    #[error("vehicle is not connected")]
    NotConnected,
    #[error("failed to bind local port {1}: {0}")]
    Bind(std::io::Error, u16),
    #[error("failed to send `{command}`: {source}")]
    Send {
        command: String,
        source: std::io::Error,
    },
    #[error("no reply to `{command}` within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("vehicle rejected `{command}`: {reply}")]
    Rejected { command: String, reply: String },
    #[error("unexpected reply to `{command}`: {reply}")]
    BadReply { command: String, reply: String },
    #[error("argument out of range for `{command}`: {value} (allowed {min}..={max})")]
    OutOfRange {
        command: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// 视频链路建立失败 (致命)
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to enable video stream: {0}")]
    StreamEnable(#[source] VehicleError),
    #[error("failed to start video transport `{address}`: {reason}")]
    Transport { address: String, reason: String },
}

/// 取帧失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// 本次tick没有新帧 (UDP丢帧等), 下一tick重试
    #[error("no frame available this tick")]
    NoFrame,
    /// 视频链路已断开, 不可恢复
    #[error("video transport closed: {0}")]
    Closed(String),
}

impl CaptureError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::NoFrame)
    }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(String),
    #[error("failed to download model from {url}: {reason}")]
    Download { url: String, reason: String },
    #[error("inference runtime error while loading model: {0}")]
    Runtime(String),
    #[error("failed to load label font {path}: {reason}")]
    Font { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
}

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to open display window: {0}")]
    Open(String),
    #[error("failed to present frame: {0}")]
    Present(String),
}

/// 必须步骤失败: 中止剩余序列
#[derive(Error, Debug)]
#[error("mandatory step #{index} ({maneuver}) failed: {source}")]
pub struct ActuationError {
    pub index: usize,
    pub maneuver: Maneuver,
    #[source]
    pub source: VehicleError,
}

/// 建议性步骤失败: 记录后继续
#[derive(Debug)]
pub struct AdvisoryFault {
    pub index: usize,
    pub maneuver: Maneuver,
    pub cause: VehicleError,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to open frame source: {0}")]
    Open(#[from] ConnectionError),
    #[error("detector failed on frame {frame}: {source}")]
    Detect {
        frame: u64,
        #[source]
        source: DetectError,
    },
    #[error("display failed on frame {frame}: {source}")]
    Render {
        frame: u64,
        #[source]
        source: DisplayError,
    },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to connect to vehicle: {0}")]
    Connection(#[source] VehicleError),
    #[error("failed to start video pipeline: {0}")]
    Stream(#[source] PipelineError),
    #[error("failed to read battery for preflight check: {0}")]
    BatteryUnknown(#[source] VehicleError),
    #[error("battery {battery}% is at or below the {minimum}% minimum")]
    Precondition { battery: u8, minimum: u8 },
    #[error("failed to spawn actuation thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

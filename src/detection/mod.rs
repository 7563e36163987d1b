// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 目标检测 (Object Detection)
//!
//! 检测器在加载时确定计算后端, 之后整个生命周期不再变化;
//! `infer` 同步阻塞, 是每帧的主要耗时

pub mod annotate;
pub mod fetch;
pub mod postprocess;
pub mod types;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use annotate::Annotator;
pub use types::{non_max_suppression, BBox, Detection, COCO_NAMES, INF_SIZE};
#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::DetectError;
use crate::frame::{AnnotatedFrame, Frame};

/// 实际使用的计算后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cuda,
    CoreMl,
    Cpu,
}

impl Backend {
    /// 自动选择时的尝试顺序
    pub const ACCELERATED: [Backend; 2] = [Backend::Cuda, Backend::CoreMl];

    pub fn is_accelerated(&self) -> bool {
        !matches!(self, Backend::Cpu)
    }

    /// 按偏好解析后端, `available` 探测某个加速后端是否可用
    pub fn select(preference: BackendPreference, available: impl Fn(Backend) -> bool) -> Backend {
        match preference {
            BackendPreference::Cpu => Backend::Cpu,
            BackendPreference::Auto => Self::ACCELERATED
                .into_iter()
                .find(|b| available(*b))
                .unwrap_or(Backend::Cpu),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Cuda => "CUDA",
            Backend::CoreMl => "CoreML",
            Backend::Cpu => "CPU",
        };
        f.write_str(name)
    }
}

/// 后端偏好: `Cpu` 对应命令行 `--cpu` 回退开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    #[default]
    Auto,
    Cpu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: PathBuf,
    /// 本地缺失时的下载地址
    pub model_url: Option<String>,
    pub input_size: u32,
    pub conf: f32,
    pub iou: f32,
    pub backend: BackendPreference,
    /// 标签字体 (TTF), 为空时只画框
    pub font: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("yolov8n.onnx"),
            model_url: Some(
                "https://github.com/ultralytics/assets/releases/download/v8.2.0/yolov8n.onnx"
                    .to_string(),
            ),
            input_size: INF_SIZE,
            conf: 0.25,
            iou: 0.45,
            backend: BackendPreference::Auto,
            font: None,
        }
    }
}

pub trait Detector {
    /// 加载时确定的后端
    fn backend(&self) -> Backend;

    /// 对一帧做检测并绘制结果
    ///
    /// 只有尺寸为零等畸形帧才会返回 `DetectError::MalformedFrame`
    fn infer(&mut self, frame: Frame) -> Result<AnnotatedFrame, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn backend(&self) -> Backend {
        (**self).backend()
    }

    fn infer(&mut self, frame: Frame) -> Result<AnnotatedFrame, DetectError> {
        (**self).infer(frame)
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 任务配置 - 命令行参数 + JSON任务文件
//! Mission profile loaded from JSON, with command-line overrides

use std::fs;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actuation::{rectangle_scan, simple_flip, ActuationStep, ScanPattern, TurnSense};
use crate::detection::{BackendPreference, DetectorConfig};
use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use crate::session::SessionConfig;
use crate::vehicle::{FlipDirection, TelloConfig};

/// 飞行 + 实时检测
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "无人机飞行例程 + YOLOv8实时检测", long_about = None)]
pub struct Args {
    /// 任务配置文件 (不存在时写入默认配置)
    #[arg(short, long, default_value = "mission.json")]
    pub config: PathBuf,

    /// 检测模型路径 (ONNX)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 强制使用CPU推理
    #[arg(long)]
    pub cpu: bool,

    /// 飞行例程
    #[arg(short, long, value_enum)]
    pub routine: Option<RoutineKind>,

    /// 飞行器命令地址, 例如 192.168.10.1:8889
    #[arg(long)]
    pub drone: Option<SocketAddr>,

    /// 每K帧检测一次
    #[arg(short = 'k', long)]
    pub skip: Option<NonZeroU32>,

    /// 最低起飞电量 (百分比)
    #[arg(long)]
    pub min_battery: Option<u8>,

    /// 只显示视频, 不加载模型
    #[arg(long)]
    pub no_detect: bool,

    /// 使用本地摄像头 (设备序号), 不连接飞行器
    #[arg(long)]
    pub camera: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RoutineKind {
    Flip,
    Scan,
}

/// 飞行例程定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutineConfig {
    Flip {
        direction: FlipDirection,
    },
    Scan {
        leg_cm: u32,
        repeats: u32,
        sense: TurnSense,
    },
}

impl Default for RoutineConfig {
    fn default() -> Self {
        RoutineConfig::Flip {
            direction: FlipDirection::Right,
        }
    }
}

impl RoutineConfig {
    pub fn default_scan() -> Self {
        RoutineConfig::Scan {
            leg_cm: 100,
            repeats: 1,
            sense: TurnSense::Clockwise,
        }
    }

    pub fn kind(&self) -> RoutineKind {
        match self {
            RoutineConfig::Flip { .. } => RoutineKind::Flip,
            RoutineConfig::Scan { .. } => RoutineKind::Scan,
        }
    }

    /// 展开为动作步骤
    pub fn steps(&self) -> Result<Vec<ActuationStep>, ConfigError> {
        match *self {
            RoutineConfig::Flip { direction } => Ok(simple_flip(direction)),
            RoutineConfig::Scan {
                leg_cm,
                repeats,
                sense,
            } => Ok(rectangle_scan(&ScanPattern::new(leg_cm, repeats, sense)?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub vehicle: TelloConfig,
    pub detector: DetectorConfig,
    pub pipeline: PipelineConfig,
    pub session: SessionConfig,
    pub routine: RoutineConfig,
}

impl MissionConfig {
    /// 从JSON文件加载; 文件不存在时写入并返回默认配置
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("📝 配置文件不存在, 创建默认配置: {}", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        fs::write(path, json).map_err(write_err)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        if !(0.0..=1.0).contains(&d.conf) || !(0.0..=1.0).contains(&d.iou) {
            return Err(ConfigError::Invalid(format!(
                "detector thresholds must be within 0..=1 (conf {}, iou {})",
                d.conf, d.iou
            )));
        }
        if d.input_size == 0 || d.input_size % 32 != 0 {
            return Err(ConfigError::Invalid(format!(
                "detector input size must be a positive multiple of 32, got {}",
                d.input_size
            )));
        }
        if self.session.min_battery > 100 {
            return Err(ConfigError::Invalid(format!(
                "minimum battery must be a percentage, got {}",
                self.session.min_battery
            )));
        }
        self.routine.steps().map(|_| ())
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_args(&mut self, args: &Args) -> Result<(), ConfigError> {
        if let Some(model) = &args.model {
            self.detector.model = model.clone();
        }
        if args.cpu {
            self.detector.backend = BackendPreference::Cpu;
        }
        if let Some(kind) = args.routine {
            if kind != self.routine.kind() {
                self.routine = match kind {
                    RoutineKind::Flip => RoutineConfig::default(),
                    RoutineKind::Scan => RoutineConfig::default_scan(),
                };
            }
        }
        if let Some(drone) = args.drone {
            self.vehicle.address = drone;
        }
        if let Some(k) = args.skip {
            self.pipeline.skip_factor = k;
        }
        if let Some(min) = args.min_battery {
            self.session.min_battery = min;
        }
        if args.no_detect {
            self.pipeline.detect = false;
        }
        if let Some(index) = args.camera {
            self.pipeline.camera = Some(index);
        }
        self.validate()
    }
}

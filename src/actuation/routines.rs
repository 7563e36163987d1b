// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 组合飞行例程
//! Composite routines built from primitive steps

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ActuationStep, Maneuver};
use crate::error::ConfigError;
use crate::vehicle::FlipDirection;

/// 扫描转角
pub const SCAN_TURN_DEGREES: u32 = 90;
/// 矩形每圈的边数
pub const SCAN_SIDES: usize = 4;

const TAKEOFF_LEAD_IN: Duration = Duration::from_secs(3);
const STABILIZE: Duration = Duration::from_secs(3);
const FLIP_SETTLE: Duration = Duration::from_secs(1);
const LANDING_SETTLE: Duration = Duration::from_secs(3);

/// 旋转方向, 一次扫描中所有转弯必须同向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TurnSense {
    Clockwise,
    CounterClockwise,
}

impl TurnSense {
    pub fn turn(&self, degrees: u32) -> Maneuver {
        match self {
            TurnSense::Clockwise => Maneuver::RotateClockwise(degrees),
            TurnSense::CounterClockwise => Maneuver::RotateCounterClockwise(degrees),
        }
    }
}

/// 矩形扫描参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPattern {
    leg_cm: u32,
    repeats: u32,
    sense: TurnSense,
    settle: Duration,
}

impl ScanPattern {
    pub fn new(leg_cm: u32, repeats: u32, sense: TurnSense) -> Result<Self, ConfigError> {
        if !(20..=500).contains(&leg_cm) {
            return Err(ConfigError::Invalid(format!(
                "scan leg must be 20..=500 cm, got {}",
                leg_cm
            )));
        }
        if repeats == 0 {
            return Err(ConfigError::Invalid("scan repeats must be >= 1".into()));
        }
        Ok(Self {
            leg_cm,
            repeats,
            sense,
            settle: Duration::from_secs(1),
        })
    }

    /// 每个动作后的稳定时间
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn leg_cm(&self) -> u32 {
        self.leg_cm
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }

    pub fn sense(&self) -> TurnSense {
        self.sense
    }
}

/// 只含扫描边: repeats × 4 × (前进, 转弯)
pub fn scan_legs(pattern: &ScanPattern) -> Vec<ActuationStep> {
    let mut steps = Vec::with_capacity(pattern.repeats as usize * SCAN_SIDES * 2);
    for _ in 0..pattern.repeats {
        for _ in 0..SCAN_SIDES {
            steps.push(
                ActuationStep::mandatory(Maneuver::Forward(pattern.leg_cm))
                    .with_post_delay(pattern.settle),
            );
            steps.push(
                ActuationStep::mandatory(pattern.sense.turn(SCAN_TURN_DEGREES))
                    .with_post_delay(pattern.settle),
            );
        }
    }
    steps
}

/// 起飞 → 矩形扫描 → 降落
pub fn rectangle_scan(pattern: &ScanPattern) -> Vec<ActuationStep> {
    let mut steps = vec![
        ActuationStep::mandatory(Maneuver::Takeoff)
            .with_pre_delay(TAKEOFF_LEAD_IN)
            .with_post_delay(STABILIZE),
        ActuationStep::battery(),
    ];
    steps.extend(scan_legs(pattern));
    steps.push(ActuationStep::battery());
    steps.push(ActuationStep::mandatory(Maneuver::Land).with_post_delay(LANDING_SETTLE));
    steps
}

/// 起飞 → 稳定 → 翻滚 → 降落
pub fn simple_flip(direction: FlipDirection) -> Vec<ActuationStep> {
    vec![
        ActuationStep::hold(TAKEOFF_LEAD_IN),
        ActuationStep::mandatory(Maneuver::Takeoff),
        ActuationStep::hold(STABILIZE),
        ActuationStep::battery(),
        ActuationStep::mandatory(Maneuver::Flip(direction)).with_post_delay(FLIP_SETTLE),
        ActuationStep::mandatory(Maneuver::Land).with_post_delay(LANDING_SETTLE),
    ]
}

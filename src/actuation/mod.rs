// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 动作序列 (Actuation Sequencer)
//! Strictly sequential, time-paced flight steps
//!
//! 每一步执行完毕(或按其分类记录失败)后才开始下一步:
//! - Mandatory: 运动命令, 失败则中止剩余步骤
//! - Advisory:  遥测读取, 失败仅记录

pub mod routines;

pub use routines::{rectangle_scan, scan_legs, simple_flip, ScanPattern, TurnSense};

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{ActuationError, AdvisoryFault, VehicleError};
use crate::vehicle::{FlightControl, FlipDirection};

/// 单个动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maneuver {
    Takeoff,
    Land,
    Forward(u32),
    RotateClockwise(u32),
    RotateCounterClockwise(u32),
    Flip(FlipDirection),
    /// 固定等待 (机械稳定时间)
    Hold(Duration),
    ReadBattery,
}

impl Maneuver {
    /// 是否为运动命令
    pub fn is_motion(&self) -> bool {
        !matches!(self, Maneuver::Hold(_) | Maneuver::ReadBattery)
    }
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Maneuver::Takeoff => write!(f, "takeoff"),
            Maneuver::Land => write!(f, "land"),
            Maneuver::Forward(cm) => write!(f, "forward {}cm", cm),
            Maneuver::RotateClockwise(deg) => write!(f, "cw {}°", deg),
            Maneuver::RotateCounterClockwise(deg) => write!(f, "ccw {}°", deg),
            Maneuver::Flip(dir) => write!(f, "flip {:?}", dir),
            Maneuver::Hold(d) => write!(f, "hold {:?}", d),
            Maneuver::ReadBattery => write!(f, "battery?"),
        }
    }
}

/// 步骤失败策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Mandatory,
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuationStep {
    pub maneuver: Maneuver,
    pub criticality: Criticality,
    /// 命令前等待
    pub pre_delay: Duration,
    /// 命令后等待
    pub post_delay: Duration,
}

impl ActuationStep {
    pub fn mandatory(maneuver: Maneuver) -> Self {
        Self {
            maneuver,
            criticality: Criticality::Mandatory,
            pre_delay: Duration::ZERO,
            post_delay: Duration::ZERO,
        }
    }

    pub fn advisory(maneuver: Maneuver) -> Self {
        Self {
            criticality: Criticality::Advisory,
            ..Self::mandatory(maneuver)
        }
    }

    pub fn hold(duration: Duration) -> Self {
        Self::mandatory(Maneuver::Hold(duration))
    }

    pub fn battery() -> Self {
        Self::advisory(Maneuver::ReadBattery)
    }

    pub fn with_pre_delay(mut self, delay: Duration) -> Self {
        self.pre_delay = delay;
        self
    }

    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }
}

/// 按计划执行完所有步骤所需的时间: 全部等待 + 每条命令的回复超时
pub fn planned_duration(steps: &[ActuationStep], per_command: Duration) -> Duration {
    steps
        .iter()
        .map(|step| {
            let command = match step.maneuver {
                Maneuver::Hold(d) => d,
                _ => per_command,
            };
            step.pre_delay + command + step.post_delay
        })
        .sum()
}

/// 等待策略, 测试中可替换为不阻塞的实现
pub trait Pacer: Send {
    fn pause(&self, duration: Duration);
}

/// 线程睡眠
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// 序列执行结果
#[derive(Debug, Default)]
pub struct SequenceReport {
    pub steps_executed: usize,
    pub battery_readings: Vec<u8>,
    pub advisory_faults: Vec<AdvisoryFault>,
}

pub struct Sequencer<P: Pacer> {
    pacer: P,
}

impl<P: Pacer> Sequencer<P> {
    pub fn new(pacer: P) -> Self {
        Self { pacer }
    }

    /// 顺序执行所有步骤
    ///
    /// 第i步必须步骤失败时返回错误, i+1..之后的步骤不会执行
    pub fn run<F: FlightControl + ?Sized>(
        &self,
        steps: &[ActuationStep],
        vehicle: &F,
    ) -> Result<SequenceReport, ActuationError> {
        info!("🚁 动作序列开始: {} 步", steps.len());
        let mut report = SequenceReport::default();

        for (index, step) in steps.iter().enumerate() {
            self.pacer.pause(step.pre_delay);

            match self.execute(step.maneuver, vehicle) {
                Ok(battery) => {
                    if let Some(level) = battery {
                        info!("🔋 电量: {}%", level);
                        report.battery_readings.push(level);
                    }
                }
                Err(cause) => match step.criticality {
                    Criticality::Advisory => {
                        warn!("⚠️ 步骤 #{} ({}) 失败, 继续执行: {}", index, step.maneuver, cause);
                        report.advisory_faults.push(AdvisoryFault {
                            index,
                            maneuver: step.maneuver,
                            cause,
                        });
                    }
                    Criticality::Mandatory => {
                        let remaining = steps.len() - index - 1;
                        warn!(
                            "❌ 步骤 #{} ({}) 失败, 中止剩余 {} 步: {}",
                            index, step.maneuver, remaining, cause
                        );
                        return Err(ActuationError {
                            index,
                            maneuver: step.maneuver,
                            source: cause,
                        });
                    }
                },
            }

            report.steps_executed += 1;
            self.pacer.pause(step.post_delay);
        }

        info!("✅ 动作序列完成");
        Ok(report)
    }

    fn execute<F: FlightControl + ?Sized>(
        &self,
        maneuver: Maneuver,
        vehicle: &F,
    ) -> Result<Option<u8>, VehicleError> {
        if maneuver.is_motion() {
            info!("➡️ {}", maneuver);
        }
        match maneuver {
            Maneuver::Takeoff => vehicle.takeoff(),
            Maneuver::Land => vehicle.land(),
            Maneuver::Forward(cm) => vehicle.move_forward(cm),
            Maneuver::RotateClockwise(deg) => vehicle.rotate_clockwise(deg),
            Maneuver::RotateCounterClockwise(deg) => vehicle.rotate_counter_clockwise(deg),
            Maneuver::Flip(direction) => vehicle.flip(direction),
            Maneuver::Hold(duration) => {
                self.pacer.pause(duration);
                Ok(())
            }
            Maneuver::ReadBattery => return vehicle.get_battery().map(Some),
        }
        .map(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{NoPause, RecordingPacer, RecordingVehicle};

    #[test]
    fn test_mandatory_failure_aborts_remaining_steps() {
        let vehicle = RecordingVehicle::new(80).fail_on("forward 100");
        let steps = vec![
            ActuationStep::mandatory(Maneuver::Takeoff),
            ActuationStep::mandatory(Maneuver::Forward(100)),
            ActuationStep::mandatory(Maneuver::RotateClockwise(90)),
            ActuationStep::mandatory(Maneuver::Land),
        ];

        let err = Sequencer::new(NoPause).run(&steps, &vehicle).unwrap_err();

        assert_eq!(err.index, 1);
        assert_eq!(err.maneuver, Maneuver::Forward(100));
        assert_eq!(vehicle.commands(), vec!["takeoff", "forward 100"]);
    }

    #[test]
    fn test_advisory_failure_continues() {
        let vehicle = RecordingVehicle::new(80).fail_on("battery?");
        let steps = vec![
            ActuationStep::mandatory(Maneuver::Takeoff),
            ActuationStep::battery(),
            ActuationStep::mandatory(Maneuver::Land),
        ];

        let report = Sequencer::new(NoPause).run(&steps, &vehicle).unwrap();

        assert_eq!(report.steps_executed, 3);
        assert_eq!(report.advisory_faults.len(), 1);
        assert_eq!(report.advisory_faults[0].index, 1);
        assert!(report.battery_readings.is_empty());
        assert_eq!(vehicle.commands(), vec!["takeoff", "battery?", "land"]);
    }

    #[test]
    fn test_battery_readings_collected() {
        let vehicle = RecordingVehicle::new(64);
        let steps = vec![ActuationStep::battery(), ActuationStep::battery()];
        let report = Sequencer::new(NoPause).run(&steps, &vehicle).unwrap();
        assert_eq!(report.battery_readings, vec![64, 64]);
    }

    #[test]
    fn test_delays_are_paced_in_order() {
        let vehicle = RecordingVehicle::new(80);
        let pacer = RecordingPacer::default();
        let steps = vec![
            ActuationStep::mandatory(Maneuver::Takeoff)
                .with_pre_delay(Duration::from_secs(3))
                .with_post_delay(Duration::from_secs(1)),
            ActuationStep::hold(Duration::from_secs(2)),
        ];

        Sequencer::new(pacer.clone()).run(&steps, &vehicle).unwrap();

        assert_eq!(
            pacer.pauses(),
            vec![
                Duration::from_secs(3),
                Duration::from_secs(1),
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::ZERO,
            ]
        );
    }

    #[test]
    fn test_planned_duration_of_flip_routine() {
        let steps = simple_flip(FlipDirection::Right);
        // 3 + 3 + 1 + 3 秒等待, 另有4条命令 (起飞 电量 翻滚 降落)
        assert_eq!(planned_duration(&steps, Duration::ZERO), Duration::from_secs(10));
        assert_eq!(
            planned_duration(&steps, Duration::from_secs(7)),
            Duration::from_secs(38)
        );
    }

    #[test]
    fn test_hold_is_not_a_motion() {
        assert!(!Maneuver::Hold(Duration::from_secs(1)).is_motion());
        assert!(!Maneuver::ReadBattery.is_motion());
        assert!(Maneuver::Flip(FlipDirection::Right).is_motion());
    }
}

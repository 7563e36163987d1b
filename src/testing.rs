// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 测试替身: 记录型飞行器, 脚本化帧源, 计数检测器, 记录型显示

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::actuation::Pacer;
use crate::detection::{BBox, Backend, Detection, Detector};
use crate::display::DisplaySink;
use crate::error::{CaptureError, ConnectionError, DetectError, DisplayError, VehicleError};
use crate::frame::{AnnotatedFrame, Frame};
use crate::input::FrameSource;
use crate::vehicle::{FlightControl, FlipDirection, Vehicle, VideoControl};

/// 记录所有命令的飞行器, 命令文本与Tello SDK一致
pub struct RecordingVehicle {
    battery: u8,
    failing: HashSet<String>,
    log: Mutex<Vec<String>>,
    streaming: AtomicBool,
    command_timeout: Duration,
}

impl RecordingVehicle {
    pub fn new(battery: u8) -> Self {
        Self {
            battery,
            failing: HashSet::new(),
            log: Mutex::new(Vec::new()),
            streaming: AtomicBool::new(false),
            command_timeout: Duration::ZERO,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn fail_on(mut self, command: &str) -> Self {
        self.failing.insert(command.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn motion_commands(&self) -> Vec<String> {
        const NON_MOTION: [&str; 5] = ["command", "battery?", "streamon", "streamoff", "disconnect"];
        self.commands()
            .into_iter()
            .filter(|c| !NON_MOTION.contains(&c.as_str()))
            .collect()
    }

    fn record(&self, command: &str) -> Result<(), VehicleError> {
        self.log.lock().unwrap().push(command.to_string());
        if self.failing.contains(command) {
            Err(VehicleError::Rejected {
                command: command.to_string(),
                reply: "error".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl VideoControl for RecordingVehicle {
    fn enable_stream(&self) -> Result<(), VehicleError> {
        if self.streaming.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.record("streamon")?;
        self.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable_stream(&self) -> Result<(), VehicleError> {
        if !self.streaming.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.record("streamoff")
    }

    fn video_source_address(&self) -> String {
        "udp://@0.0.0.0:11111".to_string()
    }
}

impl FlightControl for RecordingVehicle {
    fn takeoff(&self) -> Result<(), VehicleError> {
        self.record("takeoff")
    }

    fn land(&self) -> Result<(), VehicleError> {
        self.record("land")
    }

    fn move_forward(&self, distance_cm: u32) -> Result<(), VehicleError> {
        self.record(&format!("forward {}", distance_cm))
    }

    fn rotate_clockwise(&self, degrees: u32) -> Result<(), VehicleError> {
        self.record(&format!("cw {}", degrees))
    }

    fn rotate_counter_clockwise(&self, degrees: u32) -> Result<(), VehicleError> {
        self.record(&format!("ccw {}", degrees))
    }

    fn flip(&self, direction: FlipDirection) -> Result<(), VehicleError> {
        self.record(&format!("flip {}", direction.code()))
    }

    fn get_battery(&self) -> Result<u8, VehicleError> {
        self.record("battery?")?;
        Ok(self.battery)
    }

    fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
}

impl Vehicle for RecordingVehicle {
    fn connect(&self) -> Result<(), VehicleError> {
        self.record("command")
    }

    fn disconnect(&self) -> Result<(), VehicleError> {
        let _ = self.disable_stream();
        self.record("disconnect")
    }
}

/// 不阻塞的等待
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPause;

impl Pacer for NoPause {
    fn pause(&self, _duration: Duration) {}
}

/// 记录每次等待时长
#[derive(Debug, Default, Clone)]
pub struct RecordingPacer {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPacer {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

/// 流水线各阶段的调用计数
#[derive(Debug, Default)]
pub struct Tally {
    pub source_opened: u32,
    pub source_closed: u32,
    pub detections: usize,
    pub renders: usize,
    pub sink_closed: u32,
}

pub type SharedTally = Rc<RefCell<Tally>>;

pub fn tally() -> SharedTally {
    Rc::new(RefCell::new(Tally::default()))
}

pub fn test_frame() -> Frame {
    Frame::new(RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])))
}

/// 脚本化帧源, 脚本耗尽后报告链路断开
pub struct ScriptedSource {
    script: VecDeque<Result<Frame, CaptureError>>,
    tally: SharedTally,
    video: Option<Arc<dyn VideoControl>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Frame, CaptureError>>, tally: SharedTally) -> Self {
        Self {
            script: script.into(),
            tally,
            video: None,
        }
    }

    pub fn frames(count: usize, tally: SharedTally) -> Self {
        Self::new((0..count).map(|_| Ok(test_frame())).collect(), tally)
    }

    pub fn with_video(mut self, video: Arc<dyn VideoControl>) -> Self {
        self.video = Some(video);
        self
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<(), ConnectionError> {
        if let Some(video) = &self.video {
            video.enable_stream().map_err(ConnectionError::StreamEnable)?;
        }
        self.tally.borrow_mut().source_opened += 1;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(CaptureError::Closed("end of script".into())))
    }

    fn close(&mut self) {
        if let Some(video) = &self.video {
            let _ = video.disable_stream();
        }
        self.tally.borrow_mut().source_closed += 1;
    }
}

/// 计数检测器, 每帧返回一个检测框
pub struct CountingDetector {
    tally: SharedTally,
    fail_at: Option<usize>,
}

impl CountingDetector {
    pub fn new(tally: SharedTally) -> Self {
        Self {
            tally,
            fail_at: None,
        }
    }

    /// 第n次调用 (从1开始) 返回错误
    pub fn failing_at(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }
}

impl Detector for CountingDetector {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn infer(&mut self, frame: Frame) -> Result<AnnotatedFrame, DetectError> {
        let call = {
            let mut tally = self.tally.borrow_mut();
            tally.detections += 1;
            tally.detections
        };
        if self.fail_at == Some(call) {
            return Err(DetectError::Inference("scripted failure".into()));
        }
        Ok(AnnotatedFrame {
            image: frame.into_image(),
            detections: vec![Detection::new(BBox::new(1.0, 1.0, 4.0, 4.0), 0, 0.9)],
            inference_ms: 0.0,
        })
    }
}

/// 记录型显示, 可在第n次渲染后请求退出
pub struct RecordingSink {
    tally: SharedTally,
    quit_after: Option<usize>,
}

impl RecordingSink {
    pub fn new(tally: SharedTally) -> Self {
        Self {
            tally,
            quit_after: None,
        }
    }

    pub fn quit_after(mut self, renders: usize) -> Self {
        self.quit_after = Some(renders);
        self
    }
}

impl DisplaySink for RecordingSink {
    fn show(&mut self, _image: &RgbImage) -> Result<(), DisplayError> {
        self.tally.borrow_mut().renders += 1;
        Ok(())
    }

    fn poll_quit(&mut self) -> bool {
        match self.quit_after {
            Some(n) => self.tally.borrow().renders >= n,
            None => false,
        }
    }

    fn close(&mut self) {
        self.tally.borrow_mut().sink_closed += 1;
    }
}

// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! Tello SDK 客户端
//! DJI Tello text-SDK client over UDP
//!
//! 命令为ASCII数据报, 回复为 `ok` / `error ...` / 数值.
//! 同一时间只有一条命令在途: 套接字由互斥锁保护, 两个并发任务的命令在此串行化.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{FlightControl, FlipDirection, Vehicle, VideoControl};
use crate::error::VehicleError;

const FORWARD_RANGE: (u32, u32) = (20, 500);
const ROTATE_RANGE: (u32, u32) = (1, 360);

/// Tello连接参数
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelloConfig {
    /// 飞行器命令地址
    pub address: SocketAddr,
    /// 本地绑定地址 (Tello回复到发送端口)
    pub bind: SocketAddr,
    /// 视频UDP端口
    pub video_port: u16,
    /// 单条命令等待回复的时间
    pub response_timeout_ms: u64,
}

impl Default for TelloConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([192, 168, 10, 1], 8889)),
            bind: SocketAddr::from(([0, 0, 0, 0], 8889)),
            video_port: 11111,
            response_timeout_ms: 7000,
        }
    }
}

impl TelloConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

pub struct TelloClient {
    config: TelloConfig,
    socket: Mutex<Option<UdpSocket>>,
    streaming: AtomicBool,
}

impl TelloClient {
    pub fn new(config: TelloConfig) -> Self {
        Self {
            config,
            socket: Mutex::new(None),
            streaming: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TelloConfig {
        &self.config
    }

    fn lock_socket(&self) -> MutexGuard<'_, Option<UdpSocket>> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 发送一条命令并等待回复
    fn send_command(&self, command: &str) -> Result<String, VehicleError> {
        let guard = self.lock_socket();
        let socket = guard.as_ref().ok_or(VehicleError::NotConnected)?;

        drain_stale(socket);

        debug!("→ {}", command);
        socket
            .send_to(command.as_bytes(), self.config.address)
            .map_err(|source| VehicleError::Send {
                command: command.to_string(),
                source,
            })?;

        let mut buf = [0u8; 1024];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    if from != self.config.address {
                        // 其他来源的数据报, 忽略
                        continue;
                    }
                    let reply = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                    debug!("← {} ({})", reply, command);
                    return Ok(reply);
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(VehicleError::Timeout {
                        command: command.to_string(),
                        timeout: self.config.response_timeout(),
                    });
                }
                Err(source) => {
                    return Err(VehicleError::Send {
                        command: command.to_string(),
                        source,
                    });
                }
            }
        }
    }

    /// 发送命令, 回复必须为 `ok`
    fn expect_ok(&self, command: &str) -> Result<(), VehicleError> {
        let reply = self.send_command(command)?;
        if reply.eq_ignore_ascii_case("ok") {
            Ok(())
        } else if reply.to_ascii_lowercase().starts_with("error") {
            Err(VehicleError::Rejected {
                command: command.to_string(),
                reply,
            })
        } else {
            Err(VehicleError::BadReply {
                command: command.to_string(),
                reply,
            })
        }
    }
}

/// 丢弃上一条超时命令的迟到回复
fn drain_stale(socket: &UdpSocket) {
    if socket.set_nonblocking(true).is_err() {
        return;
    }
    let mut buf = [0u8; 1024];
    while let Ok((n, _)) = socket.recv_from(&mut buf) {
        debug!(
            "丢弃过期回复: {}",
            String::from_utf8_lossy(&buf[..n]).trim()
        );
    }
    let _ = socket.set_nonblocking(false);
}

fn check_range(
    command: &'static str,
    value: u32,
    (min, max): (u32, u32),
) -> Result<u32, VehicleError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(VehicleError::OutOfRange {
            command,
            value,
            min,
            max,
        })
    }
}

impl VideoControl for TelloClient {
    fn enable_stream(&self) -> Result<(), VehicleError> {
        if self.streaming.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.expect_ok("streamon")?;
        self.streaming.store(true, Ordering::SeqCst);
        info!("📹 视频流已开启");
        Ok(())
    }

    fn disable_stream(&self) -> Result<(), VehicleError> {
        if !self.streaming.load(Ordering::SeqCst) {
            return Ok(());
        }
        // 确认后才清除标志, 超时的streamoff由disconnect重试
        self.expect_ok("streamoff")?;
        self.streaming.store(false, Ordering::SeqCst);
        info!("📹 视频流已关闭");
        Ok(())
    }

    fn video_source_address(&self) -> String {
        format!("udp://@0.0.0.0:{}", self.config.video_port)
    }
}

impl FlightControl for TelloClient {
    fn takeoff(&self) -> Result<(), VehicleError> {
        self.expect_ok("takeoff")
    }

    fn land(&self) -> Result<(), VehicleError> {
        self.expect_ok("land")
    }

    fn move_forward(&self, distance_cm: u32) -> Result<(), VehicleError> {
        let cm = check_range("forward", distance_cm, FORWARD_RANGE)?;
        self.expect_ok(&format!("forward {}", cm))
    }

    fn rotate_clockwise(&self, degrees: u32) -> Result<(), VehicleError> {
        let deg = check_range("cw", degrees, ROTATE_RANGE)?;
        self.expect_ok(&format!("cw {}", deg))
    }

    fn rotate_counter_clockwise(&self, degrees: u32) -> Result<(), VehicleError> {
        let deg = check_range("ccw", degrees, ROTATE_RANGE)?;
        self.expect_ok(&format!("ccw {}", deg))
    }

    fn flip(&self, direction: FlipDirection) -> Result<(), VehicleError> {
        self.expect_ok(&format!("flip {}", direction.code()))
    }

    fn get_battery(&self) -> Result<u8, VehicleError> {
        let reply = self.send_command("battery?")?;
        reply.parse::<u8>().map_err(|_| VehicleError::BadReply {
            command: "battery?".to_string(),
            reply,
        })
    }

    fn command_timeout(&self) -> Duration {
        self.config.response_timeout()
    }
}

impl Vehicle for TelloClient {
    fn connect(&self) -> Result<(), VehicleError> {
        {
            let mut guard = self.lock_socket();
            if guard.is_none() {
                let socket = UdpSocket::bind(self.config.bind)
                    .map_err(|e| VehicleError::Bind(e, self.config.bind.port()))?;
                socket
                    .set_read_timeout(Some(self.config.response_timeout()))
                    .map_err(|e| VehicleError::Bind(e, self.config.bind.port()))?;
                *guard = Some(socket);
            }
        }

        // 进入SDK模式
        self.expect_ok("command")?;
        info!("✅ 已连接 Tello {}", self.config.address);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), VehicleError> {
        if let Err(e) = self.disable_stream() {
            warn!("⚠️ 断开前关闭视频流失败: {}", e);
        }
        if self.lock_socket().take().is_some() {
            info!("🔌 已断开 Tello {}", self.config.address);
        }
        self.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    /// 本地回环上的假飞行器: 记录收到的命令, 按规则回复
    struct FakeDrone {
        addr: SocketAddr,
        log: Arc<Mutex<Vec<String>>>,
        handle: JoinHandle<()>,
    }

    impl FakeDrone {
        fn spawn(reply: fn(&str) -> Option<&'static str>) -> Self {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            socket
                .set_read_timeout(Some(Duration::from_millis(500)))
                .unwrap();
            let addr = socket.local_addr().unwrap();
            let log = Arc::new(Mutex::new(Vec::new()));
            let log_clone = Arc::clone(&log);
            let handle = thread::spawn(move || {
                let mut buf = [0u8; 256];
                while let Ok((n, from)) = socket.recv_from(&mut buf) {
                    let cmd = String::from_utf8_lossy(&buf[..n]).to_string();
                    log_clone.lock().unwrap().push(cmd.clone());
                    if let Some(r) = reply(&cmd) {
                        socket.send_to(r.as_bytes(), from).unwrap();
                    }
                }
            });
            Self { addr, log, handle }
        }

        fn client(&self, timeout_ms: u64) -> TelloClient {
            TelloClient::new(TelloConfig {
                address: self.addr,
                bind: "127.0.0.1:0".parse().unwrap(),
                video_port: 11111,
                response_timeout_ms: timeout_ms,
            })
        }

        fn commands(self) -> Vec<String> {
            self.handle.join().unwrap();
            let log = self.log.lock().unwrap();
            log.clone()
        }
    }

    fn cooperative(cmd: &str) -> Option<&'static str> {
        match cmd {
            "battery?" => Some("87\r\n"),
            "flip x" => Some("error"),
            _ => Some("ok"),
        }
    }

    #[test]
    fn test_connect_and_battery() {
        let drone = FakeDrone::spawn(cooperative);
        let client = drone.client(1000);
        client.connect().unwrap();
        assert_eq!(client.get_battery().unwrap(), 87);
        client.disconnect().unwrap();
        assert_eq!(drone.commands(), vec!["command", "battery?"]);
    }

    #[test]
    fn test_stream_toggle_is_idempotent() {
        let drone = FakeDrone::spawn(cooperative);
        let client = drone.client(1000);
        client.connect().unwrap();
        client.enable_stream().unwrap();
        client.enable_stream().unwrap();
        client.disable_stream().unwrap();
        client.disable_stream().unwrap();
        client.disconnect().unwrap();
        client.disconnect().unwrap();
        assert_eq!(
            drone.commands(),
            vec!["command", "streamon", "streamoff"]
        );
    }

    #[test]
    fn test_disconnect_turns_stream_off() {
        let drone = FakeDrone::spawn(cooperative);
        let client = drone.client(1000);
        client.connect().unwrap();
        client.enable_stream().unwrap();
        client.disconnect().unwrap();
        assert_eq!(
            drone.commands(),
            vec!["command", "streamon", "streamoff"]
        );
    }

    #[test]
    fn test_unacknowledged_streamoff_is_retried_on_disconnect() {
        fn silent_streamoff(cmd: &str) -> Option<&'static str> {
            match cmd {
                "streamoff" => None,
                _ => Some("ok"),
            }
        }
        let drone = FakeDrone::spawn(silent_streamoff);
        let client = drone.client(100);
        client.connect().unwrap();
        client.enable_stream().unwrap();
        assert!(matches!(
            client.disable_stream(),
            Err(VehicleError::Timeout { .. })
        ));
        client.disconnect().unwrap();
        assert_eq!(
            drone.commands(),
            vec!["command", "streamon", "streamoff", "streamoff"]
        );
    }

    #[test]
    fn test_motion_commands_format() {
        let drone = FakeDrone::spawn(cooperative);
        let client = drone.client(1000);
        client.connect().unwrap();
        client.takeoff().unwrap();
        client.move_forward(500).unwrap();
        client.rotate_clockwise(90).unwrap();
        client.rotate_counter_clockwise(90).unwrap();
        client.flip(FlipDirection::Right).unwrap();
        client.land().unwrap();
        client.disconnect().unwrap();
        assert_eq!(
            drone.commands(),
            vec![
                "command",
                "takeoff",
                "forward 500",
                "cw 90",
                "ccw 90",
                "flip r",
                "land"
            ]
        );
    }

    #[test]
    fn test_rejected_reply() {
        fn refuse_takeoff(cmd: &str) -> Option<&'static str> {
            match cmd {
                "takeoff" => Some("error Motor stop"),
                _ => Some("ok"),
            }
        }
        let drone = FakeDrone::spawn(refuse_takeoff);
        let client = drone.client(1000);
        client.connect().unwrap();
        let err = client.takeoff().unwrap_err();
        assert!(matches!(err, VehicleError::Rejected { .. }));
        client.disconnect().unwrap();
        drone.commands();
    }

    #[test]
    fn test_out_of_range_is_not_sent() {
        let drone = FakeDrone::spawn(cooperative);
        let client = drone.client(1000);
        client.connect().unwrap();
        assert!(matches!(
            client.move_forward(600),
            Err(VehicleError::OutOfRange { value: 600, .. })
        ));
        assert!(matches!(
            client.rotate_clockwise(0),
            Err(VehicleError::OutOfRange { .. })
        ));
        client.disconnect().unwrap();
        assert_eq!(drone.commands(), vec!["command"]);
    }

    #[test]
    fn test_no_reply_times_out() {
        fn silent_takeoff(cmd: &str) -> Option<&'static str> {
            match cmd {
                "takeoff" => None,
                _ => Some("ok"),
            }
        }
        let drone = FakeDrone::spawn(silent_takeoff);
        let client = drone.client(150);
        client.connect().unwrap();
        assert!(matches!(
            client.takeoff(),
            Err(VehicleError::Timeout { .. })
        ));
        client.disconnect().unwrap();
        drone.commands();
    }

    #[test]
    fn test_commands_require_connection() {
        let client = TelloClient::new(TelloConfig::default());
        assert!(matches!(client.takeoff(), Err(VehicleError::NotConnected)));
        // 未连接时断开也安全
        client.disconnect().unwrap();
        client.disconnect().unwrap();
    }

    #[test]
    fn test_video_source_address() {
        let client = TelloClient::new(TelloConfig::default());
        assert_eq!(client.video_source_address(), "udp://@0.0.0.0:11111");
    }
}

//! Link parameters.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::state::command::DEFAULT_ONE_SHOT_TIMEOUT;
use crate::state::health::{DEFAULT_MAX_SEND_ERRORS, DEFAULT_STALE_AFTER};

/// Address the drone's access point hands itself.
pub const DEFAULT_DRONE_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 28, 1));

/// Control and telemetry channel.
pub const CONTROL_PORT: u16 = 7080;

/// Inbound video channel.
pub const VIDEO_PORT: u16 = 7070;

/// Configuration for [`DroneLink`](crate::network::DroneLink).
///
/// Only the drone address and the two ports are protocol-relevant; the
/// rest are timing knobs with working defaults.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub drone_ip: IpAddr,
    pub control_port: u16,
    pub video_port: u16,
    /// Local bind address of the control socket.
    pub local_control: SocketAddr,
    /// Local bind address of the video socket.
    pub local_video: SocketAddr,

    pub control_interval: Duration,
    pub heartbeat_interval: Duration,
    pub watchdog_interval: Duration,
    /// Pause after a failed control send.
    pub error_backoff: Duration,
    /// Bound on every blocking receive.
    pub recv_timeout: Duration,
    /// How long shutdown waits for each loop before aborting it.
    pub shutdown_grace: Duration,
    pub reconnect_pause: Duration,

    pub stale_after: Duration,
    pub max_send_errors: u32,
    pub one_shot_timeout: Duration,
    /// Heading change per second at full yaw stick, in degrees.
    pub max_yaw_rate: f32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DRONE_IP)
    }
}

impl LinkConfig {
    pub fn new(drone_ip: IpAddr) -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Self {
            drone_ip,
            control_port: CONTROL_PORT,
            video_port: VIDEO_PORT,
            local_control: SocketAddr::new(any, CONTROL_PORT),
            local_video: SocketAddr::new(any, VIDEO_PORT),
            control_interval: Duration::from_millis(140),
            heartbeat_interval: Duration::from_secs(1),
            watchdog_interval: Duration::from_secs(3),
            error_backoff: Duration::from_secs(1),
            recv_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(2),
            reconnect_pause: Duration::from_secs(2),
            stale_after: DEFAULT_STALE_AFTER,
            max_send_errors: DEFAULT_MAX_SEND_ERRORS,
            one_shot_timeout: DEFAULT_ONE_SHOT_TIMEOUT,
            max_yaw_rate: 90.0,
        }
    }

    /// Override the local bind addresses (tests bind ephemeral ports).
    pub fn with_local_addrs(mut self, control: SocketAddr, video: SocketAddr) -> Self {
        self.local_control = control;
        self.local_video = video;
        self
    }

    /// Where control frames, heartbeats and auxiliary commands go.
    pub fn drone_control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.drone_ip, self.control_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_drone() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.drone_control_addr().to_string(), "192.168.28.1:7080");
        assert_eq!(cfg.local_video.port(), 7070);
        assert_eq!(cfg.control_interval, Duration::from_millis(140));
        assert_eq!(cfg.max_send_errors, 10);
    }
}

//! Configuration for the pilot console.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use x80_core::X80Error;
use x80_core::network::{CONTROL_PORT, LinkConfig, VIDEO_PORT};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    /// Where the drone lives.
    pub drone: DroneConfig,
    /// Loop periods and supervision thresholds.
    pub timing: TimingConfig,
    /// Console behaviour.
    pub session: SessionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Drone addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneConfig {
    /// IP address of the drone's access point.
    pub ip: String,
    /// Control / telemetry UDP port.
    pub control_port: u16,
    /// Video UDP port.
    pub video_port: u16,
    /// Local bind address for both sockets.
    pub bind_ip: String,
}

/// Timing knobs, all in milliseconds unless named otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub control_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub watchdog_interval_ms: u64,
    pub recv_timeout_ms: u64,
    pub error_backoff_ms: u64,
    pub reconnect_pause_ms: u64,
    /// A stream with no update for this long is stale.
    pub stale_after_ms: u64,
    /// Consecutive send failures tolerated before LOST.
    pub max_send_errors: u32,
    /// Lifetime of takeoff, land, stop, calibrate and flip.
    pub one_shot_timeout_ms: u64,
    /// Heading change at full yaw stick, degrees per second.
    pub max_yaw_rate: f32,
}

/// Console behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Send the video start command right after connecting.
    pub video_on_connect: bool,
    /// Rebuild the session automatically when the watchdog reports LOST.
    pub auto_reconnect: bool,
    /// Telemetry print period. 0 disables printing.
    pub telemetry_interval_ms: u64,
    /// Warn once when battery drops to this percentage.
    pub low_battery_warning: u8,
    /// Trigger a landing while flying at this percentage. 0 disables.
    pub auto_land_battery: u8,
    /// Directory the `photo` command writes JPEG snapshots to.
    pub photo_dir: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.28.1".into(),
            control_port: CONTROL_PORT,
            video_port: VIDEO_PORT,
            bind_ip: "0.0.0.0".into(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            control_interval_ms: 140,
            heartbeat_interval_ms: 1000,
            watchdog_interval_ms: 3000,
            recv_timeout_ms: 1000,
            error_backoff_ms: 1000,
            reconnect_pause_ms: 2000,
            stale_after_ms: 5000,
            max_send_errors: 10,
            one_shot_timeout_ms: 1000,
            max_yaw_rate: 90.0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            video_on_connect: true,
            auto_reconnect: false,
            telemetry_interval_ms: 1000,
            low_battery_warning: 20,
            auto_land_battery: 10,
            photo_dir: PathBuf::from("photos"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// A missing file is the normal first run; a broken one is not.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl PilotConfig {
    /// Load configuration from a TOML file.
    ///
    /// Callers fall back to [`PilotConfig::default`] on error. Nothing is
    /// logged here because the log level itself comes from this file.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Convert into the link's configuration. Fails only on unparsable
    /// addresses.
    pub fn to_link_config(&self) -> Result<LinkConfig, X80Error> {
        let drone_ip: IpAddr = parse_ip(&self.drone.ip)?;
        let bind_ip: IpAddr = parse_ip(&self.drone.bind_ip)?;
        let t = &self.timing;
        let ms = Duration::from_millis;

        let mut cfg = LinkConfig::new(drone_ip).with_local_addrs(
            (bind_ip, self.drone.control_port).into(),
            (bind_ip, self.drone.video_port).into(),
        );
        cfg.control_port = self.drone.control_port;
        cfg.video_port = self.drone.video_port;
        cfg.control_interval = ms(t.control_interval_ms.max(10));
        cfg.heartbeat_interval = ms(t.heartbeat_interval_ms.max(10));
        cfg.watchdog_interval = ms(t.watchdog_interval_ms.max(10));
        cfg.recv_timeout = ms(t.recv_timeout_ms.max(10));
        cfg.error_backoff = ms(t.error_backoff_ms);
        cfg.reconnect_pause = ms(t.reconnect_pause_ms);
        cfg.stale_after = ms(t.stale_after_ms);
        cfg.max_send_errors = t.max_send_errors;
        cfg.one_shot_timeout = ms(t.one_shot_timeout_ms);
        cfg.max_yaw_rate = t.max_yaw_rate;
        Ok(cfg)
    }
}

fn parse_ip(text: &str) -> Result<IpAddr, X80Error> {
    text.trim()
        .parse()
        .map_err(|_| X80Error::InvalidAddress(text.to_string()))
}

// ── Tests ────────────────────────────────────────────────────────

//! Pilot session: owns the link and drives it from the console.
//!
//! Runs until `quit`, end of the stop handle, or a fatal connect error.
//! Inbound events are consumed here: frames are kept for `photo`, status
//! lines are logged, and a LOST transition triggers the reconnect when
//! `session.auto_reconnect` is set.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use x80_core::{ConnectionHealth, DroneLink, LinkEvent, OneShot, Telemetry, VideoFrame, X80Error};

use crate::battery::{BatteryAction, BatteryGuard};
use crate::config::{PilotConfig, SessionConfig};
use crate::console::{ConsoleCommand, HELP};

/// Minimum telemetry print period.
const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(100);

// ── Report ───────────────────────────────────────────────────────

/// One telemetry line, printed as text or JSON.
#[derive(Debug, Serialize)]
pub struct Report {
    pub health: ConnectionHealth,
    pub connected: bool,
    pub uptime_secs: f64,
    pub speed: f32,
    pub speed_mode: String,
    pub send_errors: u32,
    pub video_frames: u64,
    pub telemetry: Telemetry,
}

impl Report {
    pub fn collect(link: &DroneLink) -> Self {
        let state = link.command().snapshot();
        let stats = link.stats();
        Self {
            health: link.health(),
            connected: link.is_connected(),
            uptime_secs: stats.map(|s| s.uptime.as_secs_f64()).unwrap_or_default(),
            speed: state.speed,
            speed_mode: state.speed_mode().to_string(),
            send_errors: stats.map(|s| s.send_errors).unwrap_or_default(),
            video_frames: stats.map(|s| s.video_frames).unwrap_or_default(),
            telemetry: link.telemetry(),
        }
    }

    pub fn render_text(&self) -> String {
        let t = &self.telemetry;
        let mut line = format!(
            "{:<9} bat {:>3}% {:>4.1}V  alt {:>3}  hdg {:>3}  sig {:>3}  speed {}",
            self.health.to_string(),
            t.battery_pct,
            t.voltage,
            t.altitude,
            t.heading_degrees(),
            t.signal,
            self.speed_mode,
        );
        if t.is_flying() {
            line.push_str("  FLYING");
        }
        if t.is_calibrating() {
            line.push_str("  CALIBRATING");
        }
        if self.send_errors > 0 {
            line.push_str(&format!("  send_errors={}", self.send_errors));
        }
        line
    }
}

// ── PilotSession ─────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct PilotSession {
    link: DroneLink,
    session: SessionConfig,
    json: bool,
    running: Arc<AtomicBool>,
    battery: BatteryGuard,
    last_frame: Option<VideoFrame>,
}

impl PilotSession {
    pub fn new(config: &PilotConfig, json: bool) -> Result<Self, X80Error> {
        let link = DroneLink::new(config.to_link_config()?);
        let session = config.session.clone();
        Ok(Self {
            battery: BatteryGuard::new(session.low_battery_warning, session.auto_land_battery),
            link,
            session,
            json,
            running: Arc::new(AtomicBool::new(false)),
            last_frame: None,
        })
    }

    /// Handle that stops [`run`](Self::run) when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub async fn run(&mut self) -> Result<(), X80Error> {
        self.running.store(true, Ordering::SeqCst);

        let mut events = self.link.subscribe();
        let mut telemetry_rx = self.link.subscribe_telemetry();
        self.link.connect().await?;
        self.start_video_if_enabled().await;

        let mut lines = spawn_stdin_reader();
        let mut stdin_open = true;
        let report_every = self.session.telemetry_interval_ms;
        let mut ticker = tokio::time::interval(
            Duration::from_millis(report_every).max(MIN_REPORT_INTERVAL),
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("type `help` for commands");

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = Self::wait_for_stop(&self.running) => break,

                line = lines.recv(), if stdin_open => match line {
                    Some(line) => {
                        if self.handle_line(&line).await == Flow::Quit {
                            break;
                        }
                    }
                    None => {
                        debug!("stdin closed; console input disabled");
                        stdin_open = false;
                    }
                },

                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(n)) => debug!("skipped {n} link events"),
                    Err(RecvError::Closed) => break,
                },

                changed = telemetry_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let telemetry = telemetry_rx.borrow_and_update().clone();
                    self.check_battery(&telemetry);
                }

                _ = ticker.tick(), if report_every > 0 => self.print_report(),
            }
        }

        self.link.disconnect().await;
        self.running.store(false, Ordering::SeqCst);
        info!("session ended");
        Ok(())
    }

    // ── Console ──────────────────────────────────────────────────

    async fn handle_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        let cmd: ConsoleCommand = match line.parse() {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{e}");
                return Flow::Continue;
            }
        };

        if let Some(feedback) = cmd.apply(&self.link.command()) {
            println!("{feedback}");
            return Flow::Continue;
        }

        match cmd {
            ConsoleCommand::Video(on) => {
                let result = if on {
                    self.link.start_video().await
                } else {
                    self.link.stop_video().await
                };
                match result {
                    Ok(()) => println!("video {}", if on { "on" } else { "off" }),
                    Err(e) => println!("video command failed: {e}"),
                }
            }
            ConsoleCommand::SwitchCamera => {
                if let Err(e) = self.link.switch_camera().await {
                    println!("camera switch failed: {e}");
                }
            }
            ConsoleCommand::Photo => self.save_photo().await,
            ConsoleCommand::Status => self.print_report(),
            ConsoleCommand::Reconnect => self.reconnect().await,
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => return Flow::Quit,
            _ => {}
        }
        Flow::Continue
    }

    // ── Link events ──────────────────────────────────────────────

    async fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(frame) => self.last_frame = Some(frame),
            LinkEvent::Status(msg) => info!("{msg}"),
            LinkEvent::Health(ConnectionHealth::Lost) => {
                if self.session.auto_reconnect {
                    self.reconnect().await;
                } else {
                    warn!("connection lost; type `reconnect` to retry");
                }
            }
            LinkEvent::Health(health) => debug!(%health, "health changed"),
        }
    }

    async fn reconnect(&mut self) {
        self.last_frame = None;
        match self.link.reconnect().await {
            Ok(()) => self.start_video_if_enabled().await,
            Err(e) => error!("reconnect failed: {e}"),
        }
    }

    async fn start_video_if_enabled(&self) {
        if !self.session.video_on_connect {
            return;
        }
        if let Err(e) = self.link.start_video().await {
            warn!("could not start video: {e}");
        }
    }

    fn check_battery(&mut self, telemetry: &Telemetry) {
        match self.battery.check(telemetry) {
            Some(BatteryAction::Warn(pct)) => warn!("battery low: {pct}%"),
            Some(BatteryAction::Land(pct)) => {
                warn!("battery critical at {pct}%; landing");
                self.link.command().trigger(OneShot::Land);
            }
            None => {}
        }
    }

    // ── Output ───────────────────────────────────────────────────

    fn print_report(&self) {
        let report = Report::collect(&self.link);
        if self.json {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("could not serialize telemetry: {e}"),
            }
        } else {
            println!("{}", report.render_text());
        }
    }

    async fn save_photo(&self) {
        if let Err(e) = self.link.take_photo().await {
            debug!("take_photo: {e}");
        }
        let Some(frame) = &self.last_frame else {
            println!("no video frame received yet");
            return;
        };
        match write_snapshot(&self.session.photo_dir, frame).await {
            Ok(path) => println!("saved {}", path.display()),
            Err(e) => println!("could not save photo: {e}"),
        }
    }

    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Read stdin on a plain thread. A blocking read cannot be cancelled, so
/// it must not hold up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Write a frame as `x80_<unix-ms>_<frame_id>.jpg` under `dir`.
pub async fn write_snapshot(dir: &std::path::Path, frame: &VideoFrame) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let path = dir.join(format!("x80_{stamp}_{:03}.jpg", frame.frame_id));
    tokio::fs::write(&path, &frame.data).await?;
    Ok(path)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(id: u8, data: &[u8]) -> VideoFrame {
        VideoFrame {
            frame_id: id,
            data: data.to_vec().into(),
            fragments: 1,
            completed_at: Instant::now(),
        }
    }

    #[test]
    fn report_renders_flags_and_health() {
        let report = Report {
            health: ConnectionHealth::Unstable,
            connected: true,
            uptime_secs: 1.0,
            speed: 0.5,
            speed_mode: "MED".into(),
            send_errors: 2,
            video_frames: 0,
            telemetry: Telemetry {
                battery_pct: 67,
                voltage: 8.0,
                heading: 90.4,
                flags: x80_core::StatusFlags::FLYING,
                ..Telemetry::default()
            },
        };
        let text = report.render_text();
        assert!(text.starts_with("UNSTABLE"));
        assert!(text.contains("bat  67%  8.0V"));
        assert!(text.contains("hdg  90"));
        assert!(text.contains("FLYING"));
        assert!(text.contains("send_errors=2"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["health"], "Unstable");
        assert_eq!(json["telemetry"]["battery_pct"], 67);
    }

    #[tokio::test]
    async fn snapshot_is_written_under_photo_dir() {
        let dir = std::env::temp_dir().join(format!("x80-pilot-test-{}", std::process::id()));
        let path = write_snapshot(&dir, &frame(7, &[0xFF, 0xD8, 0xFF, 0xD9]))
            .await
            .unwrap();
        assert!(path.starts_with(&dir));
        assert!(path.to_string_lossy().ends_with("_007.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn link_commands_fail_softly_when_disconnected() {
        let mut cfg = PilotConfig::default();
        cfg.drone.ip = "127.0.0.1".into();
        let mut session = PilotSession::new(&cfg, false).unwrap();
        assert_eq!(session.handle_line("video on").await, Flow::Continue);
        assert_eq!(session.handle_line("takeoff").await, Flow::Continue);
        assert!(session.link.command().snapshot().takeoff);
        assert_eq!(session.handle_line("quit").await, Flow::Quit);
    }
}

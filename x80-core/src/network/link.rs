//! `DroneLink`: the collaborator-facing handle to one drone.
//!
//! A link owns at most one live session. A session is two bound sockets,
//! a fresh set of counters and the five loops spawned in one
//! [`TaskGroup`]. Everything published outward (the command handle, the
//! telemetry watch, the health watch, the event broadcast) outlives
//! sessions, so subscribers survive a reconnect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::X80Error;
use crate::network::config::LinkConfig;
use crate::network::event::LinkEvent;
use crate::network::loops::{
    LoopContext, control_loop, heartbeat_loop, receive_loop, video_loop, watchdog_loop,
};
use crate::network::stats::{LinkStats, LinkStatsSnapshot};
use crate::packet::AuxCommand;
use crate::state::command::CommandState;
use crate::state::health::ConnectionHealth;
use crate::task::TaskGroup;
use crate::telemetry::Telemetry;

/// Capacity of the event broadcast. Slow subscribers lag, they never
/// block the loops.
pub const EVENT_CAPACITY: usize = 64;

struct Session {
    group: TaskGroup,
    control: Arc<UdpSocket>,
    stats: Arc<LinkStats>,
    local_control: SocketAddr,
    local_video: SocketAddr,
}

pub struct DroneLink {
    config: LinkConfig,
    command: Arc<CommandState>,
    telemetry: Arc<watch::Sender<Telemetry>>,
    health: Arc<watch::Sender<ConnectionHealth>>,
    events: broadcast::Sender<LinkEvent>,
    connected: Arc<AtomicBool>,
    session: Option<Session>,
}

impl DroneLink {
    pub fn new(config: LinkConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            command: Arc::new(CommandState::new(config.one_shot_timeout)),
            telemetry: Arc::new(watch::channel(Telemetry::default()).0),
            health: Arc::new(watch::channel(ConnectionHealth::Connected).0),
            events,
            connected: Arc::new(AtomicBool::new(false)),
            session: None,
            config,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Bind both sockets and start the five loops.
    ///
    /// Does nothing when already connected. A session stopped by the
    /// watchdog is torn down first. If either bind fails nothing is
    /// started and the error is returned.
    pub async fn connect(&mut self) -> Result<(), X80Error> {
        if self.is_connected() {
            debug!("connect: already connected");
            return Ok(());
        }
        if self.session.is_some() {
            self.teardown().await;
        }

        let control = bind("control", self.config.local_control).await?;
        let video = bind("video", self.config.local_video).await?;
        let local_control = control.local_addr()?;
        let local_video = video.local_addr()?;

        let now = Instant::now();
        let stats = Arc::new(LinkStats::new(now));
        self.telemetry.send_modify(|t| {
            // Heading is dead-reckoned and survives a reconnect.
            let heading = t.heading;
            *t = Telemetry {
                heading,
                ..Telemetry::default()
            };
        });
        self.health.send_replace(ConnectionHealth::Connected);
        self.connected.store(true, Ordering::SeqCst);

        let ctx = Arc::new(LoopContext {
            config: self.config.clone(),
            command: self.command.clone(),
            telemetry: self.telemetry.clone(),
            health: self.health.clone(),
            events: self.events.clone(),
            connected: self.connected.clone(),
            stats: stats.clone(),
        });

        let mut group = TaskGroup::new();
        {
            let (ctx, sock) = (ctx.clone(), control.clone());
            group.spawn("control", move |stop| control_loop(ctx, sock, stop));
        }
        {
            let (ctx, sock) = (ctx.clone(), control.clone());
            group.spawn("heartbeat", move |stop| heartbeat_loop(ctx, sock, stop));
        }
        {
            let (ctx, sock) = (ctx.clone(), control.clone());
            group.spawn("receive", move |stop| receive_loop(ctx, sock, stop));
        }
        {
            let ctx = ctx.clone();
            group.spawn("video", move |stop| video_loop(ctx, video, stop));
        }
        group.spawn("watchdog", move |stop| watchdog_loop(ctx, stop));

        self.session = Some(Session {
            group,
            control,
            stats,
            local_control,
            local_video,
        });

        info!(
            drone = %self.config.drone_control_addr(),
            %local_control,
            %local_video,
            "connection established"
        );
        self.publish(LinkEvent::status("Connection established."));
        Ok(())
    }

    /// Stop every loop, wait for them, then release the sockets.
    /// Safe to call at any time, any number of times.
    pub async fn disconnect(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.teardown().await;
        info!("connection closed");
        self.publish(LinkEvent::status("Connection closed."));
    }

    /// Full teardown, a short pause, then a fresh session. Counters,
    /// decoder buffers and pending fragments all start over.
    pub async fn reconnect(&mut self) -> Result<(), X80Error> {
        info!("reconnecting");
        self.publish(LinkEvent::status("Reconnecting..."));
        self.disconnect().await;
        tokio::time::sleep(self.config.reconnect_pause).await;
        self.connect().await
    }

    async fn teardown(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut session) = self.session.take() {
            let report = session.group.shutdown(self.config.shutdown_grace).await;
            if !report.aborted.is_empty() || !report.panicked.is_empty() {
                warn!(
                    aborted = ?report.aborted,
                    panicked = ?report.panicked,
                    "session did not stop cleanly"
                );
            }
            // Loops are joined; dropping the session closes the sockets.
        }
    }

    // ── Auxiliary commands ───────────────────────────────────────

    /// Send a fire-once command. Returns `Ok(false)` for commands with no
    /// wire encoding.
    pub async fn send_aux(&self, cmd: AuxCommand) -> Result<bool, X80Error> {
        let session = self.live_session()?;
        let Some(bytes) = cmd.bytes() else {
            debug!(%cmd, "no wire command; ignoring");
            return Ok(false);
        };
        session
            .control
            .send_to(bytes, self.config.drone_control_addr())
            .await?;
        debug!(%cmd, "auxiliary command sent");
        Ok(true)
    }

    pub async fn start_video(&self) -> Result<(), X80Error> {
        self.send_aux(AuxCommand::VideoStart).await.map(|_| ())
    }

    pub async fn stop_video(&self) -> Result<(), X80Error> {
        self.send_aux(AuxCommand::VideoStop).await.map(|_| ())
    }

    /// No known wire command. Always succeeds without sending.
    pub async fn take_photo(&self) -> Result<(), X80Error> {
        debug!("take_photo: not supported by the drone");
        Ok(())
    }

    /// No known wire command. Always succeeds without sending.
    pub async fn switch_camera(&self) -> Result<(), X80Error> {
        debug!("switch_camera: not supported by the drone");
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────

    /// True while a session is running. Cleared by the watchdog on LOST.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> ConnectionHealth {
        *self.health.borrow()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.health.subscribe()
    }

    /// Copy of the latest telemetry.
    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.borrow().clone()
    }

    pub fn subscribe_telemetry(&self) -> watch::Receiver<Telemetry> {
        self.telemetry.subscribe()
    }

    /// Frames, status lines and health transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Shared flight-state handle. Writes take effect on the next tick.
    pub fn command(&self) -> Arc<CommandState> {
        self.command.clone()
    }

    /// Counters of the current session.
    pub fn stats(&self) -> Option<LinkStatsSnapshot> {
        self.session
            .as_ref()
            .map(|s| s.stats.snapshot(Instant::now()))
    }

    /// Bound local addresses `(control, video)` of the current session.
    pub fn local_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.session
            .as_ref()
            .map(|s| (s.local_control, s.local_video))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn live_session(&self) -> Result<&Session, X80Error> {
        match &self.session {
            Some(s) if self.is_connected() => Ok(s),
            _ => Err(X80Error::NotConnected),
        }
    }

    fn publish(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for DroneLink {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        // TaskGroup's own Drop cancels and aborts the loops.
    }
}

async fn bind(channel: &'static str, addr: SocketAddr) -> Result<Arc<UdpSocket>, X80Error> {
    UdpSocket::bind(addr)
        .await
        .map(Arc::new)
        .map_err(|source| X80Error::Bind {
            channel,
            addr,
            source,
        })
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback() -> LinkConfig {
        let any = SocketAddr::from(([127, 0, 0, 1], 0));
        LinkConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST)).with_local_addrs(any, any)
    }

    #[tokio::test]
    async fn aux_requires_a_session() {
        let link = DroneLink::new(loopback());
        assert!(matches!(
            link.send_aux(AuxCommand::VideoStart).await,
            Err(X80Error::NotConnected)
        ));
        assert!(link.take_photo().await.is_ok());
        assert!(link.switch_camera().await.is_ok());
    }

    #[tokio::test]
    async fn connect_and_disconnect_are_idempotent() {
        let mut link = DroneLink::new(loopback());
        let mut events = link.subscribe();

        link.connect().await.unwrap();
        let first = link.local_addrs().unwrap();
        link.connect().await.unwrap();
        assert_eq!(link.local_addrs().unwrap(), first);
        assert!(link.is_connected());

        link.disconnect().await;
        link.disconnect().await;
        assert!(!link.is_connected());
        assert!(link.local_addrs().is_none());

        let mut statuses = Vec::new();
        while let Ok(ev) = events.try_recv() {
            if let LinkEvent::Status(s) = ev {
                statuses.push(s);
            }
        }
        assert_eq!(statuses, vec!["Connection established.", "Connection closed."]);
    }

    #[tokio::test]
    async fn photo_and_camera_switch_are_not_sent() {
        let mut link = DroneLink::new(loopback());
        link.connect().await.unwrap();
        assert!(!link.send_aux(AuxCommand::TakePhoto).await.unwrap());
        assert!(!link.send_aux(AuxCommand::SwitchCamera).await.unwrap());
        link.disconnect().await;
    }

    #[tokio::test]
    async fn heading_survives_reconnect() {
        let mut cfg = loopback();
        cfg.reconnect_pause = std::time::Duration::from_millis(10);
        let mut link = DroneLink::new(cfg);
        link.telemetry.send_modify(|t| {
            t.heading = 123.0;
            t.battery_pct = 50;
        });

        link.connect().await.unwrap();
        assert_eq!(link.telemetry().heading, 123.0);
        assert_eq!(link.telemetry().battery_pct, 0);
        link.reconnect().await.unwrap();
        assert!(link.is_connected());
        link.disconnect().await;
    }
}

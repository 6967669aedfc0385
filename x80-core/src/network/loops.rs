//! The five duty cycles of a session.
//!
//! | Loop       | Period          | Socket  | Writes                         |
//! |------------|-----------------|---------|--------------------------------|
//! | control    | ~140 ms         | control | send errors, heading           |
//! | heartbeat  | ~1 s            | control | nothing                        |
//! | receive    | blocking recv   | control | telemetry, telemetry timestamp |
//! | video      | blocking recv   | video   | frames, frame timestamp        |
//! | watchdog   | ~3 s            | none    | health, connected flag         |
//!
//! Every loop checks the stop token at the top of each cycle and races it
//! against its sleep or receive, and every receive is bounded by
//! `recv_timeout`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{MAX_BUFFERED, TelemetryCodec};
use crate::header::HEARTBEAT;
use crate::network::config::LinkConfig;
use crate::network::event::LinkEvent;
use crate::network::stats::LinkStats;
use crate::packet::ControlFrame;
use crate::state::command::CommandState;
use crate::state::health::{ConnectionHealth, HealthMonitor};
use crate::telemetry::Telemetry;
use crate::video::FrameReassembler;

const CONTROL_RECV_BUF: usize = 2048;
const VIDEO_RECV_BUF: usize = 65536;

/// State shared by every loop of one session.
pub(crate) struct LoopContext {
    pub config: LinkConfig,
    pub command: Arc<CommandState>,
    pub telemetry: Arc<watch::Sender<Telemetry>>,
    pub health: Arc<watch::Sender<ConnectionHealth>>,
    pub events: broadcast::Sender<LinkEvent>,
    pub connected: Arc<AtomicBool>,
    pub stats: Arc<LinkStats>,
}

impl LoopContext {
    fn publish(&self, event: LinkEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

/// Sleep unless stopped first. Returns `false` when stopped.
async fn pause(stop: &CancellationToken, d: Duration) -> bool {
    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}

/// One bounded receive. `None` means stopped; `Some(None)` means the
/// timeout elapsed with nothing to read.
async fn recv_bounded(
    socket: &UdpSocket,
    buf: &mut [u8],
    timeout: Duration,
    stop: &CancellationToken,
) -> Option<Option<std::io::Result<(usize, SocketAddr)>>> {
    tokio::select! {
        _ = stop.cancelled() => None,
        r = tokio::time::timeout(timeout, socket.recv_from(buf)) => Some(r.ok()),
    }
}

// ── Control ──────────────────────────────────────────────────────

pub(crate) async fn control_loop(
    ctx: Arc<LoopContext>,
    socket: Arc<UdpSocket>,
    stop: CancellationToken,
) {
    let remote = ctx.config.drone_control_addr();
    let mut ticker = tokio::time::interval(ctx.config.control_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_heading_update = Instant::now();
    info!(%remote, "control loop started");

    while !stop.is_cancelled() {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let state = ctx.command.tick(now);
        let frame = ControlFrame::encode(&state);

        match socket.send_to(frame.as_ref(), remote).await {
            Ok(_) => {
                ctx.stats.send_succeeded();
                let dt = now.saturating_duration_since(last_heading_update);
                last_heading_update = now;
                let rate = state.sticks()[3] as f32 / 100.0 * ctx.config.max_yaw_rate;
                ctx.telemetry.send_modify(|t| t.advance_heading(rate, dt));
            }
            Err(e) => {
                let run = ctx.stats.send_failed();
                debug!(errors = run, "control send failed: {e}");
                if !pause(&stop, ctx.config.error_backoff).await {
                    break;
                }
            }
        }
    }
}

// ── Heartbeat ────────────────────────────────────────────────────

pub(crate) async fn heartbeat_loop(
    ctx: Arc<LoopContext>,
    socket: Arc<UdpSocket>,
    stop: CancellationToken,
) {
    let remote = ctx.config.drone_control_addr();
    let mut ticker = tokio::time::interval(ctx.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !stop.is_cancelled() {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match socket.send_to(&HEARTBEAT, remote).await {
            Ok(_) => ctx.stats.heartbeat_sent(),
            Err(e) => trace!("heartbeat send failed: {e}"),
        }
    }
}

// ── Receive ──────────────────────────────────────────────────────

pub(crate) async fn receive_loop(
    ctx: Arc<LoopContext>,
    socket: Arc<UdpSocket>,
    stop: CancellationToken,
) {
    let drone_ip = ctx.config.drone_ip;
    let mut buf = vec![0u8; CONTROL_RECV_BUF];
    let mut pending = BytesMut::with_capacity(MAX_BUFFERED);
    let mut codec = TelemetryCodec::new();

    while !stop.is_cancelled() {
        let Some(result) = recv_bounded(&socket, &mut buf, ctx.config.recv_timeout, &stop).await
        else {
            break;
        };
        let (len, from) = match result {
            None => continue,
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                ctx.stats.recv_failed();
                debug!("control recv failed: {e}");
                if !pause(&stop, ctx.config.error_backoff).await {
                    break;
                }
                continue;
            }
        };

        if from.ip() != drone_ip {
            trace!(%from, "ignoring datagram from unknown sender");
            continue;
        }

        pending.extend_from_slice(&buf[..len]);
        let readings = codec.drain(&mut pending);
        if readings.is_empty() {
            continue;
        }

        let now = Instant::now();
        ctx.telemetry.send_modify(|t| {
            for reading in &readings {
                t.apply(reading, now);
            }
        });
        ctx.stats.mark_telemetry(now, readings.len() as u64);
    }

    let stats = codec.stats();
    debug!(
        frames = stats.frames,
        skipped = stats.skipped_bytes,
        "receive loop stopped"
    );
}

// ── Video ────────────────────────────────────────────────────────

pub(crate) async fn video_loop(
    ctx: Arc<LoopContext>,
    socket: Arc<UdpSocket>,
    stop: CancellationToken,
) {
    let drone_ip = ctx.config.drone_ip;
    let mut buf = vec![0u8; VIDEO_RECV_BUF];
    let mut reassembler = FrameReassembler::new();

    while !stop.is_cancelled() {
        let Some(result) = recv_bounded(&socket, &mut buf, ctx.config.recv_timeout, &stop).await
        else {
            break;
        };
        let (len, from) = match result {
            None => continue,
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                ctx.stats.recv_failed();
                debug!("video recv failed: {e}");
                if !pause(&stop, ctx.config.error_backoff).await {
                    break;
                }
                continue;
            }
        };

        if from.ip() != drone_ip {
            trace!(%from, "ignoring video datagram from unknown sender");
            continue;
        }

        if let Some(frame) = reassembler.push_datagram(&buf[..len]) {
            ctx.stats.mark_frame(frame.completed_at);
            ctx.publish(LinkEvent::Frame(frame));
        }
    }

    let stats = reassembler.stats();
    debug!(
        emitted = stats.frames_emitted,
        dropped = stats.frames_dropped,
        purged = stats.frames_purged,
        late = stats.late_fragments,
        "video loop stopped"
    );
}

// ── Watchdog ─────────────────────────────────────────────────────

pub(crate) async fn watchdog_loop(ctx: Arc<LoopContext>, stop: CancellationToken) {
    let period = ctx.config.watchdog_interval;
    let mut monitor = HealthMonitor::new(ctx.config.stale_after, ctx.config.max_send_errors);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !stop.is_cancelled() {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let stats = &ctx.stats;
        let transition = monitor.observe(
            Instant::now(),
            stats.last_telemetry(),
            stats.last_frame(),
            stats.send_errors(),
        );

        if let Some(msg) = &transition.notification {
            match transition.next {
                ConnectionHealth::Connected => info!("{msg}"),
                _ => warn!("{msg}"),
            }
            ctx.health.send_replace(transition.next);
            ctx.publish(LinkEvent::Health(transition.next));
            ctx.publish(LinkEvent::status(msg.clone()));
        }

        if transition.disconnect {
            ctx.connected.store(false, Ordering::SeqCst);
            stop.cancel();
            break;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

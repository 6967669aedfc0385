//! Per-session counters shared by the loops.
//!
//! Timestamps are stored as milliseconds since the session started so
//! they fit in atomics. Both stream timestamps start at the session epoch,
//! which gives a fresh session the full stale window before it can be
//! flagged.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct LinkStats {
    epoch: Instant,
    last_telemetry_ms: AtomicU64,
    last_frame_ms: AtomicU64,
    send_errors: AtomicU32,
    control_frames_sent: AtomicU64,
    heartbeats_sent: AtomicU64,
    telemetry_frames: AtomicU64,
    video_frames: AtomicU64,
    recv_errors: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    pub uptime: Duration,
    pub since_telemetry: Duration,
    pub since_frame: Duration,
    pub send_errors: u32,
    pub control_frames_sent: u64,
    pub heartbeats_sent: u64,
    pub telemetry_frames: u64,
    pub video_frames: u64,
    pub recv_errors: u64,
}

impl LinkStats {
    pub fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            last_telemetry_ms: AtomicU64::new(0),
            last_frame_ms: AtomicU64::new(0),
            send_errors: AtomicU32::new(0),
            control_frames_sent: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            telemetry_frames: AtomicU64::new(0),
            video_frames: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
        }
    }

    fn offset_ms(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_millis() as u64
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    // ── Writers ──────────────────────────────────────────────────

    pub fn mark_telemetry(&self, at: Instant, frames: u64) {
        self.last_telemetry_ms
            .fetch_max(self.offset_ms(at), Ordering::Relaxed);
        self.telemetry_frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn mark_frame(&self, at: Instant) {
        self.last_frame_ms.fetch_max(self.offset_ms(at), Ordering::Relaxed);
        self.video_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// A control frame went out; the consecutive error run ends.
    pub fn send_succeeded(&self) {
        self.send_errors.store(0, Ordering::Relaxed);
        self.control_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A control send failed. Returns the length of the current run.
    pub fn send_failed(&self) -> u32 {
        self.send_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recv_failed(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
    }

    // ── Readers ──────────────────────────────────────────────────

    pub fn last_telemetry(&self) -> Instant {
        self.epoch + Duration::from_millis(self.last_telemetry_ms.load(Ordering::Relaxed))
    }

    pub fn last_frame(&self) -> Instant {
        self.epoch + Duration::from_millis(self.last_frame_ms.load(Ordering::Relaxed))
    }

    pub fn send_errors(&self) -> u32 {
        self.send_errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, now: Instant) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            uptime: now.saturating_duration_since(self.epoch),
            since_telemetry: now.saturating_duration_since(self.last_telemetry()),
            since_frame: now.saturating_duration_since(self.last_frame()),
            send_errors: self.send_errors(),
            control_frames_sent: self.control_frames_sent.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            telemetry_frames: self.telemetry_frames.load(Ordering::Relaxed),
            video_frames: self.video_frames.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_start_at_epoch_and_never_rewind() {
        let t0 = Instant::now();
        let stats = LinkStats::new(t0);
        assert_eq!(stats.last_telemetry(), t0);

        stats.mark_telemetry(t0 + Duration::from_secs(3), 1);
        stats.mark_telemetry(t0 + Duration::from_secs(1), 1);
        assert_eq!(stats.last_telemetry(), t0 + Duration::from_secs(3));
        assert_eq!(stats.snapshot(t0 + Duration::from_secs(4)).telemetry_frames, 2);
    }

    #[test]
    fn send_error_run_resets_on_success() {
        let stats = LinkStats::new(Instant::now());
        assert_eq!(stats.send_failed(), 1);
        assert_eq!(stats.send_failed(), 2);
        stats.send_succeeded();
        assert_eq!(stats.send_errors(), 0);
        assert_eq!(stats.send_failed(), 1);
    }
}

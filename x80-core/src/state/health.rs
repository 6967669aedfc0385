//! Link health state machine.
//!
//! The drone never acknowledges anything, so health is inferred from
//! three signals: how recently telemetry arrived, how recently a video
//! frame completed, and how many control sends have failed in a row.
//!
//! ```text
//!              stale, errors low            stale AND errors high
//!  Connected ────────────────────► Unstable ─────────────────────► Lost
//!      ▲                               │                            │
//!      └──────── fresh, errors low ────┴────────────────────────────┘
//! ```
//!
//! Notifications fire on edges only. The disconnect request on `Lost` is
//! level-triggered: every evaluation that lands on `Lost` asks for it.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Age after which a stream counts as stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

/// Consecutive send errors above which a stale link is declared lost.
pub const DEFAULT_MAX_SEND_ERRORS: u32 = 10;

// ── ConnectionHealth ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionHealth {
    #[default]
    Connected,
    Unstable,
    Lost,
}

impl std::fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "CONNECTED"),
            Self::Unstable => write!(f, "UNSTABLE"),
            Self::Lost => write!(f, "LOST"),
        }
    }
}

// ── Signals / Transition ─────────────────────────────────────────

/// Inputs to one health evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSignals {
    pub telemetry_fresh: bool,
    pub video_fresh: bool,
    pub send_errors: u32,
}

/// Result of one health evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionHealth,
    /// Set only when the state changed.
    pub notification: Option<String>,
    /// Set on every evaluation that ends in `Lost`.
    pub disconnect: bool,
}

/// Pure transition function.
pub fn evaluate(
    current: ConnectionHealth,
    signals: HealthSignals,
    max_send_errors: u32,
) -> Transition {
    let stale = !(signals.telemetry_fresh && signals.video_fresh);
    let errors_high = signals.send_errors > max_send_errors;

    let next = match (stale, errors_high) {
        (true, true) => ConnectionHealth::Lost,
        (false, false) => ConnectionHealth::Connected,
        _ => ConnectionHealth::Unstable,
    };

    let notification = (next != current).then(|| describe(next, signals));

    Transition {
        next,
        notification,
        disconnect: next == ConnectionHealth::Lost,
    }
}

fn describe(next: ConnectionHealth, s: HealthSignals) -> String {
    match next {
        ConnectionHealth::Connected => "Connection restored.".to_string(),
        ConnectionHealth::Unstable => {
            let what = match (s.telemetry_fresh, s.video_fresh) {
                (false, false) => "no telemetry or video",
                (false, true) => "no telemetry",
                (true, false) => "no video",
                (true, true) => "send errors",
            };
            format!("Connection unstable ({what}).")
        }
        ConnectionHealth::Lost => format!(
            "Connection lost ({} consecutive send errors).",
            s.send_errors
        ),
    }
}

// ── HealthMonitor ────────────────────────────────────────────────

/// Stateful wrapper that turns timestamps into [`HealthSignals`].
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    state: ConnectionHealth,
    stale_after: Duration,
    max_send_errors: u32,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER, DEFAULT_MAX_SEND_ERRORS)
    }
}

impl HealthMonitor {
    pub fn new(stale_after: Duration, max_send_errors: u32) -> Self {
        Self {
            state: ConnectionHealth::Connected,
            stale_after,
            max_send_errors,
        }
    }

    pub fn state(&self) -> ConnectionHealth {
        self.state
    }

    /// Back to `Connected`, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.state = ConnectionHealth::Connected;
    }

    /// Whether an update at `last` is still fresh at `now`.
    pub fn is_fresh(&self, last: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last) <= self.stale_after
    }

    /// Evaluate from the last telemetry and video timestamps.
    pub fn observe(
        &mut self,
        now: Instant,
        last_telemetry: Instant,
        last_video: Instant,
        send_errors: u32,
    ) -> Transition {
        let signals = HealthSignals {
            telemetry_fresh: self.is_fresh(last_telemetry, now),
            video_fresh: self.is_fresh(last_video, now),
            send_errors,
        };
        self.apply(signals)
    }

    /// Evaluate from precomputed signals.
    pub fn apply(&mut self, signals: HealthSignals) -> Transition {
        let transition = evaluate(self.state, signals, self.max_send_errors);
        self.state = transition.next;
        transition
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(telemetry_fresh: bool, video_fresh: bool, send_errors: u32) -> HealthSignals {
        HealthSignals {
            telemetry_fresh,
            video_fresh,
            send_errors,
        }
    }

    #[test]
    fn fresh_and_quiet_stays_connected() {
        let t = evaluate(ConnectionHealth::Connected, signals(true, true, 0), 10);
        assert_eq!(t.next, ConnectionHealth::Connected);
        assert!(t.notification.is_none());
        assert!(!t.disconnect);
    }

    #[test]
    fn stale_stream_is_unstable() {
        let t = evaluate(ConnectionHealth::Connected, signals(false, true, 3), 10);
        assert_eq!(t.next, ConnectionHealth::Unstable);
        assert!(t.notification.unwrap().contains("no telemetry"));
        assert!(!t.disconnect);

        let t = evaluate(ConnectionHealth::Connected, signals(true, false, 9), 10);
        assert_eq!(t.next, ConnectionHealth::Unstable);
    }

    #[test]
    fn stale_with_many_errors_is_lost() {
        let t = evaluate(ConnectionHealth::Unstable, signals(false, false, 11), 10);
        assert_eq!(t.next, ConnectionHealth::Lost);
        assert!(t.notification.is_some());
        assert!(t.disconnect);
    }

    #[test]
    fn threshold_is_exclusive() {
        let t = evaluate(ConnectionHealth::Unstable, signals(false, false, 10), 10);
        assert_eq!(t.next, ConnectionHealth::Unstable);
    }

    #[test]
    fn errors_alone_do_not_lose_the_link() {
        let t = evaluate(ConnectionHealth::Connected, signals(true, true, 50), 10);
        assert_eq!(t.next, ConnectionHealth::Unstable);
        assert!(!t.disconnect);
    }

    #[test]
    fn notifications_are_edge_triggered_disconnect_is_level() {
        let mut m = HealthMonitor::new(Duration::from_secs(5), 10);

        let first = m.apply(signals(false, true, 0));
        assert!(first.notification.is_some());
        let again = m.apply(signals(false, true, 0));
        assert!(again.notification.is_none());
        assert_eq!(m.state(), ConnectionHealth::Unstable);

        let lost = m.apply(signals(false, false, 12));
        assert!(lost.notification.is_some());
        assert!(lost.disconnect);
        let still_lost = m.apply(signals(false, false, 13));
        assert!(still_lost.notification.is_none());
        assert!(still_lost.disconnect);

        let back = m.apply(signals(true, true, 0));
        assert_eq!(back.next, ConnectionHealth::Connected);
        assert_eq!(back.notification.as_deref(), Some("Connection restored."));
    }

    #[test]
    fn observe_uses_stale_window() {
        let mut m = HealthMonitor::new(Duration::from_secs(5), 10);
        let t0 = Instant::now();

        let t = m.observe(t0 + Duration::from_secs(5), t0, t0, 0);
        assert_eq!(t.next, ConnectionHealth::Connected);

        let t = m.observe(t0 + Duration::from_millis(5001), t0, t0 + Duration::from_secs(4), 0);
        assert_eq!(t.next, ConnectionHealth::Unstable);

        let t = m.observe(t0 + Duration::from_secs(8), t0, t0, 11);
        assert_eq!(t.next, ConnectionHealth::Lost);
    }
}

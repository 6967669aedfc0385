//! Shared flight command state.
//!
//! Collaborators write sticks, toggles and one-shot triggers at any time;
//! the control loop reads one snapshot per tick. The whole record sits
//! behind a single lock held only for a copy, so a writer never stalls a
//! tick for longer than a struct copy.
//!
//! One-shot actions (takeoff, land, emergency stop, calibrate, flip) are
//! never acknowledged by the drone. Each trigger records when it was set
//! and [`CommandState::sweep`] clears it once the timeout has passed.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Default lifetime of a one-shot flag.
pub const DEFAULT_ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(1);

/// Stick and trim range.
pub const STICK_MIN: i32 = -100;
pub const STICK_MAX: i32 = 100;

// ── FlightState ──────────────────────────────────────────────────

/// Everything the control frame is computed from.
///
/// The stick setters clamp; encoding clamps again, so raw edits made
/// through [`CommandState::update`] still stay in range on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightState {
    pub roll: i32,
    pub pitch: i32,
    pub throttle: i32,
    pub yaw: i32,

    pub takeoff: bool,
    pub land: bool,
    pub emergency_stop: bool,
    pub calibrate: bool,
    pub flip: bool,

    pub light: bool,
    pub headless: bool,
    pub cam_up: bool,
    pub cam_down: bool,

    /// Speed preference in `0.0..=1.0`.
    pub speed: f32,

    pub trim_roll: i32,
    pub trim_pitch: i32,
    pub trim_yaw: i32,
}

impl Default for FlightState {
    fn default() -> Self {
        Self {
            roll: 0,
            pitch: 0,
            throttle: 0,
            yaw: 0,
            takeoff: false,
            land: false,
            emergency_stop: false,
            calibrate: false,
            flip: false,
            light: false,
            headless: false,
            cam_up: false,
            cam_down: false,
            speed: 0.5,
            trim_roll: 0,
            trim_pitch: 0,
            trim_yaw: 0,
        }
    }
}

impl FlightState {
    /// Roll, pitch, throttle and yaw as they go on the wire, each clamped
    /// to the stick range. Trims are operator bookkeeping and are not
    /// folded in.
    pub fn sticks(&self) -> [i32; 4] {
        [self.roll, self.pitch, self.throttle, self.yaw].map(clamp_stick)
    }

    /// Coarse label for the speed preference.
    pub fn speed_mode(&self) -> SpeedMode {
        SpeedMode::from_level(self.speed)
    }

    fn one_shot_mut(&mut self, action: OneShot) -> &mut bool {
        match action {
            OneShot::Takeoff => &mut self.takeoff,
            OneShot::Land => &mut self.land,
            OneShot::EmergencyStop => &mut self.emergency_stop,
            OneShot::Calibrate => &mut self.calibrate,
            OneShot::Flip => &mut self.flip,
        }
    }

    /// Whether the given one-shot flag is currently raised.
    pub fn one_shot(&self, action: OneShot) -> bool {
        match action {
            OneShot::Takeoff => self.takeoff,
            OneShot::Land => self.land,
            OneShot::EmergencyStop => self.emergency_stop,
            OneShot::Calibrate => self.calibrate,
            OneShot::Flip => self.flip,
        }
    }
}

/// Clamp a stick or trim value into `-100..=100`.
pub fn clamp_stick(value: i32) -> i32 {
    value.clamp(STICK_MIN, STICK_MAX)
}

// ── OneShot ──────────────────────────────────────────────────────

/// Actions that raise a flag for a bounded window only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OneShot {
    Takeoff,
    Land,
    EmergencyStop,
    Calibrate,
    Flip,
}

const ONE_SHOT_COUNT: usize = 5;

impl OneShot {
    pub const ALL: [OneShot; ONE_SHOT_COUNT] = [
        OneShot::Takeoff,
        OneShot::Land,
        OneShot::EmergencyStop,
        OneShot::Calibrate,
        OneShot::Flip,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for OneShot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Takeoff => write!(f, "takeoff"),
            Self::Land => write!(f, "land"),
            Self::EmergencyStop => write!(f, "emergency stop"),
            Self::Calibrate => write!(f, "calibrate"),
            Self::Flip => write!(f, "flip"),
        }
    }
}

// ── Small enums ──────────────────────────────────────────────────

/// Camera gimbal tilt command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraTilt {
    Up,
    Down,
    Stop,
}

/// Trim axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimAxis {
    Roll,
    Pitch,
    Yaw,
}

/// Speed bucket shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedMode {
    Low,
    Medium,
    High,
}

impl SpeedMode {
    pub fn from_level(level: f32) -> Self {
        if level < 0.33 {
            Self::Low
        } else if level < 0.66 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl std::fmt::Display for SpeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MED"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

// ── CommandState ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    state: FlightState,
    raised_at: [Option<Instant>; ONE_SHOT_COUNT],
}

/// Thread-safe flight state shared between collaborators and the
/// control loop.
#[derive(Debug)]
pub struct CommandState {
    inner: Mutex<Inner>,
    one_shot_timeout: Duration,
}

impl Default for CommandState {
    fn default() -> Self {
        Self::new(DEFAULT_ONE_SHOT_TIMEOUT)
    }
}

impl CommandState {
    pub fn new(one_shot_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            one_shot_timeout,
        }
    }

    pub fn one_shot_timeout(&self) -> Duration {
        self.one_shot_timeout
    }

    // A panicking writer cannot leave the record half-written: every
    // mutation is a plain field store.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> FlightState {
        self.lock().state
    }

    /// Apply an arbitrary edit to the state. One-shot flags raised this
    /// way do not expire; use [`trigger`](Self::trigger) for those.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut FlightState),
    {
        f(&mut self.lock().state);
    }

    // ── Sticks ───────────────────────────────────────────────────

    /// Set all four sticks at once. Values are clamped to `-100..=100`.
    pub fn set_sticks(&self, roll: i32, pitch: i32, throttle: i32, yaw: i32) {
        let mut inner = self.lock();
        inner.state.roll = clamp_stick(roll);
        inner.state.pitch = clamp_stick(pitch);
        inner.state.throttle = clamp_stick(throttle);
        inner.state.yaw = clamp_stick(yaw);
    }

    pub fn set_roll(&self, value: i32) {
        self.lock().state.roll = clamp_stick(value);
    }

    pub fn set_pitch(&self, value: i32) {
        self.lock().state.pitch = clamp_stick(value);
    }

    pub fn set_throttle(&self, value: i32) {
        self.lock().state.throttle = clamp_stick(value);
    }

    pub fn set_yaw(&self, value: i32) {
        self.lock().state.yaw = clamp_stick(value);
    }

    /// Center all four sticks.
    pub fn neutralize_sticks(&self) {
        self.set_sticks(0, 0, 0, 0);
    }

    /// Nudge a trim by `delta`, returning the new clamped value.
    pub fn adjust_trim(&self, axis: TrimAxis, delta: i32) -> i32 {
        let mut inner = self.lock();
        let trim = match axis {
            TrimAxis::Roll => &mut inner.state.trim_roll,
            TrimAxis::Pitch => &mut inner.state.trim_pitch,
            TrimAxis::Yaw => &mut inner.state.trim_yaw,
        };
        *trim = clamp_stick(trim.saturating_add(delta));
        *trim
    }

    // ── Toggles ──────────────────────────────────────────────────

    /// Flip the light and return its new value.
    pub fn toggle_light(&self) -> bool {
        let mut inner = self.lock();
        inner.state.light = !inner.state.light;
        inner.state.light
    }

    /// Flip headless mode and return its new value.
    pub fn toggle_headless(&self) -> bool {
        let mut inner = self.lock();
        inner.state.headless = !inner.state.headless;
        inner.state.headless
    }

    pub fn set_camera_tilt(&self, tilt: CameraTilt) {
        let mut inner = self.lock();
        let (up, down) = match tilt {
            CameraTilt::Up => (true, false),
            CameraTilt::Down => (false, true),
            CameraTilt::Stop => (false, false),
        };
        inner.state.cam_up = up;
        inner.state.cam_down = down;
    }

    pub fn set_speed(&self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.lock().state.speed = level;
    }

    // ── One-shots ────────────────────────────────────────────────

    /// Raise a one-shot flag now.
    pub fn trigger(&self, action: OneShot) {
        self.trigger_at(action, Instant::now());
    }

    /// Raise a one-shot flag with an explicit timestamp (useful for
    /// testing). Re-triggering restarts the window.
    pub fn trigger_at(&self, action: OneShot, now: Instant) {
        let mut inner = self.lock();
        *inner.state.one_shot_mut(action) = true;
        inner.raised_at[action.index()] = Some(now);
    }

    pub fn takeoff(&self) {
        self.trigger(OneShot::Takeoff);
    }

    pub fn land(&self) {
        self.trigger(OneShot::Land);
    }

    pub fn emergency_stop(&self) {
        self.trigger(OneShot::EmergencyStop);
    }

    pub fn calibrate(&self) {
        self.trigger(OneShot::Calibrate);
    }

    pub fn flip(&self) {
        self.trigger(OneShot::Flip);
    }

    /// Clear every one-shot flag raised more than the timeout before
    /// `now`. Returns the actions that expired.
    pub fn sweep(&self, now: Instant) -> Vec<OneShot> {
        let timeout = self.one_shot_timeout;
        let mut inner = self.lock();
        let mut expired = Vec::new();
        for action in OneShot::ALL {
            let Some(raised) = inner.raised_at[action.index()] else {
                continue;
            };
            if now.saturating_duration_since(raised) > timeout {
                inner.raised_at[action.index()] = None;
                *inner.state.one_shot_mut(action) = false;
                expired.push(action);
            }
        }
        expired
    }

    /// Expiry sweep followed by a snapshot. The control loop runs this
    /// once per tick.
    pub fn tick(&self, now: Instant) -> FlightState {
        self.sweep(now);
        self.snapshot()
    }
}

// ── Tests ────────────────────────────────────────────────────────

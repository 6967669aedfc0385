//! Outbound frames: the periodic control frame and one-off auxiliary
//! commands.
//!
//! ## Control frame (20 bytes)
//! ```text
//! 0      header      0x66
//! 1      length      20
//! 2..=5  roll, pitch, throttle, yaw   round((v + 100) / 200 * 255)
//! 6      action flags   (ActionFlags)
//! 7      mode flags     (ModeFlags, bit 1 always set)
//! 8..=17 reserved, zero
//! 18     XOR of bytes 2..=17
//! 19     tail        0x99
//! ```

use crate::flags::{ActionFlags, ModeFlags};
use crate::header::{AUX_PREFIX, CONTROL_FRAME_LEN, FRAME_HEADER, FRAME_TAIL, xor_checksum};
use crate::state::command::{FlightState, clamp_stick};

// ── ControlFrame ─────────────────────────────────────────────────

/// One encoded control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame([u8; CONTROL_FRAME_LEN]);

impl ControlFrame {
    /// Encode a flight state. Pure: the same state always yields the same
    /// bytes.
    pub fn encode(state: &FlightState) -> Self {
        let mut buf = [0u8; CONTROL_FRAME_LEN];
        buf[0] = FRAME_HEADER;
        buf[1] = CONTROL_FRAME_LEN as u8;
        for (slot, value) in buf[2..6].iter_mut().zip(state.sticks()) {
            *slot = scale_stick(value);
        }
        buf[6] = action_flags(state).bits();
        buf[7] = mode_flags(state).bits();
        buf[18] = xor_checksum(&buf[2..18]);
        buf[19] = FRAME_TAIL;
        Self(buf)
    }

    /// Wrap received bytes. `None` unless exactly one frame long; the
    /// checksum is not checked here, see [`is_valid`](Self::is_valid).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; CONTROL_FRAME_LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; CONTROL_FRAME_LEN] {
        &self.0
    }

    pub fn checksum(&self) -> u8 {
        self.0[18]
    }

    /// Whether byte 18 matches the XOR of the payload bytes.
    pub fn is_valid(&self) -> bool {
        self.0[0] == FRAME_HEADER
            && self.0[19] == FRAME_TAIL
            && xor_checksum(&self.0[2..18]) == self.0[18]
    }

    pub fn actions(&self) -> ActionFlags {
        ActionFlags::from_bits_retain(self.0[6])
    }

    pub fn modes(&self) -> ModeFlags {
        ModeFlags::from_bits_retain(self.0[7])
    }
}

impl AsRef<[u8]> for ControlFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Map a stick value in `-100..=100` onto `0..=255`.
pub fn scale_stick(value: i32) -> u8 {
    let v = clamp_stick(value) as f32;
    ((v + 100.0) / 200.0 * 255.0).round() as u8
}

/// Inverse of [`scale_stick`], up to one quantization step.
pub fn unscale_stick(byte: u8) -> i32 {
    (byte as f32 / 255.0 * 200.0 - 100.0).round() as i32
}

fn action_flags(state: &FlightState) -> ActionFlags {
    let mut flags = ActionFlags::empty();
    flags.set(ActionFlags::TAKEOFF, state.takeoff);
    flags.set(ActionFlags::EMERGENCY_STOP, state.emergency_stop);
    flags.set(ActionFlags::CALIBRATE, state.calibrate);
    flags.set(ActionFlags::FLIP, state.flip);
    flags.set(ActionFlags::LIGHT, state.light);
    flags.set(ActionFlags::LAND, state.land);
    flags
}

fn mode_flags(state: &FlightState) -> ModeFlags {
    let mut flags = ModeFlags::ALWAYS_ON;
    flags.set(ModeFlags::HEADLESS, state.headless);
    flags.set(ModeFlags::CAM_UP, state.cam_up);
    flags.set(ModeFlags::CAM_DOWN, state.cam_down);
    flags
}

// ── AuxCommand ───────────────────────────────────────────────────

/// Fire-once commands outside the control frame.
///
/// The byte sequences were captured from the vendor app; their inner
/// structure is unknown, so they are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxCommand {
    VideoStart,
    VideoStop,
    /// No known wire command.
    TakePhoto,
    /// No known wire command.
    SwitchCamera,
}

const VIDEO_START: [u8; 7] = [AUX_PREFIX[0], AUX_PREFIX[1], 0x01, 0x82, 0x02, 0x36, 0xB7];
const VIDEO_STOP: [u8; 7] = [AUX_PREFIX[0], AUX_PREFIX[1], 0x01, 0x82, 0x02, 0x37, 0xB6];

impl AuxCommand {
    /// Bytes to put on the wire, or `None` when the action has no known
    /// encoding and must be a no-op.
    pub fn bytes(self) -> Option<&'static [u8]> {
        match self {
            Self::VideoStart => Some(&VIDEO_START),
            Self::VideoStop => Some(&VIDEO_STOP),
            Self::TakePhoto | Self::SwitchCamera => None,
        }
    }
}

impl std::fmt::Display for AuxCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VideoStart => write!(f, "video start"),
            Self::VideoStop => write!(f, "video stop"),
            Self::TakePhoto => write!(f, "take photo"),
            Self::SwitchCamera => write!(f, "switch camera"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

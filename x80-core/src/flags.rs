//! Bit layouts of the control frame flag bytes and the telemetry status byte.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Control frame byte 6.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ActionFlags: u8 {
        const TAKEOFF        = 1 << 0;
        const EMERGENCY_STOP = 1 << 1;
        const CALIBRATE      = 1 << 2;
        const FLIP           = 1 << 3;
        const LIGHT          = 1 << 4;
        const LAND           = 1 << 7;
    }
}

bitflags! {
    /// Control frame byte 7. `ALWAYS_ON` is set in every frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u8 {
        const HEADLESS  = 1 << 0;
        const ALWAYS_ON = 1 << 1;
        const CAM_UP    = 1 << 4;
        const CAM_DOWN  = 1 << 5;
    }
}

impl Default for ModeFlags {
    fn default() -> Self {
        ModeFlags::ALWAYS_ON
    }
}

bitflags! {
    /// Telemetry status byte, common to both formats.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct StatusFlags: u8 {
        const FLYING      = 1 << 0;
        const CALIBRATING = 1 << 1;
        const LOW_BATTERY = 1 << 2;
        const HEADLESS    = 1 << 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags_default_keeps_reserved_bit() {
        assert_eq!(ModeFlags::default().bits(), 0b0000_0010);
    }

    #[test]
    fn unknown_status_bits_are_kept() {
        let flags = StatusFlags::from_bits_retain(0b1000_0001);
        assert!(flags.contains(StatusFlags::FLYING));
        assert_eq!(flags.bits(), 0b1000_0001);
    }
}

//! Low-battery guard.
//!
//! Fires a warning once when the pack crosses the warning level and a
//! single landing request when it crosses the auto-land level while
//! airborne. Both re-arm once the reading climbs back above the level,
//! which happens after a pack swap.

use x80_core::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryAction {
    Warn(u8),
    Land(u8),
}

#[derive(Debug, Clone)]
pub struct BatteryGuard {
    warn_at: u8,
    land_at: u8,
    warned: bool,
    landed: bool,
}

impl BatteryGuard {
    /// A level of 0 disables that check.
    pub fn new(warn_at: u8, land_at: u8) -> Self {
        Self {
            warn_at,
            land_at,
            warned: false,
            landed: false,
        }
    }

    pub fn check(&mut self, telemetry: &Telemetry) -> Option<BatteryAction> {
        // Nothing decoded yet; 0 % is the placeholder, not a reading.
        if telemetry.packets == 0 {
            return None;
        }
        let pct = telemetry.battery_pct;

        if pct > self.land_at {
            self.landed = false;
        }
        if pct > self.warn_at {
            self.warned = false;
        }

        if self.land_at > 0 && pct <= self.land_at && telemetry.is_flying() && !self.landed {
            self.landed = true;
            self.warned = true;
            return Some(BatteryAction::Land(pct));
        }
        if self.warn_at > 0 && pct <= self.warn_at && !self.warned {
            self.warned = true;
            return Some(BatteryAction::Warn(pct));
        }
        None
    }
}

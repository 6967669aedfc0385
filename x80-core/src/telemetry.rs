//! Inbound telemetry: the two frame layouts and the published snapshot.
//!
//! ## Format 1 (10 bytes)
//! ```text
//! 0      header      0x66
//! 1      voltage x 10
//! 2      altitude
//! 3      signal
//! 4      status flags
//! 5..=8  reserved
//! 9      XOR of bytes 1..=8
//! ```
//!
//! ## Format 2 (15 bytes)
//! ```text
//! 0      header      0x66
//! 1      marker      0x0F
//! 2      reserved
//! 3      battery %
//! 4      altitude
//! 5      signal
//! 6      status flags
//! 7      voltage x 10
//! 8..=12 reserved
//! 13     XOR of bytes 2..=12
//! 14     tail        0x99
//! ```
//!
//! Both decoders return `None` for anything that does not validate.
//! Callers drop such frames without touching the published snapshot.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::flags::StatusFlags;
use crate::header::{
    FRAME_HEADER, FRAME_TAIL, TELEMETRY_V1_LEN, TELEMETRY_V2_LEN, TELEMETRY_V2_MARKER,
    xor_checksum,
};

/// Pack voltage read as 0 %.
pub const BATTERY_EMPTY_VOLTS: f32 = 7.2;
/// Pack voltage read as 100 %.
pub const BATTERY_FULL_VOLTS: f32 = 8.4;

// ── TelemetryFormat ──────────────────────────────────────────────

/// Which wire layout a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryFormat {
    /// 10-byte frame, battery derived from voltage.
    V1,
    /// 15-byte frame, battery reported directly.
    V2,
}

impl TelemetryFormat {
    pub fn frame_len(self) -> usize {
        match self {
            Self::V1 => TELEMETRY_V1_LEN,
            Self::V2 => TELEMETRY_V2_LEN,
        }
    }

    /// Format announced by the byte after the header.
    pub fn from_lookahead(byte: u8) -> Self {
        if byte == TELEMETRY_V2_MARKER {
            Self::V2
        } else {
            Self::V1
        }
    }

    /// The other layout, tried when the announced one does not validate.
    pub fn other(self) -> Self {
        match self {
            Self::V1 => Self::V2,
            Self::V2 => Self::V1,
        }
    }

    /// Decode exactly one frame of this format from the front of `bytes`.
    pub fn decode(self, bytes: &[u8]) -> Option<TelemetryReading> {
        match self {
            Self::V1 => decode_v1(bytes),
            Self::V2 => decode_v2(bytes),
        }
    }
}

// ── TelemetryReading ─────────────────────────────────────────────

/// The fields carried by one valid telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub format: TelemetryFormat,
    pub battery_pct: u8,
    pub voltage: f32,
    pub altitude: u8,
    pub signal: u8,
    pub flags: StatusFlags,
}

/// Battery percentage from pack voltage, linear between
/// [`BATTERY_EMPTY_VOLTS`] and [`BATTERY_FULL_VOLTS`] (a 2S pack), rounded
/// and clamped to `0..=100`.
///
/// The published affine curve `160.7142 * V - 517.8571` is not used: it
/// gives 768 % at 8.0 V, contradicting the documented 8.0 V => 67 % anchor.
/// The 7.2 V to 8.4 V line hits that anchor (66.67, rounded to 67).
pub fn battery_from_voltage(voltage: f32) -> u8 {
    let span = BATTERY_FULL_VOLTS - BATTERY_EMPTY_VOLTS;
    let pct = ((voltage - BATTERY_EMPTY_VOLTS) / span * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

fn decode_v1(bytes: &[u8]) -> Option<TelemetryReading> {
    let frame = bytes.get(..TELEMETRY_V1_LEN)?;
    if frame[0] != FRAME_HEADER || xor_checksum(&frame[1..9]) != frame[9] {
        return None;
    }
    let voltage = frame[1] as f32 / 10.0;
    Some(TelemetryReading {
        format: TelemetryFormat::V1,
        battery_pct: battery_from_voltage(voltage),
        voltage,
        altitude: frame[2],
        signal: frame[3],
        flags: StatusFlags::from_bits_retain(frame[4]),
    })
}

fn decode_v2(bytes: &[u8]) -> Option<TelemetryReading> {
    let frame = bytes.get(..TELEMETRY_V2_LEN)?;
    if frame[0] != FRAME_HEADER
        || frame[1] != TELEMETRY_V2_MARKER
        || frame[14] != FRAME_TAIL
        || xor_checksum(&frame[2..13]) != frame[13]
    {
        return None;
    }
    Some(TelemetryReading {
        format: TelemetryFormat::V2,
        battery_pct: frame[3].min(100),
        voltage: frame[7] as f32 / 10.0,
        altitude: frame[4],
        signal: frame[5],
        flags: StatusFlags::from_bits_retain(frame[6]),
    })
}

// ── Telemetry ────────────────────────────────────────────────────

/// Latest known drone state, as published to collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub battery_pct: u8,
    pub voltage: f32,
    pub altitude: u8,
    /// Dead-reckoned heading in `[0, 360)`. Not measured by the drone.
    pub heading: f32,
    pub signal: u8,
    pub flags: StatusFlags,
    /// Layout of the most recent frame, `None` before the first one.
    pub format: Option<TelemetryFormat>,
    /// Frames decoded this session.
    pub packets: u64,
    #[serde(skip)]
    pub last_update: Option<Instant>,
}

impl Telemetry {
    /// Merge a decoded reading. `last_update` never moves backwards.
    pub fn apply(&mut self, reading: &TelemetryReading, now: Instant) {
        self.battery_pct = reading.battery_pct;
        self.voltage = reading.voltage;
        self.altitude = reading.altitude;
        self.signal = reading.signal;
        self.flags = reading.flags;
        self.format = Some(reading.format);
        self.packets += 1;
        self.last_update = Some(match self.last_update {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }

    /// Integrate a yaw rate (degrees per second) over `dt`.
    pub fn advance_heading(&mut self, yaw_rate_dps: f32, dt: Duration) {
        let next = self.heading + yaw_rate_dps * dt.as_secs_f32();
        self.heading = next.rem_euclid(360.0);
        // rem_euclid can round up to exactly 360.0 for tiny negatives.
        if self.heading >= 360.0 {
            self.heading = 0.0;
        }
    }

    /// Heading rounded down to whole degrees, `0..=359`.
    pub fn heading_degrees(&self) -> u16 {
        (self.heading as u16).min(359)
    }

    pub fn is_flying(&self) -> bool {
        self.flags.contains(StatusFlags::FLYING)
    }

    pub fn is_calibrating(&self) -> bool {
        self.flags.contains(StatusFlags::CALIBRATING)
    }

    /// Time since the last decoded frame.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_update.map(|t| now.saturating_duration_since(t))
    }
}

// ── Test helpers ─────────────────────────────────────────────────

/// Build a valid format 1 frame. Exposed for tests and simulators.
pub fn encode_v1(voltage_raw: u8, altitude: u8, signal: u8, flags: StatusFlags) -> [u8; TELEMETRY_V1_LEN] {
    let mut buf = [0u8; TELEMETRY_V1_LEN];
    buf[0] = FRAME_HEADER;
    buf[1] = voltage_raw;
    buf[2] = altitude;
    buf[3] = signal;
    buf[4] = flags.bits();
    buf[9] = xor_checksum(&buf[1..9]);
    buf
}

/// Build a valid format 2 frame. Exposed for tests and simulators.
pub fn encode_v2(
    battery_pct: u8,
    voltage_raw: u8,
    altitude: u8,
    signal: u8,
    flags: StatusFlags,
) -> [u8; TELEMETRY_V2_LEN] {
    let mut buf = [0u8; TELEMETRY_V2_LEN];
    buf[0] = FRAME_HEADER;
    buf[1] = TELEMETRY_V2_MARKER;
    buf[3] = battery_pct;
    buf[4] = altitude;
    buf[5] = signal;
    buf[6] = flags.bits();
    buf[7] = voltage_raw;
    buf[13] = xor_checksum(&buf[2..13]);
    buf[14] = FRAME_TAIL;
    buf
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_battery_from_eight_volts() {
        let frame = encode_v1(80, 12, 90, StatusFlags::FLYING);
        let reading = TelemetryFormat::V1.decode(&frame).unwrap();
        assert_eq!(reading.battery_pct, 67);
        assert!((reading.voltage - 8.0).abs() < f32::EPSILON);
        assert_eq!(reading.altitude, 12);
        assert_eq!(reading.signal, 90);
        assert!(reading.flags.contains(StatusFlags::FLYING));
    }

    #[test]
    fn v1_battery_clamps() {
        assert_eq!(battery_from_voltage(8.0), 67);
        assert_eq!(battery_from_voltage(7.2), 0);
        assert_eq!(battery_from_voltage(6.0), 0);
        assert_eq!(battery_from_voltage(9.0), 100);
        assert_eq!(battery_from_voltage(8.4), 100);
    }

    #[test]
    fn v2_battery_is_direct() {
        let frame = encode_v2(45, 76, 3, 70, StatusFlags::empty());
        let reading = TelemetryFormat::V2.decode(&frame).unwrap();
        assert_eq!(reading.battery_pct, 45);
        assert_eq!(reading.format, TelemetryFormat::V2);
        assert!((reading.voltage - 7.6).abs() < 1e-5);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let mut v1 = encode_v1(80, 0, 0, StatusFlags::empty());
        v1[9] ^= 0xFF;
        assert!(TelemetryFormat::V1.decode(&v1).is_none());

        let mut v2 = encode_v2(45, 80, 0, 0, StatusFlags::empty());
        v2[13] ^= 0x01;
        assert!(TelemetryFormat::V2.decode(&v2).is_none());
    }

    #[test]
    fn v2_needs_tail() {
        let mut v2 = encode_v2(45, 80, 0, 0, StatusFlags::empty());
        v2[14] = 0x00;
        assert!(TelemetryFormat::V2.decode(&v2).is_none());
    }

    #[test]
    fn short_input_is_rejected() {
        let v1 = encode_v1(80, 0, 0, StatusFlags::empty());
        assert!(TelemetryFormat::V1.decode(&v1[..9]).is_none());
    }

    #[test]
    fn lookahead_selects_format() {
        assert_eq!(TelemetryFormat::from_lookahead(0x0F), TelemetryFormat::V2);
        assert_eq!(TelemetryFormat::from_lookahead(80), TelemetryFormat::V1);
    }

    #[test]
    fn apply_counts_and_timestamps() {
        let mut t = Telemetry::default();
        let now = Instant::now();
        let reading = TelemetryFormat::V2
            .decode(&encode_v2(45, 80, 5, 60, StatusFlags::CALIBRATING))
            .unwrap();
        t.apply(&reading, now);
        assert_eq!(t.packets, 1);
        assert_eq!(t.last_update, Some(now));
        assert!(t.is_calibrating());

        // Older timestamp does not rewind last_update.
        t.apply(&reading, now - Duration::from_secs(1));
        assert_eq!(t.last_update, Some(now));
        assert_eq!(t.packets, 2);
    }

    #[test]
    fn heading_wraps_both_ways() {
        let mut t = Telemetry::default();
        t.advance_heading(90.0, Duration::from_secs(5));
        assert!((t.heading - 90.0).abs() < 1e-3);

        t.advance_heading(-90.0, Duration::from_secs(2));
        assert!((t.heading - 270.0).abs() < 1e-3);
        assert_eq!(t.heading_degrees(), 270);
    }

    #[test]
    fn telemetry_serializes_without_timestamp() {
        let mut t = Telemetry::default();
        t.battery_pct = 50;
        t.last_update = Some(Instant::now());
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"battery_pct\":50"));
        assert!(!json.contains("last_update"));
    }
}

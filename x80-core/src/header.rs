//! Wire constants shared by every X80 frame layout.

/// First byte of control frames and of both telemetry formats.
pub const FRAME_HEADER: u8 = 0x66;

/// Last byte of control frames and of telemetry format 2.
pub const FRAME_TAIL: u8 = 0x99;

/// Total length of a control frame.
pub const CONTROL_FRAME_LEN: usize = 20;

/// Total length of a telemetry format 1 frame.
pub const TELEMETRY_V1_LEN: usize = 10;

/// Total length of a telemetry format 2 frame.
pub const TELEMETRY_V2_LEN: usize = 15;

/// Byte following the header that announces telemetry format 2.
pub const TELEMETRY_V2_MARKER: u8 = TELEMETRY_V2_LEN as u8;

/// Keepalive datagram sent on the control channel.
pub const HEARTBEAT: [u8; 1] = [0x00];

/// Magic prefix of every auxiliary command.
pub const AUX_PREFIX: [u8; 2] = [0xCC, 0x5A];

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// XOR of every byte in `bytes`.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

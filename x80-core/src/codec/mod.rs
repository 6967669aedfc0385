//! Resynchronising telemetry decoder over the inbound control-channel
//! byte stream.
//!
//! Datagram boundaries are not trusted: bytes are appended to one buffer
//! and frames are carved out of it. The decoder never fails. Garbage is
//! dropped, short frames wait for more bytes, and a candidate that fails
//! validation costs one byte before the next header scan.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::error::X80Error;
use crate::header::FRAME_HEADER;
use crate::telemetry::{TelemetryFormat, TelemetryReading};

/// Upper bound on buffered, not-yet-decoded bytes.
pub const MAX_BUFFERED: usize = 4096;

/// Counters for what the decoder threw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames: u64,
    pub skipped_bytes: u64,
    pub overflows: u64,
}

#[derive(Debug, Default)]
pub struct TelemetryCodec {
    stats: DecodeStats,
}

impl TelemetryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Decode every complete frame currently in `src`.
    pub fn drain(&mut self, src: &mut BytesMut) -> Vec<TelemetryReading> {
        let mut out = Vec::new();
        while let Some(reading) = self.next_frame(src) {
            out.push(reading);
        }
        out
    }

    fn skip(&mut self, src: &mut BytesMut, n: usize) {
        src.advance(n);
        self.stats.skipped_bytes += n as u64;
    }

    fn next_frame(&mut self, src: &mut BytesMut) -> Option<TelemetryReading> {
        if src.len() > MAX_BUFFERED {
            trace!(len = src.len(), "telemetry buffer overflow; clearing");
            self.stats.overflows += 1;
            self.stats.skipped_bytes += src.len() as u64;
            src.clear();
            return None;
        }

        loop {
            // Align on a header byte.
            match src.iter().position(|&b| b == FRAME_HEADER) {
                Some(0) => {}
                Some(pos) => self.skip(src, pos),
                None => {
                    let n = src.len();
                    self.skip(src, n);
                    return None;
                }
            }

            if src.len() < 2 {
                return None;
            }

            let announced = TelemetryFormat::from_lookahead(src[1]);
            if src.len() < announced.frame_len() {
                return None;
            }

            for format in [announced, announced.other()] {
                if src.len() < format.frame_len() {
                    continue;
                }
                if let Some(reading) = format.decode(src) {
                    src.advance(format.frame_len());
                    self.stats.frames += 1;
                    return Some(reading);
                }
            }

            // Header byte did not start a valid frame.
            self.skip(src, 1);
        }
    }
}

impl Decoder for TelemetryCodec {
    type Item = TelemetryReading;
    type Error = X80Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.next_frame(src))
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Fragment buffering and JPEG emission.
//!
//! Fragments are keyed by `frame_id` then `packet_num`. The fragment
//! flagged `is_last` closes its frame: stored payloads are joined in
//! `packet_num` order, the output starts at the first JPEG SOI marker, and
//! the frame plus every pending frame with a smaller id is discarded.
//! Missing fragments are not waited for.
//!
//! Once a frame has closed, fragments whose id lies up to 127 steps behind
//! it (mod 256) are late and are dropped on arrival, so a purged frame can
//! never be reopened by a straggler.

use std::collections::BTreeMap;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::header::JPEG_SOI;
use crate::video::fragment::VideoFragment;

// ── VideoFrame ───────────────────────────────────────────────────

/// A complete JPEG image taken off the wire.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub frame_id: u8,
    /// JPEG bytes starting at the SOI marker.
    pub data: Bytes,
    /// Number of fragments that went into the image.
    pub fragments: usize,
    pub completed_at: Instant,
}

// ── Stats ────────────────────────────────────────────────────────

/// Running counters for the reassembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub fragments: u64,
    pub frames_emitted: u64,
    /// Frames closed without a JPEG marker.
    pub frames_dropped: u64,
    /// Pending frames discarded because a newer frame completed.
    pub frames_purged: u64,
    /// Fragments dropped because their frame was already behind the last
    /// completed one.
    pub late_fragments: u64,
}

// ── FrameReassembler ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FrameReassembler {
    pending: BTreeMap<u8, BTreeMap<u8, Bytes>>,
    last_completed: Option<u8>,
    stats: ReassemblyStats,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Number of frames with at least one buffered fragment.
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, frame_id: u8) -> bool {
        self.pending.contains_key(&frame_id)
    }

    /// Parse and feed one raw datagram.
    pub fn push_datagram(&mut self, datagram: &[u8]) -> Option<VideoFrame> {
        let fragment = VideoFragment::parse(datagram)?;
        self.push(fragment)
    }

    /// Store a fragment, emitting a frame when it closes one.
    pub fn push(&mut self, fragment: VideoFragment) -> Option<VideoFrame> {
        self.stats.fragments += 1;
        let VideoFragment {
            frame_id,
            is_last,
            packet_num,
            payload,
        } = fragment;

        if self.is_late(frame_id) {
            trace!(frame_id, packet_num, "late fragment dropped");
            self.stats.late_fragments += 1;
            return None;
        }

        self.pending
            .entry(frame_id)
            .or_default()
            .insert(packet_num, payload);

        if is_last {
            self.complete(frame_id)
        } else {
            None
        }
    }

    fn is_late(&self, frame_id: u8) -> bool {
        self.last_completed
            .is_some_and(|last| (1..=127).contains(&last.wrapping_sub(frame_id)))
    }

    fn complete(&mut self, frame_id: u8) -> Option<VideoFrame> {
        self.last_completed = Some(frame_id);
        let parts = self.pending.remove(&frame_id).unwrap_or_default();

        // Everything older than the closed frame is abandoned.
        let newer = self.pending.split_off(&frame_id);
        self.stats.frames_purged += self.pending.len() as u64;
        self.pending = newer;

        let fragments = parts.len();
        let total: usize = parts.values().map(Bytes::len).sum();
        let mut joined = BytesMut::with_capacity(total);
        for payload in parts.into_values() {
            joined.extend_from_slice(&payload);
        }

        let Some(start) = find_soi(&joined) else {
            trace!(frame_id, bytes = total, "frame without JPEG marker dropped");
            self.stats.frames_dropped += 1;
            return None;
        };

        self.stats.frames_emitted += 1;
        Some(VideoFrame {
            frame_id,
            data: joined.freeze().slice(start..),
            fragments,
            completed_at: Instant::now(),
        })
    }
}

fn find_soi(data: &[u8]) -> Option<usize> {
    data.windows(JPEG_SOI.len()).position(|w| w == JPEG_SOI)
}

// ── Tests ────────────────────────────────────────────────────────

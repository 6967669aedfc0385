//! One video datagram.
//!
//! ## Wire format
//! ```text
//! frame_id:   u8   (1)
//! is_last:    u8   (1)   1 on the final fragment of a frame
//! packet_num: u8   (1)
//! reserved:   u8   (1)
//! payload:    [u8] (variable, non-empty)
//! ```

use bytes::Bytes;

/// Parsed video fragment. Lives only until the reassembler stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFragment {
    pub frame_id: u8,
    pub is_last: bool,
    pub packet_num: u8,
    pub payload: Bytes,
}

impl VideoFragment {
    /// Header size on the wire.
    pub const HEADER_SIZE: usize = 4;

    /// Parse a datagram. Datagrams without payload bytes are ignored.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        if datagram.len() <= Self::HEADER_SIZE {
            return None;
        }
        Some(Self {
            frame_id: datagram[0],
            is_last: datagram[1] == 1,
            packet_num: datagram[2],
            payload: Bytes::copy_from_slice(&datagram[Self::HEADER_SIZE..]),
        })
    }

    /// Serialize back to a datagram. Used by simulators and tests.
    pub fn encode(&self) -> Vec<u8> {
        let mut pkt = Vec::with_capacity(Self::HEADER_SIZE + self.payload.len());
        pkt.extend_from_slice(&[self.frame_id, self.is_last as u8, self.packet_num, 0]);
        pkt.extend_from_slice(&self.payload);
        pkt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fields() {
        let frag = VideoFragment::parse(&[7, 1, 3, 0xEE, 0xAA, 0xBB]).unwrap();
        assert_eq!(frag.frame_id, 7);
        assert!(frag.is_last);
        assert_eq!(frag.packet_num, 3);
        assert_eq!(&frag.payload[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn header_only_is_ignored() {
        assert!(VideoFragment::parse(&[1, 0, 0, 0]).is_none());
        assert!(VideoFragment::parse(&[]).is_none());
    }

    #[test]
    fn is_last_requires_exactly_one() {
        let frag = VideoFragment::parse(&[1, 2, 0, 0, 0xFF]).unwrap();
        assert!(!frag.is_last);
    }
}

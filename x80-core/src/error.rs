//! Domain-specific error types for the X80 link.
//!
//! Only socket setup and explicit operator actions are fallible. Malformed
//! inbound data is dropped where it is parsed and never becomes an error.

use std::net::SocketAddr;
use thiserror::Error;

/// The canonical error type for the X80 link.
#[derive(Debug, Error)]
pub enum X80Error {
    // ── Setup Errors ─────────────────────────────────────────────
    /// A local UDP socket could not be bound.
    #[error("failed to bind {channel} socket on {addr}: {source}")]
    Bind {
        channel: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The configured drone address could not be parsed.
    #[error("invalid drone address: {0}")]
    InvalidAddress(String),

    // ── Link Errors ──────────────────────────────────────────────
    /// An operation needs a live session but the link is down.
    #[error("link is not connected")]
    NotConnected,

    /// The UDP layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = X80Error::Bind {
            channel: "video",
            addr: "0.0.0.0:7070".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let text = e.to_string();
        assert!(text.contains("video"));
        assert!(text.contains("7070"));

        let e = X80Error::NotConnected;
        assert!(e.to_string().contains("not connected"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: X80Error = io_err.into();
        assert!(matches!(e, X80Error::Io(_)));
    }
}

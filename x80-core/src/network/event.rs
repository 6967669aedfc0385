//! Notifications published to collaborators.

use crate::state::health::ConnectionHealth;
use crate::video::VideoFrame;

/// Everything the link pushes out besides telemetry.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A complete JPEG image.
    Frame(VideoFrame),
    /// Short human-readable status line.
    Status(String),
    /// The watchdog moved to a new health state.
    Health(ConnectionHealth),
}

impl LinkEvent {
    pub fn status(msg: impl Into<String>) -> Self {
        Self::Status(msg.into())
    }
}

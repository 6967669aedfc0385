//! # x80-core
//!
//! Protocol engine for the X80 / XR872 Wi-Fi quadcopter.
//!
//! This crate contains:
//! - **Packet**: `ControlFrame` (20-byte periodic command) and `AuxCommand`
//! - **Telemetry**: the two inbound frame layouts and the `Telemetry` snapshot
//! - **Codec**: `TelemetryCodec`, a resynchronising decoder over `BytesMut`
//! - **Video**: `FrameReassembler` turning UDP fragments into JPEG images
//! - **State**: `CommandState` with one-shot expiry, `ConnectionHealth` machine
//! - **Network**: `DroneLink`, the five transport loops and their supervisor
//! - **Task**: `TaskGroup` for spawning and joining loops under one token
//! - **Error**: `X80Error`, a `thiserror`-based error enum

pub mod codec;
pub mod error;
pub mod flags;
pub mod header;
pub mod network;
pub mod packet;
pub mod state;
pub mod task;
pub mod telemetry;
pub mod video;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DecodeStats, TelemetryCodec};
pub use error::X80Error;
pub use flags::{ActionFlags, ModeFlags, StatusFlags};
pub use network::{DroneLink, LinkConfig, LinkEvent, LinkStatsSnapshot};
pub use packet::{AuxCommand, ControlFrame};
pub use state::{
    CameraTilt, CommandState, ConnectionHealth, FlightState, OneShot, SpeedMode, TrimAxis,
};
pub use task::{ShutdownReport, TaskGroup};
pub use telemetry::{Telemetry, TelemetryFormat, TelemetryReading};
pub use video::{FrameReassembler, VideoFragment, VideoFrame};

//! Shared state: what the operator asks for and how healthy the link is.

pub mod command;
pub mod health;

pub use command::{CameraTilt, CommandState, FlightState, OneShot, SpeedMode, TrimAxis};
pub use health::{ConnectionHealth, HealthMonitor, HealthSignals, Transition};

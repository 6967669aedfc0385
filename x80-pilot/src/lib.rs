//! # x80-pilot: operator console for the X80 link
//!
//! Connects a [`x80_core::DroneLink`], reads line commands from stdin,
//! prints telemetry periodically and reacts to link events.
//!
//! | Module    | Purpose                                         |
//! |-----------|-------------------------------------------------|
//! | `config`  | TOML configuration and conversion to the link's |
//! | `console` | Command parser and flight-state application     |
//! | `battery` | Low-battery warning and auto-land guard         |
//! | `session` | Event loop tying console, link and output       |

pub mod battery;
pub mod config;
pub mod console;
pub mod session;

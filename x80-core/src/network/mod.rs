//! # Network: UDP session management
//!
//! | Module   | Purpose                                            |
//! |----------|----------------------------------------------------|
//! | `config` | `LinkConfig`: addresses, ports, timing knobs       |
//! | `link`   | `DroneLink`: connect, disconnect, reconnect, aux   |
//! | `loops`  | The five per-session duty cycles                   |
//! | `stats`  | Atomic counters shared by the loops                |
//! | `event`  | `LinkEvent` published on the broadcast channel     |

pub mod config;
pub mod event;
pub mod link;
mod loops;
pub mod stats;

pub use config::{CONTROL_PORT, DEFAULT_DRONE_IP, LinkConfig, VIDEO_PORT};
pub use event::LinkEvent;
pub use link::DroneLink;
pub use stats::{LinkStats, LinkStatsSnapshot};

//! Line-based operator commands.
//!
//! ```text
//! takeoff | land | stop | calibrate | flip
//! light | headless
//! cam up|down|stop|switch
//! speed <0..1>
//! stick <roll> <pitch> <throttle> <yaw>
//! neutral
//! trim roll|pitch|yaw <delta>
//! video on|off | photo | status | reconnect | help | quit
//! ```

use std::str::FromStr;

use thiserror::Error;
use x80_core::{CameraTilt, CommandState, OneShot, TrimAxis};

pub const HELP: &str = "\
commands:
  takeoff | land | stop | calibrate | flip
  light | headless
  cam up|down|stop|switch
  speed <0..1>
  stick <roll> <pitch> <throttle> <yaw>    (each -100..100)
  neutral
  trim roll|pitch|yaw <delta>
  video on|off | photo | status | reconnect | help | quit";

#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("not a number: `{0}`")]
    Number(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Action(OneShot),
    Light,
    Headless,
    Camera(CameraTilt),
    SwitchCamera,
    Speed(f32),
    Sticks {
        roll: i32,
        pitch: i32,
        throttle: i32,
        yaw: i32,
    },
    Neutral,
    Trim(TrimAxis, i32),
    Video(bool),
    Photo,
    Status,
    Reconnect,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ConsoleError::Usage("type a command, or `help`"));
        };
        let args: Vec<&str> = words.collect();

        let cmd = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("takeoff", []) => Self::Action(OneShot::Takeoff),
            ("land", []) => Self::Action(OneShot::Land),
            ("stop", []) => Self::Action(OneShot::EmergencyStop),
            ("calibrate", []) => Self::Action(OneShot::Calibrate),
            ("flip", []) => Self::Action(OneShot::Flip),
            ("light", []) => Self::Light,
            ("headless", []) => Self::Headless,
            ("cam", [dir]) => match *dir {
                "up" => Self::Camera(CameraTilt::Up),
                "down" => Self::Camera(CameraTilt::Down),
                "stop" => Self::Camera(CameraTilt::Stop),
                "switch" => Self::SwitchCamera,
                _ => return Err(ConsoleError::Usage("cam up|down|stop|switch")),
            },
            ("cam", _) => return Err(ConsoleError::Usage("cam up|down|stop|switch")),
            ("speed", [level]) => Self::Speed(number(level)?),
            ("speed", _) => return Err(ConsoleError::Usage("speed <0..1>")),
            ("stick" | "sticks", [r, p, t, y]) => Self::Sticks {
                roll: number(r)?,
                pitch: number(p)?,
                throttle: number(t)?,
                yaw: number(y)?,
            },
            ("stick" | "sticks", _) => {
                return Err(ConsoleError::Usage("stick <roll> <pitch> <throttle> <yaw>"));
            }
            ("neutral", []) => Self::Neutral,
            ("trim", [axis, delta]) => {
                let axis = match *axis {
                    "roll" => TrimAxis::Roll,
                    "pitch" => TrimAxis::Pitch,
                    "yaw" => TrimAxis::Yaw,
                    _ => return Err(ConsoleError::Usage("trim roll|pitch|yaw <delta>")),
                };
                Self::Trim(axis, number(delta)?)
            }
            ("trim", _) => return Err(ConsoleError::Usage("trim roll|pitch|yaw <delta>")),
            ("video", ["on"]) => Self::Video(true),
            ("video", ["off"]) => Self::Video(false),
            ("video", _) => return Err(ConsoleError::Usage("video on|off")),
            ("photo", []) => Self::Photo,
            ("status", []) => Self::Status,
            ("reconnect", []) => Self::Reconnect,
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit" | "q", []) => Self::Quit,
            _ => return Err(ConsoleError::Unknown(line.trim().to_string())),
        };
        Ok(cmd)
    }
}

fn number<T: FromStr>(text: &str) -> Result<T, ConsoleError> {
    text.parse().map_err(|_| ConsoleError::Number(text.to_string()))
}

impl ConsoleCommand {
    /// Apply a flight-state command and describe the result. Returns
    /// `None` for commands that need the link itself.
    pub fn apply(self, command: &CommandState) -> Option<String> {
        let msg = match self {
            Self::Action(action) => {
                command.trigger(action);
                format!("{action} sent")
            }
            Self::Light => format!("light {}", on_off(command.toggle_light())),
            Self::Headless => format!("headless {}", on_off(command.toggle_headless())),
            Self::Camera(tilt) => {
                command.set_camera_tilt(tilt);
                format!("camera {tilt:?}").to_lowercase()
            }
            Self::Speed(level) => {
                command.set_speed(level);
                let state = command.snapshot();
                format!("speed {:.2} ({})", state.speed, state.speed_mode())
            }
            Self::Sticks {
                roll,
                pitch,
                throttle,
                yaw,
            } => {
                command.set_sticks(roll, pitch, throttle, yaw);
                let s = command.snapshot();
                format!(
                    "sticks r={} p={} t={} y={}",
                    s.roll, s.pitch, s.throttle, s.yaw
                )
            }
            Self::Neutral => {
                command.neutralize_sticks();
                "sticks centered".to_string()
            }
            Self::Trim(axis, delta) => {
                let value = command.adjust_trim(axis, delta);
                format!("trim {axis:?} = {value}").to_lowercase()
            }
            Self::SwitchCamera
            | Self::Video(_)
            | Self::Photo
            | Self::Status
            | Self::Reconnect
            | Self::Help
            | Self::Quit => return None,
        };
        Some(msg)
    }
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}

// ── Tests ────────────────────────────────────────────────────────

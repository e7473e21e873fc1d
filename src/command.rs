//! Drive commands and the joystick classifier
//!
//! Maps one 2-D stick sample into one of five discrete drive commands and
//! encodes commands for the link.
//!
//! ```text
//!            y > t
//!           Forward
//!   x < -t    │    x > t
//!   Left ─── Stop ─── Right
//!             │
//!          Backward
//!           y < -t
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default axis threshold a stick has to exceed to leave `Stop`
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Closed set of driving instructions understood by the car
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DriveCommand {
    #[default]
    Stop,
    Forward,
    Backward,
    Left,
    Right,
}

/// Encoding of a command on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Single letter (`S`, `F`, `B`, `L`, `R`), parsed by the car firmware
    #[default]
    Letter,
    /// Full command string (`stop`, `forward`, ...)
    Word,
}

/// One sample of a 2-D stick axis, y positive = up
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StickPosition {
    pub x: f32,
    pub y: f32,
}

impl StickPosition {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown drive command: {0:?}")]
pub struct CommandParseError(pub String);

impl DriveCommand {
    pub const ALL: [DriveCommand; 5] = [
        DriveCommand::Stop,
        DriveCommand::Forward,
        DriveCommand::Backward,
        DriveCommand::Left,
        DriveCommand::Right,
    ];

    /// The command string
    pub fn name(self) -> &'static str {
        match self {
            DriveCommand::Stop => "stop",
            DriveCommand::Forward => "forward",
            DriveCommand::Backward => "backward",
            DriveCommand::Left => "left",
            DriveCommand::Right => "right",
        }
    }

    pub fn letter(self) -> &'static str {
        match self {
            DriveCommand::Stop => "S",
            DriveCommand::Forward => "F",
            DriveCommand::Backward => "B",
            DriveCommand::Left => "L",
            DriveCommand::Right => "R",
        }
    }

    pub fn encode(self, format: WireFormat) -> &'static str {
        match format {
            WireFormat::Letter => self.letter(),
            WireFormat::Word => self.name(),
        }
    }

    /// Payload bytes as they go out on the link
    pub fn payload(self, format: WireFormat) -> &'static [u8] {
        self.encode(format).as_bytes()
    }
}

impl fmt::Display for DriveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriveCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        DriveCommand::ALL
            .into_iter()
            .find(|cmd| {
                token.eq_ignore_ascii_case(cmd.letter()) || token.eq_ignore_ascii_case(cmd.name())
            })
            .ok_or_else(|| CommandParseError(s.to_string()))
    }
}

/// Classifies a stick sample into a drive command
///
/// Vertical wins over horizontal, so diagonals resolve to `Forward` or
/// `Backward`. Comparisons are strict: a value sitting exactly on the
/// threshold stays `Stop`. An unavailable axis is `Stop`.
pub fn classify(axis: Option<StickPosition>, threshold: f32) -> DriveCommand {
    let Some(StickPosition { x, y }) = axis else {
        return DriveCommand::Stop;
    };

    if y > threshold {
        DriveCommand::Forward
    } else if y < -threshold {
        DriveCommand::Backward
    } else if x < -threshold {
        DriveCommand::Left
    } else if x > threshold {
        DriveCommand::Right
    } else {
        DriveCommand::Stop
    }
}

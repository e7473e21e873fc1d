//! Drive loop: turns per-frame device state into commands on the link
//!
//! [`DriveController`] owns the component lifecycle as a typestate machine:
//!
//! ```text
//! Starting ──start()──► Driving ──stop()──► Stopped
//!                        │  ▲
//!                        └──┘ update() once per frame
//! ```
//!
//! Commands go out with a send-if-changed policy: a frame only transmits when
//! its command differs from the last one attempted. Teardown always sends a
//! final `stop`.

pub mod vehicle;

pub use vehicle::DriveController;

use crate::command::{DriveCommand, WireFormat, DEFAULT_THRESHOLD};
use crate::controller::JoystickType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    /// Stick that steers the car
    pub stick: JoystickType,
    /// Axis magnitude a stick has to exceed to leave `stop`
    pub threshold: f32,
    pub frame_interval_ms: u64,
    pub wire_format: WireFormat,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            stick: JoystickType::Right,
            threshold: DEFAULT_THRESHOLD,
            frame_interval_ms: 20,
            wire_format: WireFormat::Letter,
        }
    }
}

/// What a single frame did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No valid device this frame, nothing was classified
    DeviceUnavailable,
    Unchanged(DriveCommand),
    Sent(DriveCommand),
    /// The command changed but the link refused it
    SendFailed(DriveCommand),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveStats {
    pub frames: u64,
    pub sent: u64,
    pub failed: u64,
    pub unavailable_frames: u64,
}

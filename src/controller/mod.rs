//! Controller subsystem for gamepad input handling
//!
//! Implements a two-stage processing pipeline:
//!
//! 1. [`event_collector`] - Raw gamepad input collection and device acquisition
//! 2. [`event_processor`] - Per-frame folding into a device state snapshot
//! 3. [`controller_handle`] - Unified API and lifecycle management
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Collector ──► Processor ──► watch<ControllerOutput>
//!             (Raw Events)  (per frame)
//! ```

pub mod controller_handle;
pub mod event_collector;
pub mod event_processor;

pub use controller_handle::{ControllerHandle, ControllerSettings};
pub use event_collector::{GamepadSelection, JoystickType};
pub use event_processor::ControllerOutput;

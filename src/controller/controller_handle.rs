//! Controller Handle - Unified API for gamepad input processing
//!
//! Starts the two-stage pipeline (raw event collection, per-frame state folding)
//! and hands out the resulting device state.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::event_collector::{
    CollectorError, CollectorHandle, CollectorSettings, GamepadSelection,
};
use super::event_processor::{ControllerOutput, ProcessorError, ProcessorHandle, ProcessorSettings};

/// Capacity of the queue between collector and processor
const EVENT_QUEUE_CAPACITY: usize = 1000;

/// Configuration settings for the complete controller subsystem
///
/// Settings are split up and handed to the collector and the processor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// How often the device state snapshot is refreshed, in milliseconds
    pub collection_interval_ms: u64,

    /// Analog stick deadzone as a fraction (0.0-1.0)
    ///
    /// Small movements near the center are zeroed to prevent stick drift.
    pub joystick_deadzone: f32,

    /// Which connected gamepad is tracked
    pub gamepad: GamepadSelection,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            collection_interval_ms: 20,
            joystick_deadzone: 0.05,
            gamepad: GamepadSelection::First,
        }
    }
}

/// Errors that can occur during controller initialization
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Gamepad driver or backend could not be initialized
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),

    #[error("Processor error: {0}")]
    ProcessorError(#[from] ProcessorError),
}

/// Handle for the running controller subsystem
///
/// ```text
/// CollectorHandle ─[RawControllerEvent]→ ProcessorHandle ─[ControllerOutput]→ watch
///                  (mpsc::channel(1000))
/// ```
///
/// Both tasks stop on their own once every state receiver is gone.
pub struct ControllerHandle {
    collector: CollectorHandle,
    processor: ProcessorHandle,
}

impl ControllerHandle {
    /// Spawns collector and processor with the given settings, or the defaults
    ///
    /// # Errors
    ///
    /// [`ControllerError::CollectorError`] if the gamepad backend fails to start.
    /// A missing gamepad is not an error; the collector waits for one.
    pub fn spawn(settings: Option<ControllerSettings>) -> Result<Self, ControllerError> {
        let settings = settings.unwrap_or_default();
        info!("Initializing Controller system with settings: {:?}", settings);

        let collector_settings = CollectorSettings {
            joystick_deadzone: settings.joystick_deadzone,
            gamepad: settings.gamepad.clone(),
        };
        let processor_settings = ProcessorSettings {
            processing_interval_ms: settings.collection_interval_ms,
        };
        debug!(
            "Split settings: collector={:?}, processor={:?}",
            collector_settings, processor_settings
        );

        let (event_sender, event_receiver) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let collector = CollectorHandle::spawn(Some(collector_settings), event_sender)?;
        let processor = ProcessorHandle::spawn(event_receiver, Some(processor_settings));

        info!("Controller system initialized successfully");
        Ok(Self {
            collector,
            processor,
        })
    }

    /// Receiver for the per-frame device state
    pub fn subscribe(&self) -> watch::Receiver<ControllerOutput> {
        self.processor.subscribe()
    }

    /// False once either pipeline stage has stopped
    pub fn is_running(&self) -> bool {
        !self.collector.is_finished() && !self.processor.is_finished()
    }
}

use chrono::Local;
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::command::StickPosition;
use crate::controller::event_collector::{JoystickType, RawControllerEvent};

// Device state shared through the watch channel, one snapshot per frame
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerOutput {
    pub connected: bool,
    pub device_name: Option<String>,

    // None while no device is tracked
    pub left_stick: Option<StickPosition>,
    pub right_stick: Option<StickPosition>,

    pub timestamp: SystemTime,
}

impl Default for ControllerOutput {
    fn default() -> Self {
        Self {
            connected: false,
            device_name: None,
            left_stick: None,
            right_stick: None,
            timestamp: SystemTime::now(),
        }
    }
}

impl ControllerOutput {
    pub fn stick(&self, stick: JoystickType) -> Option<StickPosition> {
        match stick {
            JoystickType::Left => self.left_stick,
            JoystickType::Right => self.right_stick,
        }
    }
}

// Event batch for the processing state
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub events: Vec<RawControllerEvent>,
}

#[derive(Clone, Debug)]
pub struct ProcessorSettings {
    pub processing_interval_ms: u64,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            processing_interval_ms: 20,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Failed to receive events: {0}")]
    EventReceiveError(String),

    #[error("No subscribers left for controller state")]
    NoSubscribers,
}

pub trait ProcessingState {}

#[derive(Debug)]
pub struct Waiting;

// Holds the events drained for this frame
#[derive(Debug)]
pub struct Processing(EventBatch);

#[derive(Debug)]
pub struct Updating;

impl ProcessingState for Waiting {}
impl ProcessingState for Processing {}
impl ProcessingState for Updating {}

#[derive(Debug)]
pub struct EventProcessor<S: ProcessingState> {
    event_receiver: mpsc::Receiver<RawControllerEvent>,
    settings: ProcessorSettings,
    output: ControllerOutput,
    state_sender: watch::Sender<ControllerOutput>,
    state: S,
}

impl<S: ProcessingState> EventProcessor<S> {
    fn transition<N: ProcessingState>(self, state: N) -> EventProcessor<N> {
        EventProcessor {
            event_receiver: self.event_receiver,
            settings: self.settings,
            output: self.output,
            state_sender: self.state_sender,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerOutput> {
        self.state_sender.subscribe()
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }
}

impl EventProcessor<Waiting> {
    pub fn create(
        event_receiver: mpsc::Receiver<RawControllerEvent>,
        settings: Option<ProcessorSettings>,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        info!("Creating Event Processor with settings: {:?}", settings);

        let output = ControllerOutput::default();
        let (state_sender, _) = watch::channel(output.clone());

        Self {
            event_receiver,
            settings,
            output,
            state_sender,
            state: Waiting,
        }
    }

    // Drains everything queued since the last frame
    pub async fn wait_and_collect(mut self) -> Result<EventProcessor<Processing>, ProcessorError> {
        let mut events = Vec::new();

        loop {
            match self.event_receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    error!("Event channel disconnected!");
                    return Err(ProcessorError::EventReceiveError(
                        "Event channel disconnected".to_string(),
                    ));
                }
            }
        }

        if !events.is_empty() {
            debug!("Collected batch of {} events for processing", events.len());
        }

        Ok(self.transition(Processing(EventBatch { events })))
    }
}

impl EventProcessor<Processing> {
    pub fn batch(&self) -> &EventBatch {
        &self.state.0
    }

    pub fn process_events(mut self) -> EventProcessor<Updating> {
        let events = std::mem::take(&mut self.state.0.events);
        for event in events {
            self.apply(event);
        }

        self.output.timestamp = SystemTime::now();
        self.transition(Updating)
    }

    fn apply(&mut self, event: RawControllerEvent) {
        match event {
            RawControllerEvent::Connected {
                name,
                left_stick,
                right_stick,
                timestamp,
            } => {
                info!(
                    "Device connected: {} at {}",
                    name,
                    timestamp.format("%H:%M:%S.%3f")
                );
                self.output.connected = true;
                self.output.device_name = Some(name);
                self.output.left_stick = Some(StickPosition::new(left_stick.0, left_stick.1));
                self.output.right_stick = Some(StickPosition::new(right_stick.0, right_stick.1));
            }
            RawControllerEvent::Disconnected { timestamp } => {
                warn!(
                    "Device disconnected at {}",
                    timestamp.format("%H:%M:%S.%3f")
                );
                self.output.connected = false;
                self.output.device_name = None;
                self.output.left_stick = None;
                self.output.right_stick = None;
            }
            RawControllerEvent::JoystickMove { stick, x, y, .. } => {
                // Late axis events of a dropped device must not revive a stick
                if !self.output.connected {
                    debug!("Dropping stick sample while disconnected");
                    return;
                }
                let position = Some(StickPosition::new(x, y));
                match stick {
                    JoystickType::Left => self.output.left_stick = position,
                    JoystickType::Right => self.output.right_stick = position,
                }
            }
        }
    }
}

impl EventProcessor<Updating> {
    // Publishes the frame snapshot and goes back to Waiting
    pub fn update_state(self) -> Result<EventProcessor<Waiting>, ProcessorError> {
        if self.state_sender.send(self.output.clone()).is_err() {
            return Err(ProcessorError::NoSubscribers);
        }
        debug!(
            "State updated: connected={} L:{:?} R:{:?}",
            self.output.connected, self.output.left_stick, self.output.right_stick
        );
        Ok(self.transition(Waiting))
    }
}

pub struct ProcessorHandle {
    state_receiver: watch::Receiver<ControllerOutput>,
    task: tokio::task::JoinHandle<()>,
}

impl ProcessorHandle {
    pub fn spawn(
        event_receiver: mpsc::Receiver<RawControllerEvent>,
        settings: Option<ProcessorSettings>,
    ) -> Self {
        info!("Spawning Event Processor with settings: {:?}", settings);

        let processor = EventProcessor::create(event_receiver, settings);
        let state_receiver = processor.subscribe();

        let task = tokio::spawn(async move {
            match run_processor_loop(processor).await {
                Ok(()) => info!("Event Processor finished"),
                Err(e) => error!("Processor task terminated with error: {}", e),
            }
        });

        Self {
            state_receiver,
            task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerOutput> {
        self.state_receiver.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run_processor_loop(mut processor: EventProcessor<Waiting>) -> Result<(), ProcessorError> {
    let interval_ms = processor.settings().processing_interval_ms;
    info!("Starting processor loop with {}ms interval", interval_ms);

    let mut interval_timer = tokio::time::interval(tokio::time::Duration::from_millis(interval_ms));
    interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut cycles = 0u64;
    let mut total_events = 0usize;
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    loop {
        interval_timer.tick().await;

        let processing = processor.wait_and_collect().await?;
        total_events += processing.batch().events.len();

        processor = match processing.process_events().update_state() {
            Ok(waiting) => waiting,
            Err(ProcessorError::NoSubscribers) => {
                info!("No subscribers left, stopping processor");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        cycles += 1;

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            info!(
                "Processor stats: {} cycles, {} events in {} seconds",
                cycles,
                total_events,
                (now - last_stats_time).num_seconds()
            );
            cycles = 0;
            total_events = 0;
            last_stats_time = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(name: &str) -> RawControllerEvent {
        connected_holding(name, (0.0, 0.0), (0.0, 0.0))
    }

    fn connected_holding(
        name: &str,
        left_stick: (f32, f32),
        right_stick: (f32, f32),
    ) -> RawControllerEvent {
        RawControllerEvent::Connected {
            name: name.to_string(),
            left_stick,
            right_stick,
            timestamp: Local::now(),
        }
    }

    fn stick(stick: JoystickType, x: f32, y: f32) -> RawControllerEvent {
        RawControllerEvent::JoystickMove {
            stick,
            x,
            y,
            timestamp: Local::now(),
        }
    }

    async fn frame(processor: EventProcessor<Waiting>) -> EventProcessor<Waiting> {
        processor
            .wait_and_collect()
            .await
            .unwrap()
            .process_events()
            .update_state()
            .unwrap()
    }

    #[tokio::test]
    async fn starts_disconnected_without_sticks() {
        let (_tx, rx) = mpsc::channel(16);
        let processor = EventProcessor::create(rx, None);
        let state = processor.subscribe();
        let processor = frame(processor).await;

        let output = state.borrow().clone();
        assert!(!output.connected);
        assert_eq!(output.right_stick, None);
        drop(processor);
    }

    #[tokio::test]
    async fn folds_a_frame_of_events() {
        let (tx, rx) = mpsc::channel(16);
        let processor = EventProcessor::create(rx, None);
        let state = processor.subscribe();

        tx.send(connected("pad")).await.unwrap();
        tx.send(stick(JoystickType::Right, 0.1, 0.2)).await.unwrap();
        tx.send(stick(JoystickType::Right, 0.1, 0.9)).await.unwrap();
        let _processor = frame(processor).await;

        let output = state.borrow().clone();
        assert!(output.connected);
        assert_eq!(output.device_name.as_deref(), Some("pad"));
        assert_eq!(output.right_stick, Some(StickPosition::new(0.1, 0.9)));
        assert_eq!(output.left_stick, Some(StickPosition::new(0.0, 0.0)));
        assert_eq!(output.stick(JoystickType::Right), output.right_stick);
    }

    #[tokio::test]
    async fn disconnect_clears_sticks_and_ignores_late_samples() {
        let (tx, rx) = mpsc::channel(16);
        let processor = EventProcessor::create(rx, None);
        let state = processor.subscribe();

        tx.send(connected("pad")).await.unwrap();
        tx.send(stick(JoystickType::Left, -1.0, 0.0)).await.unwrap();
        let processor = frame(processor).await;
        assert!(state.borrow().left_stick.is_some());

        tx.send(RawControllerEvent::Disconnected {
            timestamp: Local::now(),
        })
        .await
        .unwrap();
        tx.send(stick(JoystickType::Left, -1.0, 0.0)).await.unwrap();
        let _processor = frame(processor).await;

        let output = state.borrow().clone();
        assert!(!output.connected);
        assert_eq!(output.left_stick, None);
    }

    #[tokio::test]
    async fn reconnect_restores_held_stick() {
        let (tx, rx) = mpsc::channel(16);
        let processor = EventProcessor::create(rx, None);
        let state = processor.subscribe();

        tx.send(connected_holding("pad", (0.0, 0.0), (0.9, 0.0)))
            .await
            .unwrap();
        let processor = frame(processor).await;
        assert_eq!(state.borrow().right_stick, Some(StickPosition::new(0.9, 0.0)));

        tx.send(RawControllerEvent::Disconnected {
            timestamp: Local::now(),
        })
        .await
        .unwrap();
        let processor = frame(processor).await;
        assert_eq!(state.borrow().right_stick, None);

        // no axis event follows, the stick never moved
        tx.send(connected_holding("pad", (0.0, 0.0), (0.9, 0.0)))
            .await
            .unwrap();
        let _processor = frame(processor).await;
        let output = state.borrow().clone();
        assert!(output.connected);
        assert_eq!(output.right_stick, Some(StickPosition::new(0.9, 0.0)));
    }

    #[tokio::test]
    async fn closed_event_queue_is_an_error() {
        let (tx, rx) = mpsc::channel::<RawControllerEvent>(1);
        let processor = EventProcessor::create(rx, None);
        drop(tx);
        assert!(matches!(
            processor.wait_and_collect().await,
            Err(ProcessorError::EventReceiveError(_))
        ));
    }

    #[tokio::test]
    async fn update_without_subscribers_fails() {
        let (_tx, rx) = mpsc::channel::<RawControllerEvent>(1);
        let processor = EventProcessor::create(rx, None);
        let result = processor
            .wait_and_collect()
            .await
            .unwrap()
            .process_events()
            .update_state();
        assert!(matches!(result, Err(ProcessorError::NoSubscribers)));
    }
}

use chrono::{DateTime, Local};
use gilrs::{Axis, Event, EventType, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// Raw controller event with chrono timestamps
#[derive(Debug, Clone)]
pub enum RawControllerEvent {
    JoystickMove {
        stick: JoystickType,
        x: f32,
        y: f32,
        timestamp: DateTime<Local>,
    },
    // Carries the stick positions held at the moment the device was acquired
    Connected {
        name: String,
        left_stick: (f32, f32),
        right_stick: (f32, f32),
        timestamp: DateTime<Local>,
    },
    Disconnected {
        timestamp: DateTime<Local>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoystickType {
    Left,
    #[default]
    Right,
}

/// Which gamepad becomes the tracked device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamepadSelection {
    #[default]
    First,
    Index(usize),
    /// Case-insensitive substring of the gamepad name
    Name(String),
}

impl GamepadSelection {
    /// Picks an entry from the connected gamepads, in enumeration order
    pub fn pick<'a, T>(&self, candidates: &'a [(T, String)]) -> Option<&'a (T, String)> {
        match self {
            GamepadSelection::First => candidates.first(),
            GamepadSelection::Index(idx) => candidates.get(*idx),
            GamepadSelection::Name(pattern) => {
                let pattern = pattern.to_lowercase();
                candidates
                    .iter()
                    .find(|(_, name)| name.to_lowercase().contains(&pattern))
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub joystick_deadzone: f32,
    pub gamepad: GamepadSelection,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            joystick_deadzone: 0.05,
            gamepad: GamepadSelection::First,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(String),

    #[error("Event queue closed")]
    QueueClosed,
}

pub trait CollectionState {}

#[derive(Debug)]
pub struct Initializing;

#[derive(Debug)]
pub struct Collecting;

impl CollectionState for Initializing {}
impl CollectionState for Collecting {}

#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,

    // Tracked device, None while waiting for one
    active_gamepad: Option<GamepadId>,

    settings: CollectorSettings,

    event_sender: mpsc::Sender<RawControllerEvent>,

    // Last seen stick values, gilrs reports one axis at a time
    last_left_stick: (f32, f32),
    last_right_stick: (f32, f32),

    _state: S,
}

impl<S: CollectionState> EventCollector<S> {
    fn transition<N: CollectionState>(self, state: N) -> EventCollector<N> {
        EventCollector {
            gilrs: self.gilrs,
            active_gamepad: self.active_gamepad,
            settings: self.settings,
            event_sender: self.event_sender,
            last_left_stick: self.last_left_stick,
            last_right_stick: self.last_right_stick,
            _state: state,
        }
    }

    fn connected_gamepads(&self) -> Vec<(GamepadId, String)> {
        self.gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect()
    }

    /// Adopts a device if none is tracked. Returns true if one was adopted.
    fn try_acquire(&mut self) -> Result<bool, CollectorError> {
        if self.active_gamepad.is_some() {
            return Ok(false);
        }

        let gamepads = self.connected_gamepads();
        let Some((id, name)) = self.settings.gamepad.pick(&gamepads).cloned() else {
            return Ok(false);
        };

        info!("Acquired gamepad: {} ({})", name, id);
        self.active_gamepad = Some(id);

        // A stick already held when the device shows up never reports an
        // axis change, so read its current position
        let (left, right) = self.held_sticks(id);
        self.last_left_stick = left;
        self.last_right_stick = right;
        debug!("Held sticks on acquire: L:{:?} R:{:?}", left, right);

        self.emit(RawControllerEvent::Connected {
            name,
            left_stick: left,
            right_stick: right,
            timestamp: Local::now(),
        })?;
        Ok(true)
    }

    fn held_sticks(&self, id: GamepadId) -> ((f32, f32), (f32, f32)) {
        let gamepad = self.gilrs.gamepad(id);
        let deadzone = self.settings.joystick_deadzone;
        let read = |axis| apply_deadzone(gamepad.value(axis), deadzone);
        (
            (read(Axis::LeftStickX), read(Axis::LeftStickY)),
            (read(Axis::RightStickX), read(Axis::RightStickY)),
        )
    }

    fn emit(&self, event: RawControllerEvent) -> Result<(), CollectorError> {
        match self.event_sender.try_send(event) {
            Ok(_) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CollectorError::QueueClosed),
            Err(e) => {
                error!("Failed to send event to processor: {}", e);
                Err(CollectorError::EventSendError(e.to_string()))
            }
        }
    }
}

impl EventCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<RawControllerEvent>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self {
            gilrs,
            active_gamepad: None,
            settings,
            event_sender,
            last_left_stick: (0.0, 0.0),
            last_right_stick: (0.0, 0.0),
            _state: Initializing,
        })
    }

    pub fn initialize(mut self) -> Result<EventCollector<Collecting>, CollectorError> {
        info!(
            "Initializing Event Collector with deadzone: {}",
            self.settings.joystick_deadzone
        );

        let gamepads = self.connected_gamepads();
        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, name)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, name);
            }
            if !self.try_acquire()? {
                warn!(
                    "No gamepad matches selection {:?}, waiting for one",
                    self.settings.gamepad
                );
            }
        }

        Ok(self.transition(Collecting))
    }
}

impl EventCollector<Collecting> {
    /// Handles a single gilrs event, if any is pending
    pub fn collect_next_event(&mut self) -> Result<bool, CollectorError> {
        self.try_acquire()?;

        let Some(Event { id, event, .. }) = self.gilrs.next_event() else {
            return Ok(false);
        };

        match event {
            EventType::Connected => {
                info!("Gamepad {} connected", id);
                self.try_acquire()?;
                return Ok(true);
            }
            EventType::Disconnected => {
                if self.active_gamepad == Some(id) {
                    warn!("Tracked gamepad {} disconnected", id);
                    self.active_gamepad = None;
                    self.emit(RawControllerEvent::Disconnected {
                        timestamp: Local::now(),
                    })?;
                }
                return Ok(true);
            }
            _ => {}
        }

        if self.active_gamepad != Some(id) {
            debug!("Skipping event from non-active gamepad: {:?}", id);
            return Ok(true);
        }

        if let Some(raw_event) = self.convert_gilrs_event(event) {
            debug!("Captured event: {:?}", raw_event);
            self.emit(raw_event)?;
        }
        Ok(true)
    }

    pub fn run_collection_loop(&mut self) -> Result<(), CollectorError> {
        info!("Starting Event Collector loop");

        let mut event_count = 0u64;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);

        loop {
            if self.event_sender.is_closed() {
                info!("Event queue closed, stopping collector");
                return Ok(());
            }

            match self.collect_next_event() {
                Ok(true) => event_count += 1,
                Ok(false) => {
                    // Nothing pending, back off a little
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                Err(CollectorError::QueueClosed) => {
                    info!("Event queue closed, stopping collector");
                    return Ok(());
                }
                Err(e) => error!("Error collecting event: {}", e),
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Event Collector stats: {} events in last {} seconds, device: {}",
                    event_count,
                    log_interval.num_seconds(),
                    if self.active_gamepad.is_some() {
                        "tracked"
                    } else {
                        "none"
                    }
                );
                event_count = 0;
                last_log_time = now;
            }
        }
    }

    fn convert_gilrs_event(&mut self, event: EventType) -> Option<RawControllerEvent> {
        let EventType::AxisChanged(axis, value, _) = event else {
            debug!("Ignoring event: {:?}", event);
            return None;
        };

        let value = apply_deadzone(value, self.settings.joystick_deadzone);
        let (stick, position) = match axis {
            Axis::LeftStickX => {
                self.last_left_stick.0 = value;
                (JoystickType::Left, self.last_left_stick)
            }
            Axis::LeftStickY => {
                self.last_left_stick.1 = value;
                (JoystickType::Left, self.last_left_stick)
            }
            Axis::RightStickX => {
                self.last_right_stick.0 = value;
                (JoystickType::Right, self.last_right_stick)
            }
            Axis::RightStickY => {
                self.last_right_stick.1 = value;
                (JoystickType::Right, self.last_right_stick)
            }
            _ => {
                debug!("Ignoring unsupported axis: {:?}", axis);
                return None;
            }
        };

        Some(RawControllerEvent::JoystickMove {
            stick,
            x: position.0,
            y: position.1,
            timestamp: Local::now(),
        })
    }
}

pub struct CollectorHandle {
    task: tokio::task::JoinHandle<()>,
}

impl CollectorHandle {
    /// Creates the collector and runs it on a blocking task
    pub fn spawn(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<RawControllerEvent>,
    ) -> Result<Self, CollectorError> {
        info!("Spawning Event Collector with settings: {:?}", settings);

        let collector = EventCollector::create(settings, event_sender)?;

        let task = tokio::task::spawn_blocking(move || match collector.initialize() {
            Ok(mut collecting) => {
                if let Err(e) = collecting.run_collection_loop() {
                    error!("Collector task terminated with error: {}", e);
                }
            }
            Err(e) => error!("Failed to initialize Event Collector: {}", e),
        });

        Ok(Self { task })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// Zeroes values inside the deadzone and rescales the rest to [-1, 1]
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

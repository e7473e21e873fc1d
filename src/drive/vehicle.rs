use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use super::{DriveSettings, DriveStats, FrameOutcome};
use crate::command::{classify, DriveCommand};
use crate::controller::ControllerOutput;
use crate::link::CommandLink;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

pub trait DriveState {}

#[derive(Debug)]
pub struct Starting; // Link open, no device looked up yet
#[derive(Debug)]
pub struct Driving; // Frame loop running
#[derive(Debug)]
pub struct Stopped; // Final stop sent, link closed

impl DriveState for Starting {}
impl DriveState for Driving {}
impl DriveState for Stopped {}

#[derive(Debug)]
pub struct DriveController<S: DriveState> {
    input: watch::Receiver<ControllerOutput>,
    link: CommandLink,
    settings: DriveSettings,
    // Last command attempted on the link
    last_command: DriveCommand,
    device_present: bool,
    stats: DriveStats,
    _state: S,
}

impl<S: DriveState> DriveController<S> {
    fn transition<N: DriveState>(self, state: N) -> DriveController<N> {
        DriveController {
            input: self.input,
            link: self.link,
            settings: self.settings,
            last_command: self.last_command,
            device_present: self.device_present,
            stats: self.stats,
            _state: state,
        }
    }

    pub fn stats(&self) -> &DriveStats {
        &self.stats
    }

    pub fn last_command(&self) -> DriveCommand {
        self.last_command
    }

    // Best effort: failures are logged and counted, never propagated
    async fn send_command(&mut self, command: DriveCommand) -> bool {
        let payload = command.payload(self.settings.wire_format);
        match self.link.send(payload).await {
            Ok(_) => {
                self.stats.sent += 1;
                info!(
                    "Command sent: {} ({:?})",
                    command,
                    command.encode(self.settings.wire_format)
                );
                true
            }
            Err(e) => {
                self.stats.failed += 1;
                error!("Failed to send command {}: {}", command, e);
                false
            }
        }
    }
}

impl DriveController<Starting> {
    pub fn create(
        input: watch::Receiver<ControllerOutput>,
        link: CommandLink,
        settings: DriveSettings,
    ) -> Self {
        info!(
            "Drive controller ready: {} (stick {:?}, threshold {}, {:?} encoding)",
            link.describe(),
            settings.stick,
            settings.threshold,
            settings.wire_format
        );

        Self {
            input,
            link,
            settings,
            last_command: DriveCommand::Stop,
            device_present: false,
            stats: DriveStats::default(),
            _state: Starting,
        }
    }

    /// Initial device lookup, then the frame loop may run
    pub fn start(mut self) -> DriveController<Driving> {
        let (connected, name) = {
            let snapshot = self.input.borrow_and_update();
            (snapshot.connected, snapshot.device_name.clone())
        };

        if connected {
            info!(
                "Input device found: {}",
                name.as_deref().unwrap_or("unknown")
            );
        } else {
            warn!("No input device yet, waiting for one");
        }
        self.device_present = connected;

        self.transition(Driving)
    }
}

impl DriveController<Driving> {
    /// Runs one frame: validate device, classify, send if changed
    pub async fn update(&mut self) -> FrameOutcome {
        self.stats.frames += 1;

        let (connected, axis, name) = {
            let snapshot = self.input.borrow_and_update();
            (
                snapshot.connected,
                snapshot.stick(self.settings.stick),
                snapshot.device_name.clone(),
            )
        };

        if !connected {
            self.stats.unavailable_frames += 1;
            if self.device_present {
                warn!("Input device lost, reacquiring");
                self.device_present = false;
            }
            return FrameOutcome::DeviceUnavailable;
        }
        if !self.device_present {
            info!(
                "Input device acquired: {}",
                name.as_deref().unwrap_or("unknown")
            );
            self.device_present = true;
        }

        let command = classify(axis, self.settings.threshold);
        if command == self.last_command {
            return FrameOutcome::Unchanged(command);
        }

        debug!("Command changed: {} -> {}", self.last_command, command);
        let delivered = self.send_command(command).await;
        // Recorded even on failure, the next attempt waits for a new command
        self.last_command = command;

        if delivered {
            FrameOutcome::Sent(command)
        } else {
            FrameOutcome::SendFailed(command)
        }
    }

    /// Ticks `update` every frame until shutdown is signalled, then stops
    ///
    /// A dropped shutdown sender counts as a signal, so does a dead input
    /// pipeline.
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> DriveController<Stopped> {
        let frame = Duration::from_millis(self.settings.frame_interval_ms);
        info!("Starting drive loop with {:?} frames", frame);

        let mut ticker = tokio::time::interval(frame);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_stats = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = ticker.tick() => {
                    if self.input.has_changed().is_err() {
                        error!("Input pipeline stopped");
                        break;
                    }
                    self.update().await;

                    if last_stats.elapsed() >= STATS_INTERVAL {
                        info!(
                            "Drive stats: {} frames, {} sent, {} failed, {} without device",
                            self.stats.frames,
                            self.stats.sent,
                            self.stats.failed,
                            self.stats.unavailable_frames
                        );
                        last_stats = tokio::time::Instant::now();
                    }
                }
            }
        }

        self.stop().await
    }

    /// Sends a final `stop` regardless of the last command and closes the link
    pub async fn stop(mut self) -> DriveController<Stopped> {
        info!("Stopping vehicle");
        self.send_command(DriveCommand::Stop).await;
        self.last_command = DriveCommand::Stop;
        self.link.close();
        self.transition(Stopped)
    }
}

impl DriveController<Stopped> {
    pub fn into_stats(self) -> DriveStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{StickPosition, WireFormat};
    use crate::controller::event_collector::RawControllerEvent;
    use crate::controller::event_processor::{EventProcessor, Waiting};
    use crate::controller::JoystickType;
    use crate::link::{LinkError, UdpCommandSender};
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;

    struct Rig {
        state: watch::Sender<ControllerOutput>,
        car: UdpSocket,
        driver: DriveController<Driving>,
    }

    async fn rig(settings: DriveSettings) -> Rig {
        let car = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = car.local_addr().unwrap().port();
        let link = UdpCommandSender::open("127.0.0.1", port).await.unwrap();
        let (state, input) = watch::channel(ControllerOutput::default());
        let driver = DriveController::create(input, link.into(), settings).start();
        Rig { state, car, driver }
    }

    fn stick(state: &watch::Sender<ControllerOutput>, x: f32, y: f32) {
        state.send_modify(|output| {
            output.connected = true;
            output.device_name = Some("pad".to_string());
            output.right_stick = Some(StickPosition::new(x, y));
        });
    }

    async fn received(car: &UdpSocket) -> Option<Vec<u8>> {
        let mut buf = [0u8; 32];
        match tokio::time::timeout(Duration::from_millis(100), car.recv(&mut buf)).await {
            Ok(Ok(n)) => Some(buf[..n].to_vec()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn no_device_sends_nothing() {
        let mut rig = rig(DriveSettings::default()).await;

        assert_eq!(rig.driver.update().await, FrameOutcome::DeviceUnavailable);
        assert_eq!(received(&rig.car).await, None);
        assert_eq!(rig.driver.stats().unavailable_frames, 1);
    }

    #[tokio::test]
    async fn neutral_stick_at_start_sends_nothing() {
        let mut rig = rig(DriveSettings::default()).await;
        stick(&rig.state, 0.0, 0.0);

        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::Unchanged(DriveCommand::Stop)
        );
        assert_eq!(received(&rig.car).await, None);
    }

    #[tokio::test]
    async fn sends_only_when_command_changes() {
        let mut rig = rig(DriveSettings::default()).await;

        stick(&rig.state, 0.0, 0.9);
        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::Sent(DriveCommand::Forward)
        );
        stick(&rig.state, 0.2, 0.8);
        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::Unchanged(DriveCommand::Forward)
        );
        stick(&rig.state, -0.9, 0.0);
        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::Sent(DriveCommand::Left)
        );
        stick(&rig.state, 0.0, 0.0);
        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::Sent(DriveCommand::Stop)
        );

        assert_eq!(received(&rig.car).await.as_deref(), Some(&b"F"[..]));
        assert_eq!(received(&rig.car).await.as_deref(), Some(&b"L"[..]));
        assert_eq!(received(&rig.car).await.as_deref(), Some(&b"S"[..]));
        assert_eq!(received(&rig.car).await, None);
        assert_eq!(rig.driver.stats().sent, 3);
        assert_eq!(rig.driver.stats().frames, 4);
    }

    #[tokio::test]
    async fn word_encoding_and_left_stick() {
        let settings = DriveSettings {
            stick: JoystickType::Left,
            wire_format: WireFormat::Word,
            ..DriveSettings::default()
        };
        let mut rig = rig(settings).await;

        // right stick is ignored
        stick(&rig.state, 0.0, -0.9);
        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::Unchanged(DriveCommand::Stop)
        );

        rig.state.send_modify(|output| {
            output.left_stick = Some(StickPosition::new(0.0, -0.9));
        });
        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::Sent(DriveCommand::Backward)
        );
        assert_eq!(received(&rig.car).await.as_deref(), Some(&b"backward"[..]));
    }

    #[tokio::test]
    async fn reconnect_with_held_stick_keeps_command() {
        let car = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = car.local_addr().unwrap().port();
        let link = UdpCommandSender::open("127.0.0.1", port).await.unwrap();

        let (events, queue) = mpsc::channel(16);
        let processor = EventProcessor::create(queue, None);
        let mut driver =
            DriveController::create(processor.subscribe(), link.into(), DriveSettings::default())
                .start();

        let frame = |processor: EventProcessor<Waiting>| async move {
            processor
                .wait_and_collect()
                .await
                .unwrap()
                .process_events()
                .update_state()
                .unwrap()
        };
        let connected = || RawControllerEvent::Connected {
            name: "pad".to_string(),
            left_stick: (0.0, 0.0),
            right_stick: (0.9, 0.0),
            timestamp: chrono::Local::now(),
        };

        events.send(connected()).await.unwrap();
        let processor = frame(processor).await;
        assert_eq!(driver.update().await, FrameOutcome::Sent(DriveCommand::Right));
        assert_eq!(received(&car).await.as_deref(), Some(&b"R"[..]));

        events
            .send(RawControllerEvent::Disconnected {
                timestamp: chrono::Local::now(),
            })
            .await
            .unwrap();
        let processor = frame(processor).await;
        assert_eq!(driver.update().await, FrameOutcome::DeviceUnavailable);
        assert_eq!(driver.last_command(), DriveCommand::Right);

        events.send(connected()).await.unwrap();
        let _processor = frame(processor).await;
        assert_eq!(
            driver.update().await,
            FrameOutcome::Unchanged(DriveCommand::Right)
        );
        assert_eq!(received(&car).await, None);
    }

    #[tokio::test]
    async fn send_failure_is_recorded_and_not_retried() {
        let mut rig = rig(DriveSettings::default()).await;
        rig.driver.link.close();

        stick(&rig.state, 0.0, 0.9);
        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::SendFailed(DriveCommand::Forward)
        );
        assert_eq!(
            rig.driver.update().await,
            FrameOutcome::Unchanged(DriveCommand::Forward)
        );
        assert_eq!(rig.driver.stats().failed, 1);
        assert_eq!(rig.driver.last_command(), DriveCommand::Forward);
    }

    #[tokio::test]
    async fn stop_always_sends_stop_and_closes() {
        let rig = rig(DriveSettings::default()).await;
        let mut stopped = rig.driver.stop().await;

        assert_eq!(received(&rig.car).await.as_deref(), Some(&b"S"[..]));
        assert_eq!(stopped.last_command(), DriveCommand::Stop);
        assert_eq!(stopped.stats().sent, 1);
        assert!(matches!(
            stopped.link.send(b"F").await,
            Err(LinkError::Closed)
        ));
        assert_eq!(received(&rig.car).await, None);
    }

    #[tokio::test]
    async fn run_loop_drives_until_shutdown() {
        let settings = DriveSettings {
            frame_interval_ms: 5,
            ..DriveSettings::default()
        };
        let Rig { state, car, driver } = rig(settings).await;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(driver.run_until_shutdown(shutdown_rx));

        stick(&state, 0.0, 0.9);
        assert_eq!(received(&car).await.as_deref(), Some(&b"F"[..]));

        shutdown_tx.send(()).unwrap();
        let stopped = task.await.unwrap();
        assert_eq!(received(&car).await.as_deref(), Some(&b"S"[..]));

        let stats = stopped.into_stats();
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.failed, 0);
        assert!(stats.frames >= 1);
    }

    #[tokio::test]
    async fn run_loop_stops_when_input_pipeline_ends() {
        let settings = DriveSettings {
            frame_interval_ms: 5,
            ..DriveSettings::default()
        };
        let Rig { state, car, driver } = rig(settings).await;
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(driver.run_until_shutdown(shutdown_rx));

        drop(state);
        let stopped = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received(&car).await.as_deref(), Some(&b"S"[..]));
        assert_eq!(stopped.into_stats().sent, 1);
    }

    #[tokio::test]
    async fn run_loop_stops_when_shutdown_sender_is_dropped() {
        let settings = DriveSettings {
            frame_interval_ms: 5,
            ..DriveSettings::default()
        };
        let Rig { state, car, driver } = rig(settings).await;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(driver.run_until_shutdown(shutdown_rx));

        drop(shutdown_tx);
        let stopped = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received(&car).await.as_deref(), Some(&b"S"[..]));
        assert_eq!(stopped.last_command(), DriveCommand::Stop);
        drop(state);
    }
}

//! Direct serial transport to the motor controller board
//!
//! Used when the client runs on the car itself and talks to the
//! microcontroller over USB serial instead of through the network bridge.

use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

use super::LinkError;

pub const DEFAULT_SERIAL_PATH: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
/// The board reboots when the port opens
pub const DEFAULT_RESET_DELAY_MS: u64 = 2000;

const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SerialCommandSender {
    port: Option<Box<dyn SerialPort>>,
    path: String,
}

impl std::fmt::Debug for SerialCommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialCommandSender")
            .field("path", &self.path)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialCommandSender {
    pub async fn open(path: &str, baud_rate: u32, reset_delay: Duration) -> Result<Self, LinkError> {
        let device = path.to_string();
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(device, baud_rate)
                .timeout(WRITE_TIMEOUT)
                .open()
        })
        .await??;
        info!("Serial link opened: {} @ {} baud", path, baud_rate);

        if !reset_delay.is_zero() {
            debug!("Waiting {:?} for board reset", reset_delay);
            tokio::time::sleep(reset_delay).await;
        }

        Ok(Self {
            port: Some(port),
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Writes on the blocking pool, the port is handed back once the write is done
    pub async fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        let mut port = self.port.take().ok_or(LinkError::Closed)?;
        let bytes = payload.to_vec();
        let (port, written) = tokio::task::spawn_blocking(move || {
            let written = port.write_all(&bytes).and_then(|_| port.flush());
            (port, written)
        })
        .await?;
        self.port = Some(port);

        written.map_err(|source| LinkError::Send {
            target: self.path.clone(),
            source,
        })?;
        debug!("Wrote {} bytes to {}", payload.len(), self.path);
        Ok(payload.len())
    }

    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Serial link {} closed", self.path);
        }
    }
}

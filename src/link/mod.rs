//! Command link to the car
//!
//! Best-effort delivery of encoded drive commands. There is no framing, no
//! acknowledgement and no retry; callers log failures and carry on.

pub mod error;
pub mod serial;
pub mod udp;

pub use error::LinkError;
pub use serial::SerialCommandSender;
pub use udp::UdpCommandSender;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Which transport carries the commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Udp,
    Serial,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Udp => write!(f, "UDP"),
            TransportKind::Serial => write!(f, "Serial"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    pub serial: SerialSettings,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Udp,
            host: udp::DEFAULT_HOST.to_string(),
            port: udp::DEFAULT_PORT,
            serial: SerialSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub reset_delay_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: serial::DEFAULT_SERIAL_PATH.to_string(),
            baud_rate: serial::DEFAULT_BAUD_RATE,
            reset_delay_ms: serial::DEFAULT_RESET_DELAY_MS,
        }
    }
}

#[derive(Debug)]
pub enum CommandLink {
    Udp(UdpCommandSender),
    Serial(SerialCommandSender),
}

impl CommandLink {
    /// Opens the transport selected in the settings
    pub async fn open(settings: &LinkSettings) -> Result<Self, LinkError> {
        info!("Opening {} command link", settings.transport);
        let link: Self = match settings.transport {
            TransportKind::Udp => {
                UdpCommandSender::open(&settings.host, settings.port)
                    .await?
                    .into()
            }
            TransportKind::Serial => SerialCommandSender::open(
                &settings.serial.path,
                settings.serial.baud_rate,
                Duration::from_millis(settings.serial.reset_delay_ms),
            )
            .await?
            .into(),
        };
        Ok(link)
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        match self {
            CommandLink::Udp(link) => link.send(payload).await,
            CommandLink::Serial(link) => link.send(payload).await,
        }
    }

    /// Releases the underlying socket or port, idempotent
    pub fn close(&mut self) {
        match self {
            CommandLink::Udp(link) => link.close(),
            CommandLink::Serial(link) => link.close(),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            CommandLink::Udp(_) => TransportKind::Udp,
            CommandLink::Serial(_) => TransportKind::Serial,
        }
    }

    /// Human readable target for logs
    pub fn describe(&self) -> String {
        match self {
            CommandLink::Udp(link) => format!("udp://{}", link.target()),
            CommandLink::Serial(link) => format!("serial://{}", link.path()),
        }
    }
}

impl From<UdpCommandSender> for CommandLink {
    fn from(link: UdpCommandSender) -> Self {
        CommandLink::Udp(link)
    }
}

impl From<SerialCommandSender> for CommandLink {
    fn from(link: SerialCommandSender) -> Self {
        CommandLink::Serial(link)
    }
}

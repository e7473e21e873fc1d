//! Error definitions for the command link

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// Target host could not be resolved
    #[error("Failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        source: std::io::Error,
    },

    /// Resolution succeeded but yielded no address
    #[error("No address found for {0}")]
    NoAddress(String),

    #[error("Failed to bind local socket: {0}")]
    Bind(std::io::Error),

    #[error("Failed to send to {target}: {source}")]
    Send {
        target: String,
        source: std::io::Error,
    },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Blocking serial I/O task panicked or was cancelled
    #[error("Serial I/O task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),

    /// The link was closed before the send
    #[error("Link is closed")]
    Closed,
}

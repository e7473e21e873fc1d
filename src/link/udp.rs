//! Fire-and-forget UDP transport
//!
//! One datagram per command, no framing, no acknowledgement. The target is
//! resolved once when the link opens.

use std::net::SocketAddr;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info};

use super::LinkError;

pub const DEFAULT_HOST: &str = "192.168.45.246";
pub const DEFAULT_PORT: u16 = 5005;

#[derive(Debug)]
pub struct UdpCommandSender {
    socket: Option<UdpSocket>,
    target: SocketAddr,
}

impl UdpCommandSender {
    pub async fn open(host: &str, port: u16) -> Result<Self, LinkError> {
        let target_name = format!("{}:{}", host, port);
        let target = lookup_host((host, port))
            .await
            .map_err(|source| LinkError::Resolve {
                target: target_name.clone(),
                source,
            })?
            .next()
            .ok_or(LinkError::NoAddress(target_name))?;

        let bind_addr = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr).await.map_err(LinkError::Bind)?;
        info!(
            "UDP link ready: {} -> {}",
            socket.local_addr().map_err(LinkError::Bind)?,
            target
        );

        Ok(Self {
            socket: Some(socket),
            target,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        let socket = self.socket.as_ref().ok_or(LinkError::Closed)?;
        let sent = socket
            .send_to(payload, self.target)
            .await
            .map_err(|source| LinkError::Send {
                target: self.target.to_string(),
                source,
            })?;
        debug!("Sent {} bytes to {}", sent, self.target);
        Ok(sent)
    }

    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            info!("UDP link to {} closed", self.target);
        }
    }
}

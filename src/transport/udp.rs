//! UDP transport: one datagram per message, no newline framing

use crate::transport::traits::{LinePair, LineReader, LineWriter, TransportConnector};
use anyhow::{bail, Result};
use async_trait::async_trait;
use clinic_shared::{codec, limits::MAX_LINE_LEN};
use std::sync::Arc;
use tokio::net::{lookup_host, UdpSocket};
use tracing::warn;

/// Receiving side of a connected UDP socket
pub struct UdpLineReader {
    socket: Arc<UdpSocket>,
    buf: Vec<u8>,
}

#[async_trait]
impl LineReader for UdpLineReader {
    async fn recv_line(&mut self) -> Result<Option<String>> {
        // Datagrams have no end of stream
        loop {
            let n = self.socket.recv(&mut self.buf).await?;
            match codec::decode_datagram(&self.buf[..n]) {
                Ok(text) => return Ok(Some(text)),
                Err(e) => warn!("Dropping datagram: {}", e),
            }
        }
    }
}

/// Sending side of a connected UDP socket
pub struct UdpLineWriter {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl LineWriter for UdpLineWriter {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        if line.len() > MAX_LINE_LEN {
            bail!("message of {} bytes exceeds the datagram limit", line.len());
        }
        self.socket.send(line.as_bytes()).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// UDP connector; "connecting" pins the peer address
pub struct UdpConnector {
    address: String,
}

impl UdpConnector {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl TransportConnector for UdpConnector {
    async fn connect(&self) -> Result<LinePair> {
        let Some(peer) = lookup_host(&self.address).await?.next() else {
            bail!("cannot resolve {}", self.address);
        };
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;

        let socket = Arc::new(socket);
        Ok((
            Box::new(UdpLineReader {
                socket: socket.clone(),
                buf: vec![0u8; MAX_LINE_LEN + 1],
            }),
            Box::new(UdpLineWriter { socket }),
        ))
    }

    fn name(&self) -> &'static str {
        "UDP"
    }
}

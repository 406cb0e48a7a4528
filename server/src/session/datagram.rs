//! Datagram (connectionless) endpoint handling
//!
//! One socket carries every datagram participant. A single reader task hands
//! decoded messages to the dispatcher and a single writer task drains the
//! outbound queue.

use super::connection::TransportError;
use crate::event::ServerEvent;
use bytes::Bytes;
use clinic_shared::{codec, limits::MAX_LINE_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Handle to send datagrams to any return address
#[derive(Debug, Clone)]
pub struct DatagramSender {
    tx: mpsc::UnboundedSender<(SocketAddr, Bytes)>,
}

impl DatagramSender {
    /// Create a sender together with the queue its writer drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(SocketAddr, Bytes)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message for `addr`
    pub fn send(&self, addr: SocketAddr, text: &str) -> Result<(), TransportError> {
        self.tx
            .send((addr, Bytes::copy_from_slice(text.as_bytes())))
            .map_err(|_| TransportError::DatagramClosed)
    }
}

/// Spawn the reader and writer tasks for the shared datagram socket
pub fn spawn_datagram_endpoint(
    socket: Arc<UdpSocket>,
    events: mpsc::Sender<ServerEvent>,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) -> DatagramSender {
    let (sender, outgoing) = DatagramSender::channel();

    tracker.spawn(write_loop(socket.clone(), outgoing));
    tracker.spawn(read_loop(socket, events, shutdown));

    sender
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    events: mpsc::Sender<ServerEvent>,
    shutdown: CancellationToken,
) {
    // One spare byte so an oversized datagram is detected instead of truncated
    let mut buf = vec![0u8; MAX_LINE_LEN + 1];

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (n, addr) = match received {
            Ok(received) => received,
            Err(e) => {
                // ICMP errors from earlier sends surface here on some platforms
                debug!("Datagram receive error: {}", e);
                continue;
            }
        };

        let text = match codec::decode_datagram(&buf[..n]) {
            Ok(text) => text,
            Err(e) => {
                warn!(%addr, "Dropping datagram: {}", e);
                continue;
            }
        };

        if events.send(ServerEvent::Datagram { addr, text }).await.is_err() {
            break;
        }
    }

    debug!("Datagram reader finished");
}

async fn write_loop(
    socket: Arc<UdpSocket>,
    mut outgoing: mpsc::UnboundedReceiver<(SocketAddr, Bytes)>,
) {
    while let Some((addr, payload)) = outgoing.recv().await {
        if let Err(e) = socket.send_to(&payload, addr).await {
            warn!(%addr, "Datagram send failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_writer_gone_fails() {
        let (sender, outgoing) = DatagramSender::channel();
        drop(outgoing);
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert!(matches!(
            sender.send(addr, "Geçmiş olsun"),
            Err(TransportError::DatagramClosed)
        ));
    }

    #[tokio::test]
    async fn test_endpoint_round_trip() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = server.local_addr().unwrap();
        let (events_tx, mut events) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let sender = spawn_datagram_endpoint(server, events_tx, shutdown.clone(), &tracker);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server_addr).await.unwrap();
        client.send(b"Hasta\n").await.unwrap();

        let addr = match events.recv().await.unwrap() {
            ServerEvent::Datagram { addr, text } => {
                assert_eq!(text, "Hasta");
                addr
            }
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(addr, client.local_addr().unwrap());

        sender.send(addr, "Hoşgeldiniz Hasta1").unwrap();
        let mut buf = [0u8; 128];
        let n = client.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], "Hoşgeldiniz Hasta1".as_bytes());

        shutdown.cancel();
        drop(sender);
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn test_oversized_datagram_dropped() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = server.local_addr().unwrap();
        let (events_tx, mut events) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let _sender = spawn_datagram_endpoint(server, events_tx, shutdown.clone(), &tracker);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server_addr).await.unwrap();

        // Valid prefix, but the whole payload is over the limit
        let mut oversized = b"evet".to_vec();
        oversized.resize(3000, b' ');
        oversized.extend_from_slice(b"xyz");
        client.send(&oversized).await.unwrap();

        let mut at_limit = b"hayir".to_vec();
        at_limit.resize(MAX_LINE_LEN, b' ');
        client.send(&at_limit).await.unwrap();

        match events.recv().await.unwrap() {
            ServerEvent::Datagram { text, .. } => assert_eq!(text, "hayir"),
            other => panic!("unexpected {:?}", other),
        }

        shutdown.cancel();
    }
}

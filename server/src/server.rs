//! Listener wiring: stream accept loop, datagram socket and the dispatch loop

use crate::command::Dispatcher;
use crate::config::ServerConfig;
use crate::event::ServerEvent;
use crate::session::{spawn_datagram_endpoint, spawn_stream_session, ConnId};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// A bound, not yet running dispatcher server
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    socket: Arc<UdpSocket>,
}

impl Server {
    /// Bind the stream listener and the datagram socket on the same address
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr())
            .await
            .with_context(|| format!("binding stream listener on {}", config.bind_addr()))?;
        let addr = listener.local_addr()?;
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("binding datagram socket on {}", addr))?;

        Ok(Self {
            config,
            listener,
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the dispatcher shuts the system down
    pub async fn run(self) -> anyhow::Result<()> {
        let Server {
            config,
            listener,
            socket,
        } = self;

        let stop = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);

        let datagrams = spawn_datagram_endpoint(socket, events_tx.clone(), stop.clone(), &tracker);
        tracker.spawn(accept_loop(
            listener,
            events_tx.clone(),
            stop.clone(),
            tracker.clone(),
        ));
        tracker.spawn(interrupt(events_tx.clone(), stop.clone()));

        let grace = config.shutdown_grace;
        Dispatcher::new(config, events_tx, datagrams, stop.clone())
            .run(events_rx)
            .await;

        stop.cancel();
        tracker.close();
        if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
            warn!("Sessions did not finish within {:?}", grace);
        }

        info!("Server stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: mpsc::Sender<ServerEvent>,
    stop: CancellationToken,
    tracker: TaskTracker,
) {
    let mut next_conn: ConnId = 0;

    loop {
        let accepted = tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                next_conn += 1;
                debug!(conn = next_conn, %addr, "Stream connection accepted");
                spawn_stream_session(stream, addr, next_conn, events.clone(), &stop, &tracker);
            }
            Err(e) => warn!("Accept failed: {}", e),
        }
    }

    debug!("Accept loop finished");
}

/// Turn Ctrl-C into an orderly shutdown
async fn interrupt(events: mpsc::Sender<ServerEvent>, stop: CancellationToken) {
    tokio::select! {
        _ = stop.cancelled() => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Cannot listen for Ctrl-C: {}", e);
                return;
            }
            let _ = events.send(ServerEvent::Interrupt).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_shared::messages;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    async fn recv_datagram(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 1024];
        let (n, _) = socket.recv_from(&mut buf).await.unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_doctor_and_datagram_patient() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let running = tokio::spawn(server.run());

        let scenario = async {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut doctor = BufReader::new(reader).lines();

            writer.write_all(b"Doktor\n").await.unwrap();
            assert_eq!(doctor.next_line().await.unwrap().unwrap(), "Hoşgeldiniz Doktor1");
            assert_eq!(doctor.next_line().await.unwrap().unwrap(), "Doktor1 sisteme bağlandı.");

            let patient = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            patient.send_to(b"Hasta", addr).await.unwrap();
            assert_eq!(recv_datagram(&patient).await, "Hoşgeldiniz Hasta1");
            assert_eq!(doctor.next_line().await.unwrap().unwrap(), "Hasta1 UDP ile bağlandı.");
            assert_eq!(doctor.next_line().await.unwrap().unwrap(), "Hasta1, Doktor1'a atandı.");

            writer.write_all(b"Hasta Kabul\n").await.unwrap();
            assert_eq!(doctor.next_line().await.unwrap().unwrap(), "Hasta1 → Doktor1");
            assert_eq!(recv_datagram(&patient).await, "Hasta1 → Doktor1");
            assert_eq!(recv_datagram(&patient).await, messages::call_prompt("Doktor1"));

            patient.send_to(b"evet", addr).await.unwrap();
            assert_eq!(recv_datagram(&patient).await, messages::GET_WELL);
            assert_eq!(
                doctor.next_line().await.unwrap().unwrap(),
                "Hasta1 Doktor1 randevusunu kabul etti"
            );
            assert_eq!(doctor.next_line().await.unwrap().unwrap(), messages::SHUTDOWN);
            assert_eq!(doctor.next_line().await.unwrap(), None);
        };

        tokio::time::timeout(Duration::from_secs(5), scenario)
            .await
            .expect("scenario stalled");
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = Server::bind(ServerConfig {
            port: 0,
            ..Default::default()
        })
        .await
        .unwrap();
        let taken = first.local_addr().unwrap();

        let second = Server::bind(ServerConfig {
            port: taken.port(),
            ..Default::default()
        })
        .await;
        assert!(second.is_err());
    }
}

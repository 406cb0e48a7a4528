//! Stream (connection-oriented) session handling
//!
//! Every accepted connection gets its own reader and writer task. The reader
//! only decodes lines and hands them to the dispatcher; the writer drains an
//! outbound queue so the dispatcher never blocks on a slow client.

use crate::event::ServerEvent;
use bytes::Bytes;
use clinic_shared::codec::{self, CodecError, LineDecoder};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Server-assigned identifier of a stream connection
pub type ConnId = u64;

/// Errors raised when handing a message to a transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Stream session {0} is closed")]
    SessionClosed(ConnId),

    #[error("Datagram endpoint is closed")]
    DatagramClosed,

    #[error("Encode error: {0}")]
    Codec(#[from] CodecError),
}

/// Instruction for a session's writer task
#[derive(Debug)]
pub enum Outgoing {
    Line(Bytes),
    Close,
}

/// Handle to send lines to a specific stream client
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub conn: ConnId,
    pub addr: SocketAddr,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl SessionHandle {
    /// Create a handle together with the queue its writer drains
    pub fn channel(conn: ConnId, addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { conn, addr, tx }, rx)
    }

    /// Queue a line for this client
    pub fn send(&self, line: &str) -> Result<(), TransportError> {
        let encoded = codec::encode_line(line)?;
        self.tx
            .send(Outgoing::Line(encoded))
            .map_err(|_| TransportError::SessionClosed(self.conn))
    }

    /// Ask the writer to flush queued lines and close the connection
    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

/// Reading side of a stream session
struct StreamReader {
    conn: ConnId,
    reader: OwnedReadHalf,
    decoder: LineDecoder,
    read_buf: Vec<u8>,
}

impl StreamReader {
    fn new(conn: ConnId, reader: OwnedReadHalf) -> Self {
        Self {
            conn,
            reader,
            decoder: LineDecoder::new(),
            read_buf: vec![0u8; 1024],
        }
    }

    /// Read the next line from this session
    /// Returns None if the connection is closed
    async fn recv(&mut self) -> Option<String> {
        loop {
            // First try to decode from existing buffer
            match self.decoder.decode_next() {
                Ok(Some(line)) => return Some(line),
                Ok(None) => {}
                Err(e) => {
                    warn!(conn = self.conn, "Decode error: {}", e);
                    return None;
                }
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return self.decoder.finish().ok().flatten(),
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    debug!(conn = self.conn, "Read error: {}", e);
                    return None;
                }
            }
        }
    }
}

/// Spawn the reader and writer tasks for an accepted connection
pub fn spawn_stream_session(
    stream: TcpStream,
    addr: SocketAddr,
    conn: ConnId,
    events: mpsc::Sender<ServerEvent>,
    shutdown: &CancellationToken,
    tracker: &TaskTracker,
) {
    let (reader, writer) = stream.into_split();
    let (handle, outgoing) = SessionHandle::channel(conn, addr);
    let closed = shutdown.child_token();

    tracker.spawn(write_loop(conn, writer, outgoing, closed.clone()));
    tracker.spawn(read_loop(StreamReader::new(conn, reader), handle, events, closed));
}

async fn read_loop(
    mut reader: StreamReader,
    handle: SessionHandle,
    events: mpsc::Sender<ServerEvent>,
    closed: CancellationToken,
) {
    let (conn, addr) = (handle.conn, handle.addr);
    let mut session = Some(handle);

    loop {
        let line = tokio::select! {
            _ = closed.cancelled() => break,
            line = reader.recv() => line,
        };
        let Some(line) = line else { break };

        // The first line is the registration token
        let event = match session.take() {
            Some(session) => ServerEvent::StreamOpened {
                session,
                token: line,
            },
            None => ServerEvent::StreamLine { conn, line },
        };

        if events.send(event).await.is_err() {
            return;
        }
    }

    debug!(conn, %addr, "Stream reader finished");
    let _ = events.send(ServerEvent::StreamClosed { conn }).await;
}

async fn write_loop(
    conn: ConnId,
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    closed: CancellationToken,
) {
    while let Some(message) = outgoing.recv().await {
        match message {
            Outgoing::Line(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    debug!(conn, "Write error: {}", e);
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }

    let _ = writer.shutdown().await;
    closed.cancel();
}

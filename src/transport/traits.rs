//! Transport trait abstraction for the stream and datagram backends

use anyhow::Result;
use async_trait::async_trait;

/// Receiving half of a connection to the dispatcher
#[async_trait]
pub trait LineReader: Send {
    /// Next message from the server; `None` once the server side is gone
    ///
    /// Must be cancel-safe: it is polled inside `select!`.
    async fn recv_line(&mut self) -> Result<Option<String>>;
}

/// Sending half of a connection to the dispatcher
#[async_trait]
pub trait LineWriter: Send {
    /// Send one message to the server
    async fn send_line(&mut self, line: &str) -> Result<()>;

    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Reader and writer produced by a connector
pub type LinePair = (Box<dyn LineReader>, Box<dyn LineWriter>);

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Attempt to connect, returning both halves on success
    async fn connect(&self) -> Result<LinePair>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

//! TCP transport: newline-delimited lines over one stream

use crate::transport::traits::{LinePair, LineReader, LineWriter, TransportConnector};
use anyhow::Result;
use async_trait::async_trait;
use clinic_shared::codec::{self, LineDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Reading half of a TCP connection
pub struct TcpLineReader {
    inner: OwnedReadHalf,
    decoder: LineDecoder,
    read_buf: Vec<u8>,
    eof: bool,
}

impl TcpLineReader {
    pub fn new(inner: OwnedReadHalf) -> Self {
        Self {
            inner,
            decoder: LineDecoder::new(),
            read_buf: vec![0u8; 1024],
            eof: false,
        }
    }
}

#[async_trait]
impl LineReader for TcpLineReader {
    async fn recv_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.decoder.decode_next()? {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.inner.read(&mut self.read_buf).await?;
            if n == 0 {
                self.eof = true;
                return Ok(self.decoder.finish()?);
            }
            self.decoder.extend(&self.read_buf[..n]);
        }
    }
}

/// Writing half of a TCP connection
pub struct TcpLineWriter {
    inner: OwnedWriteHalf,
}

impl TcpLineWriter {
    pub fn new(inner: OwnedWriteHalf) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LineWriter for TcpLineWriter {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        let encoded = codec::encode_line(line)?;
        self.inner.write_all(&encoded).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// TCP connector for connecting to the dispatcher
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(&self) -> Result<LinePair> {
        let stream = TcpStream::connect(&self.address).await?;
        let (reader, writer) = stream.into_split();
        Ok((
            Box::new(TcpLineReader::new(reader)),
            Box::new(TcpLineWriter::new(writer)),
        ))
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}

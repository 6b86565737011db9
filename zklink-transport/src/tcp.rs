//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use zklink_core::{StreamDeframer, TransportKind, constants::CLOSE_GRACE};

use crate::{FrameReader, Transport, error::*};

/// TCP transport for ZKTeco devices
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    writer: Option<OwnedWriteHalf>,
    reader: Option<OwnedReadHalf>,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            writer: None,
            reader: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::connect_failed)?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        let (reader, writer) = stream.into_split();
        self.reader = Some(reader);
        self.writer = Some(writer);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.reader = None;

        if let Some(mut writer) = self.writer.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Half-close; the socket is dropped regardless once the grace period ends
            if timeout(CLOSE_GRACE, writer.shutdown()).await.is_err() {
                warn!("TCP shutdown did not complete within {:?}", CLOSE_GRACE);
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(&data[..data.len().min(32)]));

        writer.write_all(data).await.map_err(Error::WriteError)?;
        writer.flush().await.map_err(Error::WriteError)?;

        Ok(())
    }

    fn take_reader(&mut self) -> Option<Box<dyn FrameReader>> {
        self.reader.take().map(|read| {
            Box::new(TcpFrameReader {
                read,
                deframer: StreamDeframer::new(),
                scratch: BytesMut::with_capacity(64 * 1024),
            }) as Box<dyn FrameReader>
        })
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}

/// Read half of a TCP connection, reassembling wrapped frames
struct TcpFrameReader {
    read: OwnedReadHalf,
    deframer: StreamDeframer,
    scratch: BytesMut,
}

#[async_trait]
impl FrameReader for TcpFrameReader {
    async fn next_frame(&mut self) -> Result<Option<BytesMut>> {
        loop {
            match self.deframer.next_frame() {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => {}
                // Already logged and discarded by the deframer
                Err(_) => continue,
            }

            self.scratch.clear();
            let n = self.read.read_buf(&mut self.scratch).await?;
            if n == 0 {
                debug!(buffered = self.deframer.len(), "TCP stream closed by remote");
                return Ok(None);
            }

            trace!("Received {} bytes: {}", n, hex::encode(&self.scratch[..n.min(32)]));
            self.deframer.extend(&self.scratch);
        }
    }
}

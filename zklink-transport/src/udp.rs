//! UDP transport for ZKTeco devices
//!
//! The packet format is the same as TCP minus the 8-byte wrapper; every
//! datagram carries exactly one frame.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};
use zklink_core::TransportKind;

use crate::{FrameReader, Transport, error::*};

/// Largest datagram a device sends in one piece
const MAX_DATAGRAM: usize = 64 * 1024;

/// UDP transport for ZKTeco devices
///
/// Binds a local port (ephemeral unless configured) and connects it to
/// the device so that only its datagrams are received.
pub struct UdpTransport {
    addr: String,
    port: u16,
    local_port: u16,
    socket: Option<Arc<UdpSocket>>,
    reader_taken: bool,
    remote_addr: Option<SocketAddr>,
    connect_timeout: Duration,
}

impl UdpTransport {
    /// Create new UDP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            local_port: 0,
            socket: None,
            reader_taken: false,
            remote_addr: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Bind this local port instead of an ephemeral one
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.remote_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let resolve = tokio::net::lookup_host(addr_str.clone());
        let addrs: Vec<SocketAddr> = tokio::time::timeout(self.connect_timeout, resolve)
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.remote_addr = Some(*addr);
        Ok(*addr)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let remote = self.resolve_addr().await?;

        let unspecified = match remote.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let local = SocketAddr::new(unspecified, self.local_port);

        debug!("Binding {} for UDP to {}...", local, remote);

        let socket = UdpSocket::bind(local).await.map_err(Error::connect_failed)?;

        // Connect to remote address (sets default send/recv target)
        socket.connect(remote).await.map_err(Error::connect_failed)?;

        debug!("Connected to {} via UDP", remote);

        self.socket = Some(Arc::new(socket));
        self.reader_taken = false;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!("Disconnecting from {}...", self.remote_addr());
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        trace!(
            "Sending {} bytes via UDP: {}",
            data.len(),
            hex::encode(&data[..data.len().min(32)])
        );

        socket.send(data).await.map_err(Error::WriteError)?;

        Ok(())
    }

    fn take_reader(&mut self) -> Option<Box<dyn FrameReader>> {
        if self.reader_taken {
            return None;
        }

        let socket = Arc::clone(self.socket.as_ref()?);
        self.reader_taken = true;
        Some(Box::new(UdpFrameReader { socket }))
    }

    fn remote_addr(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

/// Receive side of a connected UDP socket
struct UdpFrameReader {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl FrameReader for UdpFrameReader {
    async fn next_frame(&mut self) -> Result<Option<BytesMut>> {
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM);

        loop {
            match self.socket.recv(&mut buf).await {
                Ok(0) => {
                    trace!("Ignoring empty datagram");
                }
                Ok(n) => {
                    buf.truncate(n);
                    trace!("Received {} bytes via UDP: {}", n, hex::encode(&buf[..n.min(32)]));
                    return Ok(Some(buf));
                }
                // ICMP port unreachable from an earlier send; the device may still answer
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    warn!("UDP peer reported unreachable: {}", e);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

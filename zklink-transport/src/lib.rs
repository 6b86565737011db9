//! Transport layer for ZKTeco protocol
//!
//! Provides TCP/UDP communication with devices. Each transport owns its
//! socket and hands out a single [`FrameReader`] so that exactly one task
//! reads inbound frames while the owner keeps writing.

pub mod error;
pub mod tcp;
pub mod udp;

pub use error::{ConnectFailure, Error, Result};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;
pub use zklink_core::TransportKind;

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for different communication methods
#[async_trait]
pub trait Transport: Send + Sync {
    /// Framing used on this transport
    fn kind(&self) -> TransportKind;

    /// Open the socket
    async fn connect(&mut self) -> Result<()>;

    /// Close the socket, bounded by the close grace period
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if a socket is open
    fn is_connected(&self) -> bool;

    /// Send one encoded frame
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Hand out the inbound half; `None` once taken or while disconnected
    fn take_reader(&mut self) -> Option<Box<dyn FrameReader>>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}

/// Inbound half of a transport, yielding whole frames
#[async_trait]
pub trait FrameReader: Send {
    /// Next complete frame, or `None` once the peer closed the socket
    async fn next_frame(&mut self) -> Result<Option<BytesMut>>;
}

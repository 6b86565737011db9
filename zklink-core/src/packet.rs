//! ZKTeco protocol packet structure and encoding/decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::{self, Command},
    error::{Error, Result},
    framing::{self, TransportKind},
    HEADER_SIZE,
};

/// Decoded packet header
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────┬─────────────┐
/// │   Command   │  Checksum   │  SessionID  │  ReplyID    │
/// │   2 bytes   │   2 bytes   │   2 bytes   │   2 bytes   │
/// └─────────────┴─────────────┴─────────────┴─────────────┘
/// ```
///
/// All multi-byte values are little-endian. Over TCP the header follows the
/// 8-byte wrapper described in [`crate::framing`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub command_id: u16,
    pub checksum: u16,
    pub session_id: u16,
    pub reply_id: u16,
}

/// Routing class of an inbound frame
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameClass {
    /// Reply, acknowledgement or dataset frame for the pending command
    Reply,
    /// Unsolicited push from the device
    Event,
}

impl PacketHeader {
    /// Parse the header of a frame, returning it and the payload offset
    ///
    /// # Errors
    ///
    /// `PacketTooShort` when `buf` cannot hold the header of its framing,
    /// `BadMarker` when a TCP wrapper is not recognised.
    pub fn parse(kind: TransportKind, buf: &[u8]) -> Result<(Self, usize)> {
        let offset = kind.header_len();
        if buf.len() < offset {
            return Err(Error::PacketTooShort {
                expected: offset,
                actual: buf.len(),
            });
        }

        if kind == TransportKind::Tcp {
            let declared = framing::read_tcp_wrapper(buf)?;
            if declared < HEADER_SIZE {
                return Err(Error::PacketTooShort {
                    expected: HEADER_SIZE,
                    actual: declared,
                });
            }
        }

        let mut header = &buf[kind.wrapper_len()..offset];
        let parsed = Self {
            command_id: header.get_u16_le(),
            checksum: header.get_u16_le(),
            session_id: header.get_u16_le(),
            reply_id: header.get_u16_le(),
        };

        Ok((parsed, offset))
    }

    /// Known command for this header, if any
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command_id).ok()
    }

    /// Route this frame to the pending command or the event listener
    pub fn class(&self) -> FrameClass {
        match self.command() {
            Some(cmd) if cmd.is_event() => FrameClass::Event,
            _ => FrameClass::Reply,
        }
    }
}

/// Classify raw frame bytes without decoding the payload
pub fn classify(kind: TransportKind, buf: &[u8]) -> Result<FrameClass> {
    PacketHeader::parse(kind, buf).map(|(header, _)| header.class())
}

/// ZKTeco protocol packet
///
/// # Examples
///
/// ```
/// use zklink_core::{Command, Packet, TransportKind};
///
/// let packet = Packet::new(Command::Connect, 0, 0);
/// let encoded = packet.encode(TransportKind::Udp);
///
/// let decoded = Packet::decode(TransportKind::Udp, encoded).unwrap();
/// assert_eq!(decoded.command(), Some(Command::Connect));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw command code (devices may send codes outside [`Command`])
    pub command_id: u16,

    /// Session identifier (assigned by device on connect)
    pub session_id: u16,

    /// Reply number (increments per command in session)
    pub reply_id: u16,

    /// Packet payload (command-specific data)
    pub payload: Bytes,

    /// Checksum as received, for decoded packets
    wire_checksum: Option<u16>,
}

impl Packet {
    /// Packet header size in bytes
    pub const HEADER_SIZE: usize = HEADER_SIZE;

    /// Create a new packet with empty payload
    pub fn new(command: Command, session_id: u16, reply_id: u16) -> Self {
        Self::with_payload(command, session_id, reply_id, Bytes::new())
    }

    /// Create a packet with payload
    ///
    /// # Examples
    ///
    /// ```
    /// use zklink_core::{Packet, Command};
    ///
    /// let packet = Packet::with_payload(Command::DataRdy, 1234, 7, vec![0; 8]);
    /// assert_eq!(packet.payload.len(), 8);
    /// ```
    pub fn with_payload(
        command: Command,
        session_id: u16,
        reply_id: u16,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            command_id: command.into(),
            session_id,
            reply_id,
            payload: payload.into(),
            wire_checksum: None,
        }
    }

    /// Known command for this packet, if any
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command_id).ok()
    }

    /// Check the packet's command code
    pub fn is(&self, command: Command) -> bool {
        self.command_id == u16::from(command)
    }

    /// Calculate checksum for this packet
    pub fn checksum(&self) -> u16 {
        checksum::calculate(self.command_id, self.session_id, self.reply_id, &self.payload)
    }

    /// Header fields as they go on the wire
    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            command_id: self.command_id,
            checksum: self.wire_checksum.unwrap_or_else(|| self.checksum()),
            session_id: self.session_id,
            reply_id: self.reply_id,
        }
    }

    /// Routing class of this packet
    pub fn class(&self) -> FrameClass {
        self.header().class()
    }

    /// Encode packet for the given transport
    ///
    /// # Examples
    ///
    /// ```
    /// use zklink_core::{Packet, Command, TransportKind};
    ///
    /// let packet = Packet::new(Command::Connect, 0, 0);
    /// assert_eq!(packet.encode(TransportKind::Udp).len(), 8);
    /// assert_eq!(packet.encode(TransportKind::Tcp).len(), 16);
    /// ```
    pub fn encode(&self, kind: TransportKind) -> BytesMut {
        let inner_len = HEADER_SIZE + self.payload.len();
        let mut buf = BytesMut::with_capacity(kind.wrapper_len() + inner_len);

        if kind == TransportKind::Tcp {
            framing::put_tcp_wrapper(&mut buf, inner_len);
        }

        buf.put_u16_le(self.command_id);
        buf.put_u16_le(self.checksum());
        buf.put_u16_le(self.session_id);
        buf.put_u16_le(self.reply_id);
        buf.put_slice(&self.payload);

        buf
    }

    /// Decode one frame of the given transport
    ///
    /// The checksum is recorded but not enforced; see [`Packet::verify_checksum`].
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is shorter than the header of its
    /// framing, or if a TCP wrapper is invalid or declares more bytes than
    /// the buffer holds.
    pub fn decode(kind: TransportKind, mut buf: BytesMut) -> Result<Self> {
        let (header, offset) = PacketHeader::parse(kind, &buf)?;

        if kind == TransportKind::Tcp {
            let frame_len = kind.wrapper_len() + framing::read_tcp_wrapper(&buf)?;
            if frame_len > buf.len() {
                return Err(Error::LengthMismatch {
                    declared: frame_len,
                    available: buf.len(),
                });
            }
            buf.truncate(frame_len);
        }

        buf.advance(offset);

        Ok(Self {
            command_id: header.command_id,
            session_id: header.session_id,
            reply_id: header.reply_id,
            payload: buf.freeze(),
            wire_checksum: Some(header.checksum),
        })
    }

    /// Check the received checksum against the packet contents
    pub fn verify_checksum(&self) -> Result<()> {
        match self.wire_checksum {
            Some(received) if received != self.checksum() => Err(Error::ChecksumMismatch {
                expected: self.checksum(),
                received,
            }),
            _ => Ok(()),
        }
    }

    /// Check if this is a response packet (ACK)
    pub fn is_response(&self) -> bool {
        self.command().is_some_and(Command::is_response)
    }

    /// Check if this is a success response
    pub fn is_success(&self) -> bool {
        self.command().is_some_and(Command::is_success)
    }

    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        self.command().is_some_and(Command::is_error)
    }

    /// Get total packet size (without transport wrapper)
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("command", &command::describe(self.command_id))
            .field("session_id", &format!("0x{:04X}", self.session_id))
            .field("reply_id", &self.reply_id)
            .field("checksum", &format!("0x{:04X}", self.header().checksum))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet[{}](session={}, reply={}, len={})",
            command::describe(self.command_id),
            self.session_id,
            self.reply_id,
            self.payload.len()
        )
    }
}

//! Transport framings and TCP stream deframing
//!
//! UDP datagram boundaries are frame boundaries. TCP is a byte stream: every
//! frame is prefixed with an 8-byte wrapper carrying a marker and the length
//! of the inner packet, and one socket read may hold a partial frame, a whole
//! frame or several frames back to back.
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬─────────────────────────┐
//! │  0x5050  │  0x7D82  │ inner length │ header (8) + payload (N)│
//! │ 2 bytes  │ 2 bytes  │   4 bytes    │                         │
//! └──────────┴──────────┴──────────────┴─────────────────────────┘
//! ```

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{trace, warn};

use crate::{
    constants::{MAX_FRAME_SIZE, TCP_MAGIC_1, TCP_MAGIC_2},
    error::{Error, Result},
    HEADER_SIZE,
};

/// Which socket type a frame travels over
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Connection-oriented, wrapped frames
    Tcp,
    /// Connectionless, bare frames
    Udp,
}

impl TransportKind {
    /// Size of the outer wrapper in front of the packet header
    pub fn wrapper_len(self) -> usize {
        match self {
            Self::Tcp => TCP_WRAPPER_SIZE,
            Self::Udp => 0,
        }
    }

    /// Minimum size of a frame on this transport
    pub fn header_len(self) -> usize {
        self.wrapper_len() + HEADER_SIZE
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("TCP"),
            Self::Udp => f.write_str("UDP"),
        }
    }
}

/// TCP wrapper size
pub const TCP_WRAPPER_SIZE: usize = 8;

/// Write the TCP wrapper for an inner packet of `inner_len` bytes
pub fn put_tcp_wrapper(buf: &mut BytesMut, inner_len: usize) {
    buf.put_u16_le(TCP_MAGIC_1);
    buf.put_u16_le(TCP_MAGIC_2);
    buf.put_u32_le(inner_len as u32);
}

/// Read the TCP wrapper at the start of `buf`, returning the declared inner length
pub fn read_tcp_wrapper(mut buf: &[u8]) -> Result<usize> {
    if buf.len() < TCP_WRAPPER_SIZE {
        return Err(Error::PacketTooShort {
            expected: TCP_WRAPPER_SIZE,
            actual: buf.len(),
        });
    }

    let magic_1 = buf.get_u16_le();
    let magic_2 = buf.get_u16_le();
    if magic_1 != TCP_MAGIC_1 || magic_2 != TCP_MAGIC_2 {
        let mut found = Vec::with_capacity(4);
        found.extend_from_slice(&magic_1.to_le_bytes());
        found.extend_from_slice(&magic_2.to_le_bytes());
        return Err(Error::BadMarker {
            found: hex::encode(found),
        });
    }

    let declared = buf.get_u32_le() as usize;
    if declared > MAX_FRAME_SIZE {
        return Err(Error::PayloadTooLarge {
            size: declared,
            max: MAX_FRAME_SIZE,
        });
    }

    Ok(declared)
}

/// Rolling buffer that slices complete TCP frames out of stream deliveries
///
/// # Examples
///
/// ```
/// use zklink_core::{Command, Packet, StreamDeframer, TransportKind};
///
/// let frame = Packet::new(Command::AckOk, 7, 1).encode(TransportKind::Tcp);
/// let mut deframer = StreamDeframer::new();
///
/// // Half a frame yields nothing yet
/// assert!(deframer.push(&frame[..10]).unwrap().is_empty());
/// // The rest completes it
/// let frames = deframer.push(&frame[10..]).unwrap();
/// assert_eq!(frames.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct StreamDeframer {
    buffer: BytesMut,
}

impl StreamDeframer {
    /// Create an empty deframer
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
        }
    }

    /// Append one socket delivery and return every frame it completes
    ///
    /// Incomplete trailing bytes stay buffered for the next push.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<BytesMut>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Append one socket delivery without extracting frames
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Split off exactly one frame (wrapper included) if the buffer holds it
    ///
    /// On a bad marker the buffered bytes are discarded so the stream can
    /// recover at the next delivery.
    pub fn next_frame(&mut self) -> Result<Option<BytesMut>> {
        if self.buffer.len() < TCP_WRAPPER_SIZE {
            return Ok(None);
        }

        let declared = match read_tcp_wrapper(&self.buffer) {
            Ok(declared) => declared,
            Err(e) => {
                warn!(discarded = self.buffer.len(), "Dropping unframeable TCP bytes: {}", e);
                self.buffer.clear();
                return Err(e);
            }
        };

        let frame_len = TCP_WRAPPER_SIZE + declared;
        if self.buffer.len() < frame_len {
            trace!(
                buffered = self.buffer.len(),
                needed = frame_len,
                "Waiting for rest of TCP frame"
            );
            return Ok(None);
        }

        Ok(Some(self.buffer.split_to(frame_len)))
    }

    /// Number of buffered bytes not yet forming a frame
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Command, Packet};
    use pretty_assertions::assert_eq;

    fn tcp_frame(command: Command, reply_id: u16, payload: &[u8]) -> BytesMut {
        Packet::with_payload(command, 0x1234, reply_id, payload.to_vec()).encode(TransportKind::Tcp)
    }

    #[test]
    fn test_wrapper_layout() {
        let mut buf = BytesMut::new();
        put_tcp_wrapper(&mut buf, 8);
        assert_eq!(&buf[..], &[0x50, 0x50, 0x82, 0x7D, 0x08, 0x00, 0x00, 0x00]);
        assert_eq!(read_tcp_wrapper(&buf).unwrap(), 8);
    }

    #[test]
    fn test_bad_marker() {
        let buf = [0u8; 8];
        assert!(matches!(read_tcp_wrapper(&buf), Err(Error::BadMarker { .. })));
    }

    #[test]
    fn test_partial_frame_waits() {
        let frame = tcp_frame(Command::Data, 1, &[9; 100]);
        let mut deframer = StreamDeframer::new();

        assert!(deframer.push(&frame[..5]).unwrap().is_empty());
        assert!(deframer.push(&frame[5..50]).unwrap().is_empty());
        let frames = deframer.push(&frame[50..]).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame[..]);
        assert!(deframer.is_empty());
    }

    #[test]
    fn test_concatenated_frames_split() {
        let first = tcp_frame(Command::PrepareData, 1, &[0; 8]);
        let second = tcp_frame(Command::Data, 1, &[1, 2, 3]);
        let third = tcp_frame(Command::AckOk, 1, &[]);

        let mut stream = Vec::new();
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&second);
        stream.extend_from_slice(&third[..4]);

        let mut deframer = StreamDeframer::new();
        let frames = deframer.push(&stream).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &first[..]);
        assert_eq!(&frames[1][..], &second[..]);
        assert_eq!(deframer.len(), 4);

        let frames = deframer.push(&third[4..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &third[..]);
    }

    #[test]
    fn test_garbage_is_discarded() {
        let mut deframer = StreamDeframer::new();
        assert!(deframer.push(&[0xAA; 12]).is_err());
        assert!(deframer.is_empty());

        let frame = tcp_frame(Command::AckOk, 2, &[]);
        assert_eq!(deframer.push(&frame).unwrap().len(), 1);
    }

    #[test]
    fn test_kind_sizes() {
        assert_eq!(TransportKind::Tcp.header_len(), 16);
        assert_eq!(TransportKind::Udp.header_len(), 8);
        assert_eq!(TransportKind::Udp.to_string(), "UDP");
    }
}

//! Error types for zklink-core

/// Result type alias for zklink-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is shorter than the header of its framing
    #[error("Packet too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// TCP wrapper does not start with the protocol marker
    #[error("Invalid TCP frame marker: {found}")]
    BadMarker {
        found: String,
    },

    /// TCP wrapper declares more bytes than the frame holds
    #[error("Declared frame length {declared} exceeds available {available} bytes")]
    LengthMismatch {
        declared: usize,
        available: usize,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Unknown command code
    #[error("Unknown command code: {0}")]
    UnknownCommand(u16),

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Declared frame length beyond what any device sends
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },
}

impl Error {
    /// Check if the error means the bytes on the wire could not be framed
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::PacketTooShort { .. }
                | Self::BadMarker { .. }
                | Self::LengthMismatch { .. }
                | Self::ChecksumMismatch { .. }
                | Self::PayloadTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_classification() {
        assert!(Error::PacketTooShort { expected: 8, actual: 3 }.is_malformed());
        assert!(Error::BadMarker { found: "00000000".into() }.is_malformed());
        assert!(!Error::UnknownCommand(9999).is_malformed());
        assert!(!Error::InvalidSessionState("x".into()).is_malformed());
    }
}

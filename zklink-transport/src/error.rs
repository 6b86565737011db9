//! Transport errors

use std::{fmt, io};

pub type Result<T> = std::result::Result<T, Error>;

/// Why a socket could not be opened
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The peer actively refused the connection
    Refused,
    /// The local bind address is taken
    AddrInUse,
    /// Anything else (unreachable, timeout, resolution...)
    Other,
}

impl ConnectFailure {
    /// Classify an OS-level connect/bind error
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused,
            io::ErrorKind::AddrInUse => Self::AddrInUse,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused => f.write_str("connection refused"),
            Self::AddrInUse => f.write_str("address in use"),
            Self::Other => f.write_str("other"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connect failed ({cause}): {source}")]
    ConnectFailed {
        cause: ConnectFailure,
        #[source]
        source: io::Error,
    },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Write failed: {0}")]
    WriteError(#[source] io::Error),

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Wrap a connect/bind error with its classified cause
    pub fn connect_failed(source: io::Error) -> Self {
        Self::ConnectFailed {
            cause: ConnectFailure::from_io(&source),
            source,
        }
    }

    /// Cause of a failed connect, if this is one
    pub fn connect_failure(&self) -> Option<ConnectFailure> {
        match self {
            Self::ConnectFailed { cause, .. } => Some(*cause),
            Self::ConnectionTimeout | Self::InvalidAddress(_) => Some(ConnectFailure::Other),
            _ => None,
        }
    }
}

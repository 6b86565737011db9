//! High-level error types

use std::time::Duration;

use bytes::Bytes;
use zklink_core::{Command, TransportKind, command::describe};
pub use zklink_transport::ConnectFailure;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] zklink_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] zklink_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] zklink_types::Error),

    #[error("Device not connected")]
    NotConnected,

    #[error("No reply to {command} within {after:?}")]
    Timeout { command: Command, after: Duration },

    #[error("Transfer stalled after {received} of {total} bytes")]
    TransferTimeout {
        received: usize,
        total: usize,
        partial: Bytes,
    },

    #[error("Unhandled reply to {command}: {}", describe(*received))]
    UnhandledCommand { command: Command, received: u16 },

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Malformed reply to {command}: {reason}")]
    MalformedReply { command: Command, reason: String },

    #[error("{command} over {transport} to {address} failed: {source}")]
    Context {
        transport: TransportKind,
        command: &'static str,
        address: String,
        #[source]
        source: Box<Error>,
    },
}

/// Failure categories callers can match on
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotConnected,
    Timeout,
    TransferTimeout,
    WriteError,
    MalformedPacket,
    UnhandledCommand,
    ConnectionLost,
    ConnectFailed(ConnectFailure),
    Other,
}

impl Error {
    /// Category of this error, looking through any context
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Context { source, .. } => source.kind(),
            Self::NotConnected => ErrorKind::NotConnected,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::TransferTimeout { .. } => ErrorKind::TransferTimeout,
            Self::UnhandledCommand { .. } => ErrorKind::UnhandledCommand,
            Self::ConnectionLost => ErrorKind::ConnectionLost,
            Self::MalformedReply { .. } => ErrorKind::MalformedPacket,
            Self::Core(e) if e.is_malformed() => ErrorKind::MalformedPacket,
            Self::Core(zklink_core::Error::UnknownCommand(_)) => ErrorKind::UnhandledCommand,
            Self::Core(_) => ErrorKind::Other,
            Self::Transport(e) => transport_kind(e),
            Self::Types(zklink_types::Error::Validation(_)) => ErrorKind::Other,
            Self::Types(_) => ErrorKind::MalformedPacket,
        }
    }

    /// Bytes assembled before a transfer stalled
    pub fn partial_data(&self) -> Option<&Bytes> {
        match self {
            Self::Context { source, .. } => source.partial_data(),
            Self::TransferTimeout { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Strip any context and return the underlying error
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

fn transport_kind(e: &zklink_transport::Error) -> ErrorKind {
    use zklink_transport::Error as E;

    match e {
        E::NotConnected => ErrorKind::NotConnected,
        E::WriteError(_) => ErrorKind::WriteError,
        E::ConnectionClosed | E::Io(_) => ErrorKind::ConnectionLost,
        E::AlreadyConnected => ErrorKind::Other,
        other => other
            .connect_failure()
            .map(ErrorKind::ConnectFailed)
            .unwrap_or(ErrorKind::Other),
    }
}

//! # zklink-core
//!
//! Core protocol implementation for ZKTeco biometric devices.
//!
//! This crate provides the low-level protocol primitives:
//! - Packet structure and encoding/decoding for both TCP and UDP framings
//! - Checksum calculation
//! - Stream deframing for TCP deliveries
//! - Reply/event classification of inbound frames
//! - Command definitions and protocol constants
//! - Per-connection session bookkeeping

pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod framing;
pub mod packet;
pub mod session;

pub use command::Command;
pub use error::{Error, Result};
pub use framing::{StreamDeframer, TransportKind};
pub use packet::{FrameClass, Packet, PacketHeader, classify};
pub use session::{Session, SessionState};

/// Default device port
pub const DEFAULT_PORT: u16 = 4370;

/// Packet header size
pub const HEADER_SIZE: usize = 8;

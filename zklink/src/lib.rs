//! # zklink
//!
//! Client for the ZKTeco attendance terminal protocol.
//!
//! ## Features
//!
//! - TCP first, UDP fallback when TCP is refused
//! - Chunked bulk reads of users and attendance logs with progress
//! - Realtime attendance events
//! - Async/await API using Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use zklink::Device;
//!
//! #[tokio::main]
//! async fn main() -> zklink::Result<()> {
//!     // Connect to device
//!     let mut device = Device::new("192.168.1.201", 4370);
//!     device.connect().await?;
//!
//!     // Get device info
//!     let info = device.get_device_info().await?;
//!     println!("{}", info);
//!
//!     // Disconnect
//!     device.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod realtime;

mod ops;

// Re-exports
pub use channel::CommandChannel;
pub use config::DeviceConfig;
pub use device::{ConnectionState, Device};
pub use error::{ConnectFailure, Error, ErrorKind, Result};

// Re-export types
pub use zklink_core::{Command, Packet, Session, TransportKind};
pub use zklink_types::{Attendance, DeviceCapacity, DeviceInfo, RealtimeEvent, User, UserRole};
pub use chrono::NaiveDateTime;

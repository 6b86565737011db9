//! Type definitions for zklink
//!
//! Fixed-layout records exchanged with the device and the packed time format
//! they share. Every record comes in a TCP and a UDP layout.

pub mod attendance;
pub mod device_info;
pub mod error;
pub mod event;
pub mod time;
pub mod user;

mod text;

pub use attendance::Attendance;
pub use device_info::{DeviceCapacity, DeviceInfo};
pub use error::{Error, Result};
pub use event::RealtimeEvent;
pub use user::{User, UserRole};

//! Realtime attendance events
//!
//! Pushed by the device after `CMD_REG_EVENT` with `command_id` 500. Only
//! the payload (after the header) is decoded here.

use std::fmt;

use chrono::NaiveDateTime;

use crate::{
    error::{Error, Result},
    text::read_field,
    time,
};

/// Event payload size over TCP (52-byte frame)
pub const TCP_PAYLOAD_SIZE: usize = 36;

/// Event payload size over UDP (18-byte frame)
pub const UDP_PAYLOAD_SIZE: usize = 10;

/// Attendance event delivered as it happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeEvent {
    /// Enrollment number of the user
    pub user_id: String,

    /// When the event happened, device local time
    pub timestamp: NaiveDateTime,
}

impl RealtimeEvent {
    /// Decode a TCP event payload: user id ASCII @0..9, stamp @26..32
    pub fn from_tcp_payload(payload: &[u8]) -> Result<Self> {
        Error::check_len(payload, TCP_PAYLOAD_SIZE)?;

        Ok(Self {
            user_id: read_field(&payload[0..9]),
            timestamp: time::decode_stamp(&payload[26..32])?,
        })
    }

    /// Decode a UDP event payload: user id u8 @0, stamp @4..10
    pub fn from_udp_payload(payload: &[u8]) -> Result<Self> {
        Error::check_len(payload, UDP_PAYLOAD_SIZE)?;

        Ok(Self {
            user_id: payload[0].to_string(),
            timestamp: time::decode_stamp(&payload[4..10])?,
        })
    }
}

impl fmt::Display for RealtimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.user_id, self.timestamp)
    }
}

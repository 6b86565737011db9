//! Protocol constants

use std::time::Duration;

/// First half of the TCP wrapper marker (`50 50`)
pub const TCP_MAGIC_1: u16 = 0x5050;
/// Second half of the TCP wrapper marker (`82 7D`)
pub const TCP_MAGIC_2: u16 = 0x7D82;

/// Largest slice of a dataset requested with one `CMD_DATA_RDY`
pub const MAX_CHUNK: usize = 0xFFC0;

/// Reply window for CONNECT and EXIT
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default reply window for every other command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for a transport close before the socket is dropped
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Bulk transfer inactivity window over TCP
pub const TCP_TRANSFER_TIMEOUT: Duration = Duration::from_secs(10);

/// Bulk transfer inactivity window over UDP
pub const UDP_TRANSFER_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on a declared TCP frame length
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Fixed record sizes, per transport
pub mod records {
    /// User record over TCP
    pub const USER_TCP: usize = 72;

    /// User record over UDP
    pub const USER_UDP: usize = 28;

    /// Attendance record over TCP
    pub const ATTENDANCE_TCP: usize = 40;

    /// Attendance record over UDP
    pub const ATTENDANCE_UDP: usize = 16;

    /// Length prefix in front of every bulk dataset
    pub const DATASET_PREFIX: usize = 4;
}

/// Request payloads sent with fixed commands
pub mod requests {
    /// `CMD_DATA_WRRQ` selector for the user table
    pub const GET_USERS: [u8; 11] = [0x01, 0x09, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

    /// `CMD_DATA_WRRQ` selector for the attendance log
    pub const GET_ATTENDANCE_LOGS: [u8; 11] =
        [0x01, 0x0d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

    /// `CMD_DISABLEDEVICE` payload
    pub const DISABLE_DEVICE: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

    /// `CMD_TESTVOICE` payload
    pub const TEST_VOICE: [u8; 2] = [0x00, 0x00];

    /// Payload size of `CMD_SET_TIME`
    pub const SET_TIME_LEN: usize = 32;
}

/// Real-time event flags
pub mod events {
    /// Attendance log event
    pub const EF_ATTLOG: u32 = 1;

    /// Fingerprint pressed
    pub const EF_FINGER: u32 = 1 << 1;

    /// User enrolled
    pub const EF_ENROLLUSER: u32 = 1 << 2;

    /// Fingerprint enrolled
    pub const EF_ENROLLFINGER: u32 = 1 << 3;

    /// Button pressed
    pub const EF_BUTTON: u32 = 1 << 4;

    /// Door unlocked
    pub const EF_UNLOCK: u32 = 1 << 5;

    /// Verification event
    pub const EF_VERIFY: u32 = 1 << 7;

    /// Fingerprint minutiae captured
    pub const EF_FPFTR: u32 = 1 << 8;

    /// Alarm signal
    pub const EF_ALARM: u32 = 1 << 9;
}

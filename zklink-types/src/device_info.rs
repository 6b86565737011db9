//! Device information structures

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Option keys understood by `CMD_OPTIONS_RRQ`
pub mod keys {
    pub const SERIAL_NUMBER: &str = "~SerialNumber";
    pub const FINGERPRINT_VERSION: &str = "~ZKFPVersion";
    pub const VENDOR: &str = "~OEMVendor";
    pub const DEVICE_NAME: &str = "~DeviceName";
    pub const PLATFORM: &str = "~Platform";
    pub const OS: &str = "~OS";
    pub const MAC_ADDRESS: &str = "MAC";
    pub const WORK_CODE: &str = "WorkCode";
    pub const PIN_WIDTH: &str = "~PIN2Width";
    pub const FACE_FUNCTION: &str = "FaceFunOn";
    pub const SSR: &str = "~SSR";
    pub const PRODUCT_TIME: &str = "~ProductTime";
}

/// Extract the value from a `key=value\0` option reply
///
/// # Examples
///
/// ```
/// use zklink_types::device_info::option_value;
///
/// assert_eq!(option_value("~OS", b"~OS=1\0"), "1");
/// ```
pub fn option_value(key: &str, payload: &[u8]) -> String {
    let text: String = String::from_utf8_lossy(payload).chars().filter(|&c| c != '\0').collect();
    let prefix = format!("{key}=");
    text.strip_prefix(&prefix).unwrap_or(&text).trim().to_string()
}

/// Device information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device serial number
    pub serial_number: String,

    /// Firmware version
    pub firmware_version: String,

    /// Manufacturer as configured by the OEM
    pub vendor: Option<String>,

    /// Platform name
    pub platform: Option<String>,

    /// Device name (user-assigned)
    pub device_name: Option<String>,

    /// Operating system flag
    pub os: Option<String>,

    /// MAC address
    pub mac_address: Option<String>,

    /// Fingerprint algorithm version
    pub fingerprint_version: Option<String>,

    /// Work code support
    pub work_code: Option<String>,

    /// Width of the PIN field
    pub pin_width: Option<String>,

    /// Whether face recognition is on
    pub face_function: Option<bool>,

    /// Self-service recorder flag
    pub ssr: Option<String>,

    /// Manufacturing date
    pub product_time: Option<String>,
}

impl DeviceInfo {
    pub fn new(serial_number: String, firmware_version: String) -> Self {
        Self {
            serial_number,
            firmware_version,
            ..Self::default()
        }
    }

    /// Interpret the `FaceFunOn` option value
    pub fn parse_face_function(value: &str) -> bool {
        !value.is_empty() && !value.contains('0')
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[SN: {}, FW: {}]",
            self.serial_number, self.firmware_version
        )
    }
}

/// Storage counters reported by `CMD_GET_FREE_SIZES`
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapacity {
    /// Users enrolled
    pub user_count: u32,

    /// Attendance records stored
    pub log_count: u32,

    /// Attendance records the device can hold
    pub log_capacity: u32,
}

impl DeviceCapacity {
    /// Minimum payload size that holds every counter
    pub const PAYLOAD_SIZE: usize = 68;

    /// Parse the `CMD_GET_FREE_SIZES` reply payload
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Error::check_len(payload, Self::PAYLOAD_SIZE)?;

        Ok(Self {
            user_count: LittleEndian::read_u32(&payload[16..20]),
            log_count: LittleEndian::read_u32(&payload[32..36]),
            log_capacity: LittleEndian::read_u32(&payload[64..68]),
        })
    }
}

impl fmt::Display for DeviceCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "users: {}, logs: {}/{}",
            self.user_count, self.log_count, self.log_capacity
        )
    }
}

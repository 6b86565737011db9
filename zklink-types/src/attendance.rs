//! Attendance log records

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use chrono::NaiveDateTime;

use crate::{error::Error, error::Result, text::read_field, time};

/// Size of an attendance record over TCP
pub const TCP_RECORD_SIZE: usize = 40;

/// Size of an attendance record over UDP
pub const UDP_RECORD_SIZE: usize = 16;

/// One punch stored in the device log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendance {
    /// Device-side sequence number (TCP only, 0 over UDP)
    pub user_sn: u16,

    /// Enrollment number of the user who punched
    pub user_id: String,

    /// Verification state (finger, card, password...)
    pub state: u8,

    /// Punch type (check-in, check-out...)
    pub punch: u8,

    /// Work code (UDP only, 0 over TCP)
    pub work_code: u32,

    /// When the punch happened, device local time
    pub timestamp: NaiveDateTime,
}

impl Attendance {
    /// Decode a 40-byte TCP record
    ///
    /// ```text
    /// 0   user sn    u16
    /// 2   user id    24 bytes, NUL padded
    /// 26  state      u8
    /// 27  time       u32 packed
    /// 31  punch      u8
    /// ```
    pub fn from_tcp_record(buf: &[u8]) -> Result<Self> {
        Error::check_len(buf, TCP_RECORD_SIZE)?;

        Ok(Self {
            user_sn: LittleEndian::read_u16(&buf[0..2]),
            user_id: read_field(&buf[2..26]),
            state: buf[26],
            timestamp: time::decode(LittleEndian::read_u32(&buf[27..31]))?,
            punch: buf[31],
            work_code: 0,
        })
    }

    /// Decode a 16-byte UDP record
    ///
    /// ```text
    /// 0   user id    u32
    /// 4   time       u32 packed
    /// 8   state      u8
    /// 9   punch      u8
    /// 12  work code  u32
    /// ```
    pub fn from_udp_record(buf: &[u8]) -> Result<Self> {
        Error::check_len(buf, UDP_RECORD_SIZE)?;

        Ok(Self {
            user_sn: 0,
            user_id: LittleEndian::read_u32(&buf[0..4]).to_string(),
            timestamp: time::decode(LittleEndian::read_u32(&buf[4..8]))?,
            state: buf[8],
            punch: buf[9],
            work_code: LittleEndian::read_u32(&buf[12..16]),
        })
    }
}

impl fmt::Display for Attendance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} (state {}, punch {})", self.user_id, self.timestamp, self.state, self.punch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn punch_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap().and_hms_opt(7, 58, 12).unwrap()
    }

    #[test]
    fn test_decode_tcp_record() {
        let mut buf = [0u8; TCP_RECORD_SIZE];
        buf[0..2].copy_from_slice(&17u16.to_le_bytes());
        buf[2..6].copy_from_slice(b"1042");
        buf[26] = 1;
        buf[27..31].copy_from_slice(&time::encode(&punch_time()).to_le_bytes());
        buf[31] = 0;

        assert_eq!(
            Attendance::from_tcp_record(&buf).unwrap(),
            Attendance {
                user_sn: 17,
                user_id: "1042".into(),
                state: 1,
                punch: 0,
                work_code: 0,
                timestamp: punch_time(),
            }
        );
    }

    #[test]
    fn test_decode_udp_record() {
        let mut buf = [0u8; UDP_RECORD_SIZE];
        buf[0..4].copy_from_slice(&1042u32.to_le_bytes());
        buf[4..8].copy_from_slice(&time::encode(&punch_time()).to_le_bytes());
        buf[8] = 15;
        buf[9] = 1;
        buf[12..16].copy_from_slice(&8u32.to_le_bytes());

        let record = Attendance::from_udp_record(&buf).unwrap();
        assert_eq!(record.user_id, "1042");
        assert_eq!(record.timestamp, punch_time());
        assert_eq!(record.state, 15);
        assert_eq!(record.punch, 1);
        assert_eq!(record.work_code, 8);
    }

    #[test]
    fn test_short_record() {
        assert!(Attendance::from_tcp_record(&[0u8; 39]).is_err());
        assert!(Attendance::from_udp_record(&[0u8; 15]).is_err());
    }
}

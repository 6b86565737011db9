//! Device time formats
//!
//! The device counts time in a packed form that pretends every month has 31
//! days and every year has 12 such months, starting at 2000-01-01:
//!
//! ```text
//! ((year % 100) * 12 * 31 + (month - 1) * 31 + (day - 1)) * 86400
//!     + (hour * 60 + minute) * 60 + second
//! ```
//!
//! Realtime events carry a plain 6-byte stamp instead: `yy mm dd hh mi ss`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Error, Result};

const SECS_PER_DAY: u32 = 86_400;

/// Pack a date-time into the device's 32-bit format
///
/// Only the last two digits of the year survive.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use zklink_types::time;
///
/// let t = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap().and_hms_opt(0, 0, 1).unwrap();
/// assert_eq!(time::encode(&t), 1);
/// ```
pub fn encode(t: &NaiveDateTime) -> u32 {
    let year = t.year().rem_euclid(100) as u32;
    let days = (year * 12 * 31) + (t.month0() * 31) + t.day0();
    days * SECS_PER_DAY + (t.hour() * 60 + t.minute()) * 60 + t.second()
}

/// Unpack the device's 32-bit time
///
/// # Errors
///
/// `Parse` when the packed value names a day the calendar does not have
/// (for example February 31st).
pub fn decode(packed: u32) -> Result<NaiveDateTime> {
    let mut t = packed;

    let second = t % 60;
    t /= 60;
    let minute = t % 60;
    t /= 60;
    let hour = t % 24;
    t /= 24;
    let day = t % 31 + 1;
    t /= 31;
    let month = t % 12 + 1;
    t /= 12;
    let year = t as i32 + 2000;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| Error::Parse(format!("invalid packed time: {packed}")))
}

/// Read the 6-byte `yy mm dd hh mi ss` stamp of a realtime event
pub fn decode_stamp(buf: &[u8]) -> Result<NaiveDateTime> {
    Error::check_len(buf, 6)?;

    let [yy, mm, dd, hh, mi, ss] = [buf[0], buf[1], buf[2], buf[3], buf[4], buf[5]];
    NaiveDate::from_ymd_opt(2000 + i32::from(yy), u32::from(mm), u32::from(dd))
        .and_then(|date| date.and_hms_opt(u32::from(hh), u32::from(mi), u32::from(ss)))
        .ok_or_else(|| {
            Error::Parse(format!(
                "invalid event stamp: {yy:02}-{mm:02}-{dd:02} {hh:02}:{mi:02}:{ss:02}"
            ))
        })
}

/// Write the 6-byte event stamp
pub fn encode_stamp(t: &NaiveDateTime) -> [u8; 6] {
    [
        t.year().rem_euclid(100) as u8,
        t.month() as u8,
        t.day() as u8,
        t.hour() as u8,
        t.minute() as u8,
        t.second() as u8,
    ]
}

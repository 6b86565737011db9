//! User records
//!
//! TCP layout (72 bytes):
//!
//! ```text
//! 0   uid        u16
//! 2   role       u8
//! 3   password   8 bytes, NUL padded
//! 11  name       24 bytes, NUL padded
//! 35  card       u32
//! 40  group      7 bytes, NUL padded
//! 48  user id    24 bytes, NUL padded
//! ```
//!
//! UDP layout (28 bytes): uid u16 @0, role @2, password 5 bytes @3, name
//! 8 bytes @8, card u32 @16, group u8 @21, timezone u16 @22, user id u32 @24.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    error::{Error, Result},
    text::{read_field, write_field},
};

/// Size of a user record over TCP
pub const TCP_RECORD_SIZE: usize = 72;

/// Size of a user record over UDP
pub const UDP_RECORD_SIZE: usize = 28;

/// Largest uid the device accepts
pub const MAX_UID: u16 = 3000;

const MAX_USER_ID_LEN: usize = 9;
const MAX_NAME_LEN: usize = 24;
const MAX_PASSWORD_LEN: usize = 8;

/// Privilege level of a user
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum UserRole {
    #[default]
    Normal,
    Enroller,
    Manager,
    Admin,
    /// Vendor-specific privilege byte
    Other(u8),
}

impl From<u8> for UserRole {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Normal,
            2 => Self::Enroller,
            6 => Self::Manager,
            14 => Self::Admin,
            other => Self::Other(other),
        }
    }
}

impl From<UserRole> for u8 {
    fn from(role: UserRole) -> u8 {
        match role {
            UserRole::Normal => 0,
            UserRole::Enroller => 2,
            UserRole::Manager => 6,
            UserRole::Admin => 14,
            UserRole::Other(value) => value,
        }
    }
}

/// User enrolled on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Internal slot number
    pub uid: u16,

    /// Privilege level
    pub role: UserRole,

    /// Keypad password
    pub password: String,

    /// Display name
    pub name: String,

    /// RFID card number (0 if none)
    pub card_no: u32,

    /// Access group
    pub group_id: String,

    /// Enrollment number shown on the terminal
    pub user_id: String,
}

impl User {
    /// Create a normal user without password or card
    pub fn new(uid: u16, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid,
            role: UserRole::Normal,
            password: String::new(),
            name: name.into(),
            card_no: 0,
            group_id: String::new(),
            user_id: user_id.into(),
        }
    }

    /// Set password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set role
    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    /// Set card number
    pub fn with_card(mut self, card_no: u32) -> Self {
        self.card_no = card_no;
        self
    }

    /// Check the limits the device enforces on writes
    ///
    /// A `u32` card number never exceeds the ten digits the device allows.
    pub fn validate(&self) -> Result<()> {
        validate_uid(self.uid)?;

        if self.user_id.len() > MAX_USER_ID_LEN {
            return Err(Error::Validation(format!(
                "user id longer than {MAX_USER_ID_LEN} characters: {:?}",
                self.user_id
            )));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(Error::Validation(format!(
                "name longer than {MAX_NAME_LEN} characters: {:?}",
                self.name
            )));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password longer than {MAX_PASSWORD_LEN} characters"
            )));
        }

        Ok(())
    }

    /// Decode a 72-byte TCP record
    pub fn from_tcp_record(buf: &[u8]) -> Result<Self> {
        Error::check_len(buf, TCP_RECORD_SIZE)?;

        Ok(Self {
            uid: LittleEndian::read_u16(&buf[0..2]),
            role: UserRole::from(buf[2]),
            password: read_field(&buf[3..11]),
            name: read_field(&buf[11..35]),
            card_no: LittleEndian::read_u32(&buf[35..39]),
            group_id: read_field(&buf[40..47]),
            user_id: read_field(&buf[48..72]),
        })
    }

    /// Decode a 28-byte UDP record
    pub fn from_udp_record(buf: &[u8]) -> Result<Self> {
        Error::check_len(buf, UDP_RECORD_SIZE)?;

        Ok(Self {
            uid: LittleEndian::read_u16(&buf[0..2]),
            role: UserRole::from(buf[2]),
            password: read_field(&buf[3..8]),
            name: read_field(&buf[8..16]),
            card_no: LittleEndian::read_u32(&buf[16..20]),
            group_id: buf[21].to_string(),
            user_id: LittleEndian::read_u32(&buf[24..28]).to_string(),
        })
    }

    /// Encode as a 72-byte TCP record for `CMD_USER_WRQ`
    pub fn to_tcp_record(&self) -> Result<[u8; TCP_RECORD_SIZE]> {
        self.validate()?;

        let mut buf = [0u8; TCP_RECORD_SIZE];
        LittleEndian::write_u16(&mut buf[0..2], self.uid);
        buf[2] = self.role.into();
        write_field(&mut buf[3..11], &self.password);
        write_field(&mut buf[11..35], &self.name);
        LittleEndian::write_u32(&mut buf[35..39], self.card_no);
        write_field(&mut buf[40..47], &self.group_id);
        write_field(&mut buf[48..72], &self.user_id);
        Ok(buf)
    }

    /// Encode as a 28-byte UDP record for `CMD_USER_WRQ`
    ///
    /// The UDP layout stores the user id as a number, and keeps only the
    /// first 5 password and 8 name bytes.
    pub fn to_udp_record(&self) -> Result<[u8; UDP_RECORD_SIZE]> {
        self.validate()?;

        let user_id: u32 = self.user_id.parse().map_err(|_| {
            Error::Validation(format!("user id must be numeric over UDP: {:?}", self.user_id))
        })?;
        let group: u8 = if self.group_id.is_empty() {
            0
        } else {
            self.group_id.parse().map_err(|_| {
                Error::Validation(format!("group must be numeric over UDP: {:?}", self.group_id))
            })?
        };

        let mut buf = [0u8; UDP_RECORD_SIZE];
        LittleEndian::write_u16(&mut buf[0..2], self.uid);
        buf[2] = self.role.into();
        write_field(&mut buf[3..8], &self.password);
        write_field(&mut buf[8..16], &self.name);
        LittleEndian::write_u32(&mut buf[16..20], self.card_no);
        buf[21] = group;
        LittleEndian::write_u32(&mut buf[24..28], user_id);
        Ok(buf)
    }
}

/// Check a uid is in the range the device accepts
pub fn validate_uid(uid: u16) -> Result<()> {
    if uid == 0 || uid > MAX_UID {
        return Err(Error::Validation(format!("uid must be between 1 and {MAX_UID}, got {uid}")));
    }
    Ok(())
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User[{}] {} ({})", self.uid, self.user_id, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tcp_record(uid: u16, user_id: &str, name: &str) -> [u8; TCP_RECORD_SIZE] {
        let mut buf = [0u8; TCP_RECORD_SIZE];
        buf[0..2].copy_from_slice(&uid.to_le_bytes());
        buf[2] = 14;
        buf[3..7].copy_from_slice(b"1234");
        buf[11..11 + name.len()].copy_from_slice(name.as_bytes());
        buf[35..39].copy_from_slice(&987_654u32.to_le_bytes());
        buf[40] = b'1';
        buf[48..48 + user_id.len()].copy_from_slice(user_id.as_bytes());
        buf
    }

    #[test]
    fn test_decode_tcp_record() {
        let user = User::from_tcp_record(&tcp_record(7, "1007", "Alice")).unwrap();

        assert_eq!(
            user,
            User {
                uid: 7,
                role: UserRole::Admin,
                password: "1234".into(),
                name: "Alice".into(),
                card_no: 987_654,
                group_id: "1".into(),
                user_id: "1007".into(),
            }
        );
    }

    #[test]
    fn test_decode_udp_record() {
        let mut buf = [0u8; UDP_RECORD_SIZE];
        buf[0..2].copy_from_slice(&3u16.to_le_bytes());
        buf[3..6].copy_from_slice(b"999");
        buf[8..11].copy_from_slice(b"Bob");
        buf[16..20].copy_from_slice(&42u32.to_le_bytes());
        buf[21] = 2;
        buf[24..28].copy_from_slice(&55u32.to_le_bytes());

        let user = User::from_udp_record(&buf).unwrap();
        assert_eq!(user.uid, 3);
        assert_eq!(user.role, UserRole::Normal);
        assert_eq!(user.password, "999");
        assert_eq!(user.name, "Bob");
        assert_eq!(user.card_no, 42);
        assert_eq!(user.group_id, "2");
        assert_eq!(user.user_id, "55");
    }

    #[test]
    fn test_short_record() {
        assert!(matches!(
            User::from_tcp_record(&[0u8; 30]),
            Err(Error::RecordTooShort { expected: 72, actual: 30 })
        ));
    }

    #[test]
    fn test_tcp_record_survives() {
        let user = User::new(12, "A12", "Carol")
            .with_password("42")
            .with_role(UserRole::Manager)
            .with_card(1_234_567_890);

        let decoded = User::from_tcp_record(&user.to_tcp_record().unwrap()).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_udp_record_requires_numeric_id() {
        let user = User::new(12, "A12", "Carol");
        assert!(matches!(user.to_udp_record(), Err(Error::Validation(_))));

        let user = User::new(12, "12", "Carol");
        let decoded = User::from_udp_record(&user.to_udp_record().unwrap()).unwrap();
        assert_eq!(decoded.user_id, "12");
        assert_eq!(decoded.name, "Carol");
        assert_eq!(decoded.group_id, "0");
    }

    #[test]
    fn test_validation_limits() {
        assert!(User::new(0, "1", "x").validate().is_err());
        assert!(User::new(3001, "1", "x").validate().is_err());
        assert!(User::new(3000, "123456789", "x").validate().is_ok());
        assert!(User::new(1, "1234567890", "x").validate().is_err());
        assert!(User::new(1, "1", "x".repeat(25)).validate().is_err());
        assert!(User::new(1, "1", "x").with_password("123456789").validate().is_err());
    }

    #[test]
    fn test_role_bytes() {
        for byte in [0u8, 2, 6, 14, 3] {
            assert_eq!(u8::from(UserRole::from(byte)), byte);
        }
        assert_eq!(UserRole::from(3), UserRole::Other(3));
    }
}

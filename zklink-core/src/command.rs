//! ZKTeco protocol command definitions

use std::fmt;

use crate::error::{Error, Result};

macro_rules! commands {
    ($( $(#[$meta:meta])* $variant:ident = $code:literal => $name:literal, )*) => {
        /// Protocol command codes
        ///
        /// All commands from the ZKTeco Communication Protocol Manual.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Command {
            $( $(#[$meta])* $variant = $code, )*
        }

        impl Command {
            /// Every known command, in declaration order
            pub const ALL: &'static [Command] = &[ $( Command::$variant, )* ];

            /// Get command name
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }
        }

        impl TryFrom<u16> for Command {
            type Error = Error;

            fn try_from(value: u16) -> Result<Self> {
                match value {
                    $( $code => Ok(Self::$variant), )*
                    _ => Err(Error::UnknownCommand(value)),
                }
            }
        }
    };
}

commands! {
    // Connection commands
    Connect = 1000 => "CMD_CONNECT",
    Exit = 1001 => "CMD_EXIT",
    EnableDevice = 1002 => "CMD_ENABLEDEVICE",
    DisableDevice = 1003 => "CMD_DISABLEDEVICE",
    Restart = 1004 => "CMD_RESTART",
    PowerOff = 1005 => "CMD_POWEROFF",
    Sleep = 1006 => "CMD_SLEEP",
    Resume = 1007 => "CMD_RESUME",

    // Device interaction
    CaptureFinger = 1009 => "CMD_CAPTUREFINGER",
    TestTemp = 1011 => "CMD_TEST_TEMP",
    CaptureImage = 1012 => "CMD_CAPTUREIMAGE",
    RefreshData = 1013 => "CMD_REFRESHDATA",
    RefreshOption = 1014 => "CMD_REFRESHOPTION",
    TestVoice = 1017 => "CMD_TESTVOICE",

    // Device information
    GetVersion = 1100 => "CMD_GET_VERSION",
    ChangeSpeed = 1101 => "CMD_CHANGE_SPEED",
    Auth = 1102 => "CMD_AUTH",

    // Bulk data transfer
    PrepareData = 1500 => "CMD_PREPARE_DATA",
    Data = 1501 => "CMD_DATA",
    FreeData = 1502 => "CMD_FREE_DATA",
    /// Request a dataset (answered inline or with its total size)
    DataWrrq = 1503 => "CMD_DATA_WRRQ",
    /// Request one chunk `{offset: u32, size: u32}` of a prepared dataset
    DataRdy = 1504 => "CMD_DATA_RDY",

    // Database operations
    DbRrq = 7 => "CMD_DB_RRQ",
    UserWrq = 8 => "CMD_USER_WRQ",
    UserTempRrq = 9 => "CMD_USERTEMP_RRQ",
    UserTempWrq = 10 => "CMD_USERTEMP_WRQ",
    /// Generic `key=value` option query
    OptionsRrq = 11 => "CMD_OPTIONS_RRQ",
    OptionsWrq = 12 => "CMD_OPTIONS_WRQ",
    AttLogRrq = 13 => "CMD_ATTLOG_RRQ",
    ClearData = 14 => "CMD_CLEAR_DATA",
    ClearAttLog = 15 => "CMD_CLEAR_ATTLOG",
    DeleteUser = 18 => "CMD_DELETE_USER",
    DeleteUserTemp = 19 => "CMD_DELETE_USERTEMP",
    ClearAdmin = 20 => "CMD_CLEAR_ADMIN",

    // Device status
    GetFreeSizes = 50 => "CMD_GET_FREE_SIZES",
    EnableClock = 57 => "CMD_ENABLE_CLOCK",
    StateRrq = 64 => "CMD_STATE_RRQ",
    GetPinWidth = 69 => "CMD_GET_PINWIDTH",

    // Time operations
    GetTime = 201 => "CMD_GET_TIME",
    SetTime = 202 => "CMD_SET_TIME",

    // Real-time events
    RegEvent = 500 => "CMD_REG_EVENT",

    // Response commands (from device)
    AckOk = 2000 => "CMD_ACK_OK",
    AckError = 2001 => "CMD_ACK_ERROR",
    AckData = 2002 => "CMD_ACK_DATA",
    AckRetry = 2003 => "CMD_ACK_RETRY",
    AckRepeat = 2004 => "CMD_ACK_REPEAT",
    AckUnauth = 2005 => "CMD_ACK_UNAUTH",
    AckUnknown = 0xFFFF => "CMD_ACK_UNKNOWN",
    AckErrorCmd = 0xFFFD => "CMD_ACK_ERROR_CMD",
    AckErrorInit = 0xFFFC => "CMD_ACK_ERROR_INIT",
    AckErrorData = 0xFFFB => "CMD_ACK_ERROR_DATA",
}

impl Command {
    /// Check if this is a request command (from PC to device)
    pub fn is_request(self) -> bool {
        !self.is_response() && !self.is_transfer()
    }

    /// Check if this is a response command (from device to PC)
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::AckOk
                | Self::AckError
                | Self::AckData
                | Self::AckRetry
                | Self::AckRepeat
                | Self::AckUnauth
                | Self::AckUnknown
                | Self::AckErrorCmd
                | Self::AckErrorInit
                | Self::AckErrorData
        )
    }

    /// Check if the device sends this while streaming a dataset
    pub fn is_transfer(self) -> bool {
        matches!(self, Self::PrepareData | Self::Data)
    }

    /// Check if this is a success response
    pub fn is_success(self) -> bool {
        matches!(self, Self::AckOk | Self::AckData)
    }

    /// Check if this is an error response
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::AckError | Self::AckErrorCmd | Self::AckErrorInit | Self::AckErrorData
        )
    }

    /// Check if this code is pushed by the device outside the request/reply cycle
    pub fn is_event(self) -> bool {
        matches!(self, Self::RegEvent)
    }

    /// Commands answered within the short handshake window
    pub fn is_handshake(self) -> bool {
        matches!(self, Self::Connect | Self::Exit)
    }
}

/// Human-readable name for any wire code, known or not
pub fn describe(code: u16) -> String {
    match Command::try_from(code) {
        Ok(cmd) => cmd.to_string(),
        Err(_) => format!("CMD_UNKNOWN({code})"),
    }
}

impl From<Command> for u16 {
    fn from(cmd: Command) -> u16 {
        cmd as u16
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u16)
    }
}

//! Session bookkeeping for one connection
//!
//! A session tracks the device-assigned session ID and the reply counter.
//! It is owned by exactly one command channel and mutated only through the
//! handshake/command transitions below:
//!
//! - issuing CONNECT resets both IDs to 0
//! - a successful handshake stores the device's session ID
//! - every other command advances the reply ID by one

use tracing::trace;

use crate::{
    command::Command,
    error::{Error, Result},
};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No handshake attempted since the last close
    #[default]
    Disconnected,

    /// CONNECT sent, waiting for the device's session ID
    Handshaking,

    /// Session ID assigned, ready for commands
    Established,
}

/// Per-connection session and reply counters
#[derive(Debug, Default)]
pub struct Session {
    session_id: u16,
    reply_id: u16,
    state: SessionState,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current session ID
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    /// Reply ID of the most recent command
    pub fn reply_id(&self) -> u16 {
        self.reply_id
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if the handshake completed
    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Header IDs for the next outbound `command`
    ///
    /// CONNECT restarts the session at zero; anything else advances the
    /// reply counter.
    pub fn ids_for(&mut self, command: Command) -> (u16, u16) {
        if command == Command::Connect {
            self.begin_handshake();
        } else {
            self.next_reply_id();
        }
        (self.session_id, self.reply_id)
    }

    /// Reset both IDs for a fresh CONNECT
    pub fn begin_handshake(&mut self) {
        self.session_id = 0;
        self.reply_id = 0;
        self.state = SessionState::Handshaking;
    }

    /// Store the session ID the device assigned
    pub fn establish(&mut self, session_id: u16) -> Result<()> {
        if self.state != SessionState::Handshaking {
            return Err(Error::InvalidSessionState(format!(
                "Cannot establish from state: {:?}",
                self.state
            )));
        }

        self.session_id = session_id;
        self.state = SessionState::Established;
        Ok(())
    }

    /// Advance the reply ID by one, wrapping at `u16::MAX`
    pub fn next_reply_id(&mut self) -> u16 {
        self.reply_id = self.reply_id.wrapping_add(1);
        trace!(reply_id = self.reply_id, "Advanced reply counter");
        self.reply_id
    }

    /// Close session
    pub fn close(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert_eq!(session.session_id(), 0);
        assert_eq!(session.reply_id(), 0);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_established());
    }

    #[test]
    fn test_connect_resets_ids() {
        let mut session = Session::new();
        session.ids_for(Command::Connect);
        session.establish(1234).unwrap();
        session.ids_for(Command::GetTime);
        session.ids_for(Command::GetTime);
        assert_eq!(session.reply_id(), 2);

        assert_eq!(session.ids_for(Command::Connect), (0, 0));
        assert_eq!(session.state(), SessionState::Handshaking);
    }

    #[test]
    fn test_reply_id_increments_by_one() {
        let mut session = Session::new();
        session.ids_for(Command::Connect);
        session.establish(100).unwrap();

        let commands = [Command::FreeData, Command::DataWrrq, Command::DataRdy, Command::Exit];
        for (i, command) in commands.into_iter().enumerate() {
            let (session_id, reply_id) = session.ids_for(command);
            assert_eq!(session_id, 100);
            assert_eq!(reply_id, i as u16 + 1);
        }
    }

    #[test]
    fn test_reply_id_wrap() {
        let mut session = Session::new();
        session.reply_id = u16::MAX;
        assert_eq!(session.next_reply_id(), 0);
    }

    #[test]
    fn test_invalid_state_transitions() {
        let mut session = Session::new();

        // Cannot establish without a handshake in flight
        assert!(session.establish(100).is_err());

        session.begin_handshake();
        session.establish(100).unwrap();
        assert!(session.establish(200).is_err());
    }

    #[test]
    fn test_session_close() {
        let mut session = Session::new();
        session.begin_handshake();
        session.establish(1234).unwrap();
        session.next_reply_id();

        session.close();

        assert_eq!(session.session_id(), 0);
        assert_eq!(session.reply_id(), 0);
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}

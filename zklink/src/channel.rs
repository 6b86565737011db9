//! Request/reply execution over one transport
//!
//! A channel owns the transport's write half and its session. The read half
//! is moved into a router task that decodes every inbound frame and sorts it
//! into one of two single-subscriber queues:
//!
//! - replies (acknowledgements, dataset frames, malformed frames) for the
//!   command in flight
//! - realtime events for the listener installed by `register`
//!
//! Only one command is in flight at a time; `&mut self` on every call keeps
//! it that way. A reply is matched to its command by `reply_id`; frames
//! carrying any other id are late answers to earlier commands and are
//! skipped.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use zklink_core::{
    Command, FrameClass, Packet, Session, TransportKind,
    constants::{CLOSE_GRACE, HANDSHAKE_TIMEOUT},
};
use zklink_transport::{FrameReader, Transport};

use crate::error::{Error, Result};

type Reply = zklink_core::Result<Packet>;

/// Reply ids a wait accepts: `count` consecutive ids from `first`, wrapping
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct ReplyWindow {
    first: u16,
    count: u16,
}

impl ReplyWindow {
    /// Exactly one reply id
    pub(crate) fn single(reply_id: u16) -> Self {
        Self {
            first: reply_id,
            count: 1,
        }
    }

    /// Ids of a burst of `count` commands starting at `first`
    pub(crate) fn burst(first: u16, count: usize) -> Self {
        Self {
            first,
            count: u16::try_from(count).unwrap_or(u16::MAX),
        }
    }

    pub(crate) fn contains(&self, reply_id: u16) -> bool {
        reply_id.wrapping_sub(self.first) < self.count
    }
}

/// One connection to a device over a single transport
pub struct CommandChannel {
    transport: Box<dyn Transport>,
    session: Session,
    timeout: Duration,
    strict_checksums: bool,
    event_capacity: usize,
    replies: Option<mpsc::UnboundedReceiver<Reply>>,
    events: Option<mpsc::Receiver<Packet>>,
    router: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl CommandChannel {
    /// Wrap a transport; nothing is opened yet
    pub fn new(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            session: Session::new(),
            timeout,
            strict_checksums: false,
            event_capacity: crate::config::DEFAULT_EVENT_CAPACITY,
            replies: None,
            events: None,
            router: None,
            listener: None,
        }
    }

    /// Reject inbound frames with a bad checksum
    pub fn with_strict_checksums(mut self, strict: bool) -> Self {
        self.strict_checksums = strict;
        self
    }

    /// Depth of the realtime event queue
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Framing of the underlying transport
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Device address
    pub fn remote_addr(&self) -> String {
        self.transport.remote_addr()
    }

    /// Session bookkeeping
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Check if the socket is open and its router is running
    pub fn is_open(&self) -> bool {
        self.transport.is_connected() && self.replies.is_some()
    }

    /// Open the socket and start routing inbound frames
    pub async fn open(&mut self) -> Result<()> {
        self.transport.connect().await?;

        let reader = self.transport.take_reader().ok_or(Error::NotConnected)?;
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(self.event_capacity);

        self.router = Some(tokio::spawn(route_frames(
            reader,
            self.kind(),
            self.strict_checksums,
            reply_tx,
            event_tx,
        )));
        self.replies = Some(reply_rx);
        self.events = Some(event_rx);

        debug!("{} channel open to {}", self.kind(), self.remote_addr());
        Ok(())
    }

    /// Run the CONNECT handshake and store the session ID the device assigns
    pub async fn connect(&mut self) -> Result<()> {
        let reply = self.execute_cmd(Command::Connect, Bytes::new()).await?;

        if !reply.is(Command::AckOk) {
            return Err(Error::UnhandledCommand {
                command: Command::Connect,
                received: reply.command_id,
            });
        }

        self.session.establish(reply.session_id)?;
        info!(
            "Connected over {} (session_id={})",
            self.kind(),
            reply.session_id
        );
        Ok(())
    }

    /// Send one command and wait for its reply
    ///
    /// Replies still queued from earlier commands are discarded first. The
    /// reply window is the handshake window for CONNECT/EXIT and the
    /// configured timeout otherwise.
    ///
    /// # Errors
    ///
    /// - `NotConnected` without an open socket, before anything is sent
    /// - `WriteError` when the frame cannot be written
    /// - `Timeout` when no reply with the command's `reply_id` arrives in
    ///   the window
    /// - `ConnectionLost` when the socket closes while waiting; the channel
    ///   is released and reports closed from then on
    pub async fn execute_cmd(&mut self, command: Command, payload: impl Into<Bytes>) -> Result<Packet> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }

        self.discard_stale_replies();
        let reply_id = self.send_command(command, payload).await?;

        let window = if command.is_handshake() {
            HANDSHAKE_TIMEOUT
        } else {
            self.timeout
        };

        timeout(window, self.recv_reply(ReplyWindow::single(reply_id)))
            .await
            .map_err(|_| Error::Timeout {
                command,
                after: window,
            })?
    }

    /// Write one command without waiting for a reply, returning its reply id
    pub(crate) async fn send_command(&mut self, command: Command, payload: impl Into<Bytes>) -> Result<u16> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }

        let (session_id, reply_id) = self.session.ids_for(command);
        let packet = Packet::with_payload(command, session_id, reply_id, payload);
        trace!("Sending: {:?}", packet);

        self.transport.send(&packet.encode(self.kind())).await?;
        Ok(reply_id)
    }

    /// Next reply whose id falls in `window`
    ///
    /// Malformed frames cannot be matched and fail the wait. When the router
    /// has stopped the channel is released before `ConnectionLost` returns.
    pub(crate) async fn recv_reply(&mut self, window: ReplyWindow) -> Result<Packet> {
        loop {
            let replies = self.replies.as_mut().ok_or(Error::NotConnected)?;

            let Some(next) = replies.recv().await else {
                warn!("{} connection to {} lost", self.kind(), self.remote_addr());
                self.release().await;
                return Err(Error::ConnectionLost);
            };

            let packet = next?;
            if window.contains(packet.reply_id) {
                trace!("Received: {:?}", packet);
                return Ok(packet);
            }
            debug!("Skipping uncorrelated reply: {}", packet);
        }
    }

    fn discard_stale_replies(&mut self) {
        if let Some(replies) = self.replies.as_mut() {
            while let Ok(stale) = replies.try_recv() {
                match stale {
                    Ok(packet) => debug!("Discarding stale reply: {}", packet),
                    Err(e) => debug!("Discarding stale bad frame: {}", e),
                }
            }
        }
    }

    /// Move the event queue out; `None` after the first call
    pub(crate) fn take_events(&mut self) -> Option<mpsc::Receiver<Packet>> {
        self.events.take()
    }

    /// Tie a listener task to this channel's lifetime
    pub(crate) fn set_listener(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.listener.replace(handle) {
            previous.abort();
        }
    }

    /// Check if a realtime listener was installed
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Say goodbye and release the socket
    ///
    /// EXIT is best effort. The transport close is bounded by the close grace
    /// period, after which the socket is dropped regardless.
    pub async fn close(&mut self) {
        if self.is_open() && self.session.is_established() {
            if let Err(e) = self.execute_cmd(Command::Exit, Bytes::new()).await {
                debug!("EXIT not acknowledged: {}", e);
            }
        }

        self.release().await;
    }

    /// Stop the tasks, close the socket and forget the session
    async fn release(&mut self) {
        self.abort_tasks();

        match timeout(CLOSE_GRACE, self.transport.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Error closing {} socket: {}", self.kind(), e),
            Err(_) => warn!("{} close exceeded {:?}, dropping socket", self.kind(), CLOSE_GRACE),
        }

        self.replies = None;
        self.events = None;
        self.session.close();
        debug!("{} channel to {} closed", self.kind(), self.remote_addr());
    }

    fn abort_tasks(&mut self) {
        if let Some(router) = self.router.take() {
            router.abort();
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Sole reader of the socket: decode, classify, forward
async fn route_frames(
    mut reader: Box<dyn FrameReader>,
    kind: TransportKind,
    strict_checksums: bool,
    replies: mpsc::UnboundedSender<Reply>,
    events: mpsc::Sender<Packet>,
) {
    loop {
        let frame = match reader.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("{} peer closed the connection", kind);
                break;
            }
            Err(e) => {
                warn!("{} read failed: {}", kind, e);
                break;
            }
        };

        let decoded = Packet::decode(kind, frame).and_then(|packet| {
            if strict_checksums {
                packet.verify_checksum()?;
            }
            Ok(packet)
        });

        match decoded {
            Ok(packet) if packet.class() == FrameClass::Event => {
                trace!("Routing event: {}", packet);
                // Blocks while the listener catches up
                if events.send(packet).await.is_err() {
                    trace!("No event listener, dropping event");
                }
            }
            other => {
                if replies.send(other).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zklink_transport::{TcpTransport, UdpTransport};

    #[tokio::test]
    async fn test_commands_before_open() {
        let mut channel = CommandChannel::new(
            Box::new(TcpTransport::new("127.0.0.1", 4370)),
            Duration::from_secs(1),
        );

        assert!(!channel.is_open());
        assert!(matches!(
            channel.execute_cmd(Command::GetTime, Bytes::new()).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            channel.recv_reply(ReplyWindow::single(1)).await,
            Err(Error::NotConnected)
        ));
        // Nothing was counted for the rejected command
        assert_eq!(channel.session().reply_id(), 0);
    }

    #[test]
    fn test_reply_window() {
        let single = ReplyWindow::single(7);
        assert!(single.contains(7));
        assert!(!single.contains(6));
        assert!(!single.contains(8));

        // A burst straddling the wrap of the reply counter
        let burst = ReplyWindow::burst(u16::MAX - 1, 3);
        assert!(burst.contains(u16::MAX - 1));
        assert!(burst.contains(u16::MAX));
        assert!(burst.contains(0));
        assert!(!burst.contains(1));
        assert!(!burst.contains(u16::MAX - 2));
    }

    #[tokio::test]
    async fn test_close_without_open() {
        let mut channel = CommandChannel::new(
            Box::new(UdpTransport::new("127.0.0.1", 4370)),
            Duration::from_secs(1),
        );
        channel.close().await;
        assert!(!channel.is_open());
        assert!(channel.take_events().is_none());
    }
}

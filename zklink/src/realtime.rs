//! Realtime attendance events
//!
//! After `CMD_REG_EVENT` the device pushes a frame with command 500 for every
//! punch. The router queues those frames; one listener task per connection
//! decodes them and hands each to the registered callback.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use zklink_core::{Packet, TransportKind};
use zklink_types::{RealtimeEvent, event};

use crate::error::Result;

/// Decode an attendance event frame for `kind`
///
/// Returns `Ok(None)` for event frames of another size, which carry other
/// event types than attendance.
pub fn decode_event(kind: TransportKind, packet: &Packet) -> Result<Option<RealtimeEvent>> {
    let expected = match kind {
        TransportKind::Tcp => event::TCP_PAYLOAD_SIZE,
        TransportKind::Udp => event::UDP_PAYLOAD_SIZE,
    };
    if packet.payload.len() != expected {
        trace!(len = packet.payload.len(), "Skipping non-attendance event");
        return Ok(None);
    }

    let decoded = match kind {
        TransportKind::Tcp => RealtimeEvent::from_tcp_payload(&packet.payload)?,
        TransportKind::Udp => RealtimeEvent::from_udp_payload(&packet.payload)?,
    };
    Ok(Some(decoded))
}

/// Spawn the listener that drains `events` into `callback`
///
/// Runs until the event queue closes or the task is aborted with its
/// channel.
pub(crate) fn spawn_listener<F>(
    kind: TransportKind,
    mut events: mpsc::Receiver<Packet>,
    mut callback: F,
) -> JoinHandle<()>
where
    F: FnMut(RealtimeEvent) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(packet) = events.recv().await {
            let event = match decode_event(kind, &packet) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Dropping undecodable event: {}", e);
                    continue;
                }
            };

            debug!("Realtime event: {}", event);
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!("Event callback panicked");
            }
        }
        debug!("Realtime listener stopped");
    })
}

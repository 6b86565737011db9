//! Chunked dataset transfers
//!
//! Datasets larger than one packet are pulled in three steps:
//!
//! 1. `CMD_DATA_WRRQ` with a dataset selector. The device either answers
//!    `CMD_DATA` with the whole dataset inline, or `CMD_ACK_OK` /
//!    `CMD_PREPARE_DATA` with the total size as `u32` at payload offset 1.
//! 2. One `CMD_DATA_RDY {offset: u32, size: u32}` per chunk of at most
//!    [`MAX_CHUNK`] bytes, sent back to back.
//! 3. The device streams `CMD_PREPARE_DATA`, `CMD_DATA` and `CMD_ACK_OK`
//!    frames; only `CMD_DATA` payloads carry dataset bytes.
//!
//! [`BulkTransfer`] is the reassembly state; [`read_dataset`] drives it over
//! a [`CommandChannel`] with an inactivity timeout.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use zklink_core::{Command, Packet, constants::MAX_CHUNK};

use crate::{
    channel::{CommandChannel, ReplyWindow},
    error::{Error, Result},
};

/// One `CMD_DATA_RDY` request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub offset: u32,
    pub size: u32,
}

impl ChunkRequest {
    /// Request payload: offset then size, little-endian
    pub fn payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u32_le(self.offset);
        buf.put_u32_le(self.size);
        buf.freeze()
    }
}

/// Split `total` bytes into chunk requests
///
/// Every chunk is [`MAX_CHUNK`] bytes except the last, which holds the
/// remainder (or a full chunk when `total` divides evenly).
///
/// # Examples
///
/// ```
/// use zklink::bulk::plan_chunks;
///
/// let plan = plan_chunks(0xFFC0 + 10);
/// assert_eq!(plan.len(), 2);
/// assert_eq!(plan[1].offset, 0xFFC0);
/// assert_eq!(plan[1].size, 10);
/// ```
pub fn plan_chunks(total: usize) -> Vec<ChunkRequest> {
    let count = total.div_ceil(MAX_CHUNK);

    (0..count)
        .map(|i| {
            let size = if i + 1 == count && total % MAX_CHUNK != 0 {
                total % MAX_CHUNK
            } else {
                MAX_CHUNK
            };
            ChunkRequest {
                offset: (i * MAX_CHUNK) as u32,
                size: size as u32,
            }
        })
        .collect()
}

/// First answer to `CMD_DATA_WRRQ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetReply {
    /// Whole dataset in one frame
    Inline(Bytes),
    /// Dataset of `total` bytes waiting to be pulled in chunks
    Prepared { total: usize },
}

impl DatasetReply {
    /// Interpret the reply to `CMD_DATA_WRRQ`
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        match packet.command() {
            Some(Command::Data) => Ok(Self::Inline(packet.payload.clone())),
            Some(Command::AckOk | Command::PrepareData) => {
                let size = packet.payload.get(1..5).ok_or_else(|| Error::MalformedReply {
                    command: Command::DataWrrq,
                    reason: format!("size announcement of {} bytes", packet.payload.len()),
                })?;
                let total = u32::from_le_bytes([size[0], size[1], size[2], size[3]]);
                Ok(Self::Prepared {
                    total: total as usize,
                })
            }
            _ => Err(Error::UnhandledCommand {
                command: Command::DataWrrq,
                received: packet.command_id,
            }),
        }
    }
}

/// Reassembly state of one chunked transfer
#[derive(Debug)]
pub struct BulkTransfer {
    total: usize,
    buffer: BytesMut,
}

impl BulkTransfer {
    /// Start assembling a dataset of `total` bytes
    pub fn new(total: usize) -> Self {
        Self {
            total,
            buffer: BytesMut::with_capacity(total),
        }
    }

    /// Chunk requests covering the dataset
    pub fn chunks(&self) -> Vec<ChunkRequest> {
        plan_chunks(self.total)
    }

    /// Bytes announced by the device
    pub fn total(&self) -> usize {
        self.total
    }

    /// Bytes received so far
    pub fn assembled(&self) -> usize {
        self.buffer.len()
    }

    /// Check if every announced byte arrived
    pub fn is_complete(&self) -> bool {
        self.buffer.len() >= self.total
    }

    /// Feed one inbound frame, returning whether it carried dataset bytes
    ///
    /// # Errors
    ///
    /// `UnhandledCommand` for anything other than a pacing frame
    /// (`PREPARE_DATA`, `ACK_OK`) or `DATA`.
    pub fn accept(&mut self, packet: &Packet) -> Result<bool> {
        match packet.command() {
            Some(Command::PrepareData | Command::AckOk) => {
                trace!("Pacing frame: {}", packet);
                Ok(false)
            }
            Some(Command::Data) => {
                self.buffer.extend_from_slice(&packet.payload);
                trace!(assembled = self.buffer.len(), total = self.total, "Appended chunk");
                Ok(true)
            }
            _ => Err(Error::UnhandledCommand {
                command: Command::DataRdy,
                received: packet.command_id,
            }),
        }
    }

    /// The assembled dataset, cut to the announced size
    pub fn into_data(mut self) -> Bytes {
        if self.buffer.len() > self.total {
            warn!(
                received = self.buffer.len(),
                total = self.total,
                "Device sent more than announced, truncating"
            );
            self.buffer.truncate(self.total);
        }
        self.buffer.freeze()
    }

    /// Whatever arrived so far
    pub fn into_partial(self) -> Bytes {
        self.buffer.freeze()
    }
}

/// Call the progress callback, containing any panic
fn report<F>(progress: &mut F, assembled: usize, total: usize)
where
    F: FnMut(usize, usize),
{
    if panic::catch_unwind(AssertUnwindSafe(|| progress(assembled, total))).is_err() {
        warn!("Progress callback panicked at {}/{} bytes", assembled, total);
    }
}

/// Pull one dataset over `channel`
///
/// `inactivity` restarts with every inbound frame. `progress` sees
/// `(bytes_assembled, total)` after every `DATA` frame.
///
/// # Errors
///
/// - `UnhandledCommand` on an unexpected frame
/// - `TransferTimeout` carrying the partial data when the device goes quiet
/// - `ConnectionLost` when the socket closes mid-transfer
pub async fn read_dataset<F>(
    channel: &mut CommandChannel,
    selector: &'static [u8],
    inactivity: Duration,
    mut progress: F,
) -> Result<Bytes>
where
    F: FnMut(usize, usize),
{
    let reply = channel.execute_cmd(Command::DataWrrq, selector).await?;

    let total = match DatasetReply::from_packet(&reply)? {
        DatasetReply::Inline(data) => {
            debug!("Dataset of {} bytes arrived inline", data.len());
            report(&mut progress, data.len(), data.len());
            return Ok(data);
        }
        DatasetReply::Prepared { total } => total,
    };

    let mut transfer = BulkTransfer::new(total);
    let chunks = transfer.chunks();
    debug!("Pulling {} bytes in {} chunks", total, chunks.len());

    let mut first_id = None;
    for chunk in &chunks {
        let reply_id = channel.send_command(Command::DataRdy, chunk.payload()).await?;
        first_id.get_or_insert(reply_id);
    }
    let window = ReplyWindow::burst(first_id.unwrap_or_default(), chunks.len());

    while !transfer.is_complete() {
        let packet = match timeout(inactivity, channel.recv_reply(window)).await {
            Ok(packet) => packet?,
            Err(_) => {
                warn!(
                    assembled = transfer.assembled(),
                    total,
                    "Transfer stalled for {:?}",
                    inactivity
                );
                return Err(Error::TransferTimeout {
                    received: transfer.assembled(),
                    total,
                    partial: transfer.into_partial(),
                });
            }
        };

        if transfer.accept(&packet)? {
            report(&mut progress, transfer.assembled(), total);
        }
    }

    Ok(transfer.into_data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data(bytes: &[u8]) -> Packet {
        Packet::with_payload(Command::Data, 1, 1, bytes.to_vec())
    }

    #[test]
    fn test_plan_exact_multiple() {
        let plan = plan_chunks(MAX_CHUNK * 2);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|c| c.size as usize == MAX_CHUNK));
    }

    #[test]
    fn test_plan_with_remainder() {
        let total = MAX_CHUNK * 2 + 100;
        let plan = plan_chunks(total);

        assert_eq!(
            plan,
            vec![
                ChunkRequest { offset: 0, size: MAX_CHUNK as u32 },
                ChunkRequest { offset: MAX_CHUNK as u32, size: MAX_CHUNK as u32 },
                ChunkRequest { offset: (MAX_CHUNK * 2) as u32, size: 100 },
            ]
        );
        let covered: u32 = plan.iter().map(|c| c.size).sum();
        assert_eq!(covered as usize, total);
    }

    #[test]
    fn test_plan_small_and_empty() {
        assert_eq!(plan_chunks(10), vec![ChunkRequest { offset: 0, size: 10 }]);
        assert!(plan_chunks(0).is_empty());
    }

    #[test]
    fn test_chunk_payload() {
        let chunk = ChunkRequest { offset: 0xFFC0, size: 10 };
        assert_eq!(&chunk.payload()[..], &[0xC0, 0xFF, 0, 0, 10, 0, 0, 0]);
    }

    #[test]
    fn test_dataset_reply() {
        let inline = data(&[1, 2, 3]);
        assert_eq!(
            DatasetReply::from_packet(&inline).unwrap(),
            DatasetReply::Inline(Bytes::from_static(&[1, 2, 3]))
        );

        let mut announce = vec![0u8; 9];
        announce[1..5].copy_from_slice(&200_000u32.to_le_bytes());
        for command in [Command::AckOk, Command::PrepareData] {
            let packet = Packet::with_payload(command, 1, 1, announce.clone());
            assert_eq!(
                DatasetReply::from_packet(&packet).unwrap(),
                DatasetReply::Prepared { total: 200_000 }
            );
        }

        let error = Packet::new(Command::AckError, 1, 1);
        assert!(matches!(
            DatasetReply::from_packet(&error),
            Err(Error::UnhandledCommand { received: 2001, .. })
        ));

        let short = Packet::with_payload(Command::AckOk, 1, 1, vec![0, 1]);
        assert!(matches!(DatasetReply::from_packet(&short), Err(Error::MalformedReply { .. })));
    }

    #[test]
    fn test_reassembly_in_arrival_order() {
        let mut transfer = BulkTransfer::new(6);

        assert!(!transfer.accept(&Packet::new(Command::PrepareData, 1, 1)).unwrap());
        assert!(transfer.accept(&data(&[1, 2, 3, 4])).unwrap());
        assert!(!transfer.accept(&Packet::new(Command::AckOk, 1, 1)).unwrap());
        assert!(!transfer.is_complete());

        assert!(transfer.accept(&data(&[5, 6])).unwrap());
        assert!(transfer.is_complete());
        assert_eq!(&transfer.into_data()[..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_not_complete_without_final_chunk() {
        let mut transfer = BulkTransfer::new(10);
        transfer.accept(&data(&[0; 9])).unwrap();
        assert!(!transfer.is_complete());
        assert_eq!(transfer.assembled(), 9);
        assert_eq!(transfer.into_partial().len(), 9);
    }

    #[test]
    fn test_overshoot_is_truncated() {
        let mut transfer = BulkTransfer::new(3);
        transfer.accept(&data(&[1, 2, 3, 4, 5])).unwrap();
        assert!(transfer.is_complete());
        assert_eq!(&transfer.into_data()[..], &[1, 2, 3]);
    }

    #[test]
    fn test_unexpected_frame_aborts() {
        let mut transfer = BulkTransfer::new(10);
        let result = transfer.accept(&Packet::new(Command::AckError, 1, 1));
        assert!(matches!(result, Err(Error::UnhandledCommand { received: 2001, .. })));
    }

    #[test]
    fn test_panicking_progress_is_contained() {
        let mut calls = 0;
        let mut progress = |assembled: usize, _total: usize| {
            calls += 1;
            if assembled == 1 {
                panic!("callback bug");
            }
        };
        report(&mut progress, 1, 2);
        report(&mut progress, 2, 2);
        assert_eq!(calls, 2);
    }
}

//! Device operations on an established channel
//!
//! Each function issues one or more commands over the channel it is given
//! and interprets the replies. Context is attached by the caller.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use zklink_core::{
    Command, Packet, TransportKind,
    constants::{events, records, requests},
};
use zklink_types::{
    Attendance, DeviceCapacity, RealtimeEvent, User, device_info::option_value, time,
    user::validate_uid,
};

use crate::{
    bulk,
    channel::CommandChannel,
    error::{Error, Result},
    realtime,
};

/// Require a success acknowledgement
fn expect_ack(command: Command, reply: Packet) -> Result<Packet> {
    if reply.is_success() {
        Ok(reply)
    } else {
        Err(Error::UnhandledCommand {
            command,
            received: reply.command_id,
        })
    }
}

/// Run a command whose only answer is an acknowledgement
pub(crate) async fn acknowledged(
    channel: &mut CommandChannel,
    command: Command,
    payload: impl Into<Bytes>,
) -> Result<Packet> {
    let reply = channel.execute_cmd(command, payload).await?;
    expect_ack(command, reply)
}

pub(crate) async fn free_data(channel: &mut CommandChannel) -> Result<()> {
    acknowledged(channel, Command::FreeData, Bytes::new()).await?;
    Ok(())
}

pub(crate) async fn get_capacity(channel: &mut CommandChannel) -> Result<DeviceCapacity> {
    let reply = acknowledged(channel, Command::GetFreeSizes, Bytes::new()).await?;
    Ok(DeviceCapacity::from_payload(&reply.payload)?)
}

pub(crate) async fn get_time(channel: &mut CommandChannel) -> Result<NaiveDateTime> {
    let reply = acknowledged(channel, Command::GetTime, Bytes::new()).await?;

    let raw = reply.payload.get(..4).ok_or_else(|| Error::MalformedReply {
        command: Command::GetTime,
        reason: format!("{} byte payload", reply.payload.len()),
    })?;
    let packed = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);

    Ok(time::decode(packed)?)
}

pub(crate) async fn set_time(channel: &mut CommandChannel, t: &NaiveDateTime) -> Result<()> {
    let mut payload = BytesMut::zeroed(requests::SET_TIME_LEN);
    payload[..4].copy_from_slice(&time::encode(t).to_le_bytes());

    acknowledged(channel, Command::SetTime, payload.freeze()).await?;
    Ok(())
}

/// Text of a reply, up to the first NUL
fn reply_text(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).trim().to_string()
}

pub(crate) async fn firmware_version(channel: &mut CommandChannel) -> Result<String> {
    let reply = acknowledged(channel, Command::GetVersion, Bytes::new()).await?;
    Ok(reply_text(&reply.payload))
}

pub(crate) async fn read_option(channel: &mut CommandChannel, key: &str) -> Result<String> {
    let reply = acknowledged(
        channel,
        Command::OptionsRrq,
        Bytes::copy_from_slice(key.as_bytes()),
    )
    .await?;

    let value = option_value(key, &reply.payload);
    debug!("Option {} = {:?}", key, value);
    Ok(value)
}

pub(crate) async fn set_user(channel: &mut CommandChannel, user: &User) -> Result<()> {
    let record = match channel.kind() {
        TransportKind::Tcp => Bytes::copy_from_slice(&user.to_tcp_record()?),
        TransportKind::Udp => Bytes::copy_from_slice(&user.to_udp_record()?),
    };

    acknowledged(channel, Command::UserWrq, record).await?;
    Ok(())
}

pub(crate) async fn delete_user(channel: &mut CommandChannel, uid: u16) -> Result<()> {
    validate_uid(uid)?;

    let mut payload = match channel.kind() {
        TransportKind::Tcp => BytesMut::zeroed(records::USER_TCP),
        TransportKind::Udp => BytesMut::zeroed(2),
    };
    payload[..2].copy_from_slice(&uid.to_le_bytes());

    acknowledged(channel, Command::DeleteUser, payload.freeze()).await?;
    Ok(())
}

/// Read a dataset bracketed by `CMD_FREE_DATA`
async fn read_dataset<F>(
    channel: &mut CommandChannel,
    selector: &'static [u8],
    inactivity: Duration,
    progress: F,
) -> Result<Bytes>
where
    F: FnMut(usize, usize),
{
    free_data(channel).await?;
    let data = bulk::read_dataset(channel, selector, inactivity, progress).await?;
    free_data(channel).await?;
    Ok(data)
}

/// Slice a dataset into fixed-size records, skipping the length prefix
///
/// Records that fail to decode are logged and skipped.
pub(crate) fn decode_records<T, D>(data: &[u8], size: usize, decode: D) -> Vec<T>
where
    D: Fn(&[u8]) -> zklink_types::Result<T>,
{
    let Some(body) = data.get(records::DATASET_PREFIX..) else {
        return Vec::new();
    };

    let chunks = body.chunks_exact(size);
    if !chunks.remainder().is_empty() {
        warn!(
            trailing = chunks.remainder().len(),
            record_size = size,
            "Dataset does not divide into whole records"
        );
    }

    chunks
        .enumerate()
        .filter_map(|(i, record)| match decode(record) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping record {}: {}", i, e);
                None
            }
        })
        .collect()
}

pub(crate) async fn get_users(channel: &mut CommandChannel, inactivity: Duration) -> Result<Vec<User>> {
    let data = read_dataset(channel, &requests::GET_USERS, inactivity, |_, _| {}).await?;

    let users = match channel.kind() {
        TransportKind::Tcp => decode_records(&data, records::USER_TCP, User::from_tcp_record),
        TransportKind::Udp => decode_records(&data, records::USER_UDP, User::from_udp_record),
    };
    debug!("Decoded {} users from {} bytes", users.len(), data.len());
    Ok(users)
}

pub(crate) async fn get_attendances<F>(
    channel: &mut CommandChannel,
    inactivity: Duration,
    progress: F,
) -> Result<Vec<Attendance>>
where
    F: FnMut(usize, usize),
{
    let data = read_dataset(channel, &requests::GET_ATTENDANCE_LOGS, inactivity, progress).await?;

    let logs = match channel.kind() {
        TransportKind::Tcp => decode_records(&data, records::ATTENDANCE_TCP, Attendance::from_tcp_record),
        TransportKind::Udp => decode_records(&data, records::ATTENDANCE_UDP, Attendance::from_udp_record),
    };
    debug!("Decoded {} attendance records from {} bytes", logs.len(), data.len());
    Ok(logs)
}

/// Subscribe to attendance events and install the listener once
///
/// Returns whether a listener was installed by this call.
pub(crate) async fn register<F>(channel: &mut CommandChannel, callback: F) -> Result<bool>
where
    F: FnMut(RealtimeEvent) + Send + 'static,
{
    acknowledged(
        channel,
        Command::RegEvent,
        Bytes::copy_from_slice(&events::EF_ATTLOG.to_le_bytes()),
    )
    .await?;

    match channel.take_events() {
        Some(queue) => {
            let handle = realtime::spawn_listener(channel.kind(), queue, callback);
            channel.set_listener(handle);
            Ok(true)
        }
        None => {
            debug!("Realtime listener already installed, subscription refreshed");
            Ok(false)
        }
    }
}

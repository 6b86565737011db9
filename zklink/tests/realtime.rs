//! Realtime attendance events pushed by the device

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;

use common::{Response, SESSION_ID, ack, device, reply, spawn_tcp, spawn_udp};
use zklink::{Command, Device, Packet, RealtimeEvent};
use zklink_types::time;

fn punch_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, 2).unwrap().and_hms_opt(8, 59, 41).unwrap()
}

fn tcp_event(user: u8) -> Packet {
    let mut payload = vec![0u8; 36];
    let id = user.to_string();
    payload[..id.len()].copy_from_slice(id.as_bytes());
    payload[26..32].copy_from_slice(&time::encode_stamp(&punch_time()));
    Packet::with_payload(Command::RegEvent, SESSION_ID, 0, payload)
}

fn udp_event(user: u8) -> Packet {
    let mut payload = vec![0u8; 10];
    payload[0] = user;
    payload[4..10].copy_from_slice(&time::encode_stamp(&punch_time()));
    Packet::with_payload(Command::RegEvent, SESSION_ID, 0, payload)
}

async fn next(events: &mut mpsc::UnboundedReceiver<RealtimeEvent>) -> RealtimeEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no event within 2s")
        .expect("listener gone")
}

#[tokio::test]
async fn second_register_keeps_first_listener() {
    let punches = Arc::new(AtomicU8::new(0));
    let fake = spawn_tcp(device(move |request| match request.command() {
        Some(Command::RegEvent) => {
            let user = punches.fetch_add(1, Ordering::SeqCst) + 1;
            Some(Response::Send(vec![ack(request), tcp_event(user)]))
        }
        _ => None,
    }))
    .await;

    let mut device = Device::new("127.0.0.1", fake.port);
    device.connect().await.unwrap();

    let (first_tx, mut first) = mpsc::unbounded_channel();
    let (second_tx, mut second) = mpsc::unbounded_channel();

    device
        .register(move |event| {
            let _ = first_tx.send(event);
        })
        .await
        .unwrap();
    device
        .register(move |event| {
            let _ = second_tx.send(event);
        })
        .await
        .unwrap();

    let a = next(&mut first).await;
    let b = next(&mut first).await;
    assert_eq!((a.user_id.as_str(), b.user_id.as_str()), ("1", "2"));
    assert_eq!(a.timestamp, punch_time());

    // Exactly once, and never to the second callback
    assert!(timeout(Duration::from_millis(100), first.recv()).await.is_err());
    assert!(second.recv().await.is_none());

    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn udp_events() {
    let fake = spawn_udp(device(|request| match request.command() {
        Some(Command::RegEvent) => Some(Response::Send(vec![ack(request), udp_event(42)])),
        _ => None,
    }))
    .await;

    let mut device = Device::new("127.0.0.1", fake.port);
    device.connect().await.unwrap();

    let (tx, mut events) = mpsc::unbounded_channel();
    device
        .register(move |event| {
            let _ = tx.send(event);
        })
        .await
        .unwrap();

    assert_eq!(
        next(&mut events).await,
        RealtimeEvent {
            user_id: "42".into(),
            timestamp: punch_time(),
        }
    );
    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn event_between_request_and_reply() {
    let packed = time::encode(&punch_time());
    let fake = spawn_tcp(device(move |request| match request.command() {
        Some(Command::GetTime) => Some(Response::Send(vec![
            tcp_event(9),
            reply(Command::AckOk, request, packed.to_le_bytes().to_vec()),
        ])),
        _ => None,
    }))
    .await;

    let mut device = Device::new("127.0.0.1", fake.port);
    device.connect().await.unwrap();

    // The event is held back, not taken for the reply
    assert_eq!(device.get_time().await.unwrap(), punch_time());

    // and delivered once someone listens
    let (tx, mut events) = mpsc::unbounded_channel();
    device
        .register(move |event| {
            let _ = tx.send(event);
        })
        .await
        .unwrap();
    assert_eq!(next(&mut events).await.user_id, "9");

    device.disconnect().await.unwrap();
}

#[tokio::test]
async fn listener_stops_with_connection() {
    let fake = spawn_tcp(device(|_| None)).await;
    let mut device = Device::new("127.0.0.1", fake.port);
    device.connect().await.unwrap();

    let (tx, mut events) = mpsc::unbounded_channel::<RealtimeEvent>();
    device
        .register(move |event| {
            let _ = tx.send(event);
        })
        .await
        .unwrap();

    device.disconnect().await.unwrap();

    // Aborting the listener drops the callback and its sender
    assert!(timeout(Duration::from_secs(2), events.recv()).await.unwrap().is_none());
}

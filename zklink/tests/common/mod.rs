//! Loopback fake devices for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use zklink::{Command, Packet, TransportKind};
use zklink_core::StreamDeframer;

/// Session ID the fake device hands out
pub const SESSION_ID: u16 = 0x2A2A;

/// What the fake device does with one request
pub enum Response {
    /// Write these frames (coalesced into one write over TCP)
    Send(Vec<Packet>),
    /// Write these bytes as they are
    Raw(Vec<u8>),
    /// Write these frames after a pause, without holding up later requests
    Delayed(Duration, Vec<Packet>),
    /// Close the connection (TCP) or stop serving (UDP)
    Hangup,
}

pub type Handler = Arc<dyn Fn(&Packet) -> Response + Send + Sync>;

/// One request as the device saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub packet: Packet,
    pub raw: Bytes,
}

pub struct FakeDevice {
    pub port: u16,
    pub requests: mpsc::UnboundedReceiver<Recorded>,
    task: JoinHandle<()>,
}

impl FakeDevice {
    /// Every request received so far
    pub fn drain(&mut self) -> Vec<Recorded> {
        let mut seen = Vec::new();
        while let Ok(r) = self.requests.try_recv() {
            seen.push(r);
        }
        seen
    }

    /// Commands received so far, in order
    pub fn commands(&mut self) -> Vec<u16> {
        self.drain().into_iter().map(|r| r.packet.command_id).collect()
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn reply(command: Command, request: &Packet, payload: impl Into<Bytes>) -> Packet {
    Packet::with_payload(command, SESSION_ID, request.reply_id, payload)
}

pub fn ack(request: &Packet) -> Packet {
    reply(Command::AckOk, request, Bytes::new())
}

/// Handler answering CONNECT/EXIT and delegating the rest to `custom`
///
/// `custom` returning `None` means plain `ACK_OK`.
pub fn device<F>(custom: F) -> Handler
where
    F: Fn(&Packet) -> Option<Response> + Send + Sync + 'static,
{
    Arc::new(move |request: &Packet| match request.command() {
        Some(Command::Connect) | Some(Command::Exit) => Response::Send(vec![ack(request)]),
        _ => custom(request).unwrap_or_else(|| Response::Send(vec![ack(request)])),
    })
}

/// Plain device that acknowledges everything
pub fn acking_device() -> Handler {
    device(|_| None)
}

/// Chunked dataset server: announce `dataset`'s size, then serve
/// `DATA_RDY` requests from it, withholding chunks at or past `stall_at`
pub fn dataset_device(dataset: Bytes, stall_at: Option<u32>) -> Handler {
    device(move |request| match request.command() {
        Some(Command::DataWrrq) => {
            let mut announce = vec![0u8; 9];
            announce[1..5].copy_from_slice(&(dataset.len() as u32).to_le_bytes());
            Some(Response::Send(vec![reply(Command::AckOk, request, announce)]))
        }
        Some(Command::DataRdy) => {
            let p = &request.payload;
            let offset = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
            let size = u32::from_le_bytes([p[4], p[5], p[6], p[7]]);
            if stall_at.is_some_and(|stall| offset >= stall) {
                return Some(Response::Send(Vec::new()));
            }
            let chunk = dataset.slice(offset as usize..(offset + size) as usize);
            Some(Response::Send(vec![
                reply(Command::PrepareData, request, vec![0u8; 8]),
                reply(Command::Data, request, chunk),
                ack(request),
            ]))
        }
        _ => None,
    })
}

/// TCP fake device on an ephemeral loopback port
pub async fn spawn_tcp(handler: Handler) -> FakeDevice {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, requests) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let (mut reader, writer) = socket.into_split();
            let writer = Arc::new(Mutex::new(writer));
            let mut deframer = StreamDeframer::new();
            let mut buf = vec![0u8; 64 * 1024];

            'conn: loop {
                let n = match reader.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let Ok(frames) = deframer.push(&buf[..n]) else {
                    break;
                };

                for frame in frames {
                    let raw = frame.clone().freeze();
                    let packet = Packet::decode(TransportKind::Tcp, frame).unwrap();
                    let _ = tx.send(Recorded {
                        packet: packet.clone(),
                        raw,
                    });

                    match handler(&packet) {
                        Response::Send(packets) => {
                            if write_frames(&writer, packets).await.is_err() {
                                break 'conn;
                            }
                        }
                        Response::Raw(bytes) => {
                            if writer.lock().await.write_all(&bytes).await.is_err() {
                                break 'conn;
                            }
                        }
                        Response::Delayed(pause, packets) => {
                            let writer = Arc::clone(&writer);
                            tokio::spawn(async move {
                                tokio::time::sleep(pause).await;
                                let _ = write_frames(&writer, packets).await;
                            });
                        }
                        Response::Hangup => {
                            let _ = writer.lock().await.shutdown().await;
                            break 'conn;
                        }
                    }
                }
            }
        }
    });

    FakeDevice { port, requests, task }
}

/// Coalesce `packets` into one TCP write
async fn write_frames(writer: &Mutex<OwnedWriteHalf>, packets: Vec<Packet>) -> std::io::Result<()> {
    let mut out = BytesMut::new();
    for p in packets {
        out.extend_from_slice(&p.encode(TransportKind::Tcp));
    }
    if out.is_empty() {
        return Ok(());
    }
    writer.lock().await.write_all(&out).await
}

/// UDP fake device on an ephemeral loopback port
pub async fn spawn_udp(handler: Handler) -> FakeDevice {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    spawn_udp_on(socket, handler)
}

/// UDP fake device on an already bound socket
pub fn spawn_udp_on(socket: UdpSocket, handler: Handler) -> FakeDevice {
    let port = socket.local_addr().unwrap().port();
    let socket = Arc::new(socket);
    let (tx, requests) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let raw = Bytes::copy_from_slice(&buf[..n]);
            let Ok(packet) = Packet::decode(TransportKind::Udp, BytesMut::from(&buf[..n])) else {
                continue;
            };
            let _ = tx.send(Recorded {
                packet: packet.clone(),
                raw,
            });

            match handler(&packet) {
                Response::Send(packets) => {
                    for p in packets {
                        let _ = socket.send_to(&p.encode(TransportKind::Udp), peer).await;
                    }
                }
                Response::Raw(bytes) => {
                    let _ = socket.send_to(&bytes, peer).await;
                }
                Response::Delayed(pause, packets) => {
                    let socket = Arc::clone(&socket);
                    tokio::spawn(async move {
                        tokio::time::sleep(pause).await;
                        for p in packets {
                            let _ = socket.send_to(&p.encode(TransportKind::Udp), peer).await;
                        }
                    });
                }
                Response::Hangup => return,
            }
        }
    });

    FakeDevice { port, requests, task }
}

/// A loopback port with no TCP listener
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

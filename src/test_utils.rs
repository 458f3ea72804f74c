//! Test utilities: loopback stand-ins for the drone and the transcoder
//!
//! Everything here binds to `127.0.0.1` on ephemeral ports, so tests can run in
//! parallel without clashing with each other or with a real drone session.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::UdpSocket;

use crate::config::{ConnectionConfig, TranscoderConfig};
use crate::types::FrameGeometry;

/// Frame size used by tests: small enough to push through UDP in one datagram.
pub const TEST_GEOMETRY: FrameGeometry = FrameGeometry::new(8, 4);

/// Configuration bound to loopback with ephemeral ports, fast command polling,
/// `cat` as an identity transcoder and a tiny frame size.
pub fn loopback_config(drone: SocketAddr) -> ConnectionConfig {
    let mut config = ConnectionConfig {
        host_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        command_port: 0,
        telemetry_port: 0,
        video_port: 0,
        drone_ip: drone.ip(),
        drone_port: drone.port(),
        ..Default::default()
    };
    config.command.poll_interval_ms = 50;
    config.shutdown.poll_interval_ms = 50;
    config.shutdown.poll_attempts = 20;
    config.video.width = TEST_GEOMETRY.width;
    config.video.height = TEST_GEOMETRY.height;
    config.video.recv_timeout_ms = 100;
    config.video.transcoder =
        TranscoderConfig { program: "cat".to_string(), args: Some(vec![]), input_args: vec![] };
    config
}

/// `count` frames of recognisable pixel data: every byte of frame `n` equals `n`.
pub fn frame_pattern(geometry: FrameGeometry, count: usize) -> Vec<u8> {
    (0..count).flat_map(|n| std::iter::repeat_n(n as u8, geometry.frame_len())).collect()
}

/// The drone side of the control and telemetry protocols.
pub struct FakeDrone {
    socket: UdpSocket,
}

impl FakeDrone {
    pub async fn bind() -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
    }

    /// Wait up to `wait` for the next command datagram.
    pub async fn recv_command(&self, wait: Duration) -> Option<(String, SocketAddr)> {
        let mut buf = [0u8; 1024];
        let (n, from) =
            tokio::time::timeout(wait, self.socket.recv_from(&mut buf)).await.ok()?.ok()?;
        Some((String::from_utf8_lossy(&buf[..n]).into_owned(), from))
    }

    /// Non-blocking check for a command that is already queued.
    pub fn try_recv_command(&self) -> Option<String> {
        let mut buf = [0u8; 1024];
        match self.socket.try_recv_from(&mut buf) {
            Ok((n, _)) => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
            Err(_) => None,
        }
    }

    pub async fn reply(&self, to: SocketAddr, text: &str) -> io::Result<()> {
        self.socket.send_to(text.as_bytes(), to).await.map(|_| ())
    }

    /// Send raw bytes (telemetry or video) to a client port.
    pub async fn send_to(&self, to: SocketAddr, payload: &[u8]) -> io::Result<()> {
        self.socket.send_to(payload, to).await.map(|_| ())
    }
}

/// A socket whose next receive fails with `ConnectionRefused`.
///
/// It is connected to a port nobody listens on and has already sent there, so
/// the ICMP unreachable reply surfaces as a receive error.
pub async fn refused_socket() -> io::Result<UdpSocket> {
    let closed = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?.local_addr()?;
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    socket.connect(closed).await?;
    socket.send(b"ping").await?;
    Ok(socket)
}

/// An `AsyncRead` that hands out pre-arranged chunks, one chunk per read.
///
/// An empty chunk produces a zero-byte read, as a pipe does when its writer
/// has gone quiet.
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
}

impl ChunkedReader {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self { chunks: chunks.into_iter().collect() }
    }

    /// Split `data` into consecutive chunks of the given sizes; any remainder
    /// becomes a final chunk.
    pub fn split(data: &[u8], sizes: &[usize]) -> Self {
        let mut chunks = Vec::new();
        let mut offset = 0;
        for &size in sizes {
            if offset >= data.len() {
                break;
            }
            let end = (offset + size).min(data.len());
            chunks.push(data[offset..end].to_vec());
            offset = end;
        }
        if offset < data.len() {
            chunks.push(data[offset..].to_vec());
        }
        Self::new(chunks)
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(mut chunk) = self.chunks.pop_front() {
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            if n < chunk.len() {
                let rest = chunk.split_off(n);
                self.chunks.push_front(rest);
            }
        }
        Poll::Ready(Ok(()))
    }
}

//! Video ingress: UDP datagrams forwarded verbatim into the transcoder

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::SocketRole;
use crate::{DroneError, Result};

/// Bind the video socket with address reuse, so a restarted client can take the
/// port over while the previous socket lingers.
pub fn bind_video_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let bind = || -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        UdpSocket::from_std(socket.into())
    };

    bind().map_err(|e| DroneError::bind_failed(SocketRole::Video, addr, e))
}

/// Forward each datagram to `sink` until cancelled or the sink fails.
///
/// Receive timeouts and receive errors are transient; a failed write means the
/// transcoder is gone and ends the loop.
pub(crate) async fn ingress_task<W>(
    socket: UdpSocket,
    mut sink: W,
    capacity: usize,
    recv_timeout: Duration,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    info!(addr = ?socket.local_addr().ok(), "Video ingress started");
    let mut buf = vec![0u8; capacity];
    let mut forwarded = 0u64;
    let mut error_count = 0u32;

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Video ingress cancelled");
                break;
            }
            received = tokio::time::timeout(recv_timeout, socket.recv_from(&mut buf)) => received,
        };

        let n = match received {
            Err(_) => {
                trace!("No video datagram within {:?}", recv_timeout);
                continue;
            }
            Ok(Err(e)) => {
                error_count += 1;
                warn!(error_count, "Video receive failed: {}", e);
                let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => continue,
                }
            }
            Ok(Ok((n, _))) => n,
        };
        error_count = 0;

        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = write_datagram(&mut sink, &buf[..n]) => written,
        };
        if let Err(e) = written {
            error!("Transcoder input failed, video ingress stopping: {}", e);
            break;
        }

        forwarded += 1;
        trace!(bytes = n, datagrams = forwarded, "Video datagram forwarded");
    }

    info!(datagrams = forwarded, "Video ingress ended");
}

async fn write_datagram<W: AsyncWrite + Unpin>(sink: &mut W, payload: &[u8]) -> std::io::Result<()> {
    sink.write_all(payload).await?;
    sink.flush().await
}

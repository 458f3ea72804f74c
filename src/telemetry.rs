//! Telemetry listener: latest-snapshot view of the drone's state datagrams

use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::stream::ThrottleExt;
use crate::types::{TelemetrySnapshot, UpdateRate};
use crate::{DroneError, Result};

/// Receive buffer for telemetry datagrams.
pub const TELEMETRY_BUFFER_LEN: usize = 3000;

/// Rate at which the drone broadcasts state, used to normalize throttling.
pub const NOMINAL_TELEMETRY_HZ: f64 = 10.0;

/// Read side of the telemetry feed. Cheap to clone.
///
/// Readers always see a whole snapshot: each datagram replaces the previous
/// snapshot in one swap.
#[derive(Clone)]
pub struct TelemetryListener {
    snapshots: watch::Receiver<Option<Arc<TelemetrySnapshot>>>,
}

impl TelemetryListener {
    /// Start the receive loop on an already bound socket.
    pub fn spawn(socket: UdpSocket, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let handle = tokio::spawn(telemetry_task(socket, snapshot_tx, cancel));
        (Self { snapshots: snapshot_rx }, handle)
    }

    /// The latest snapshot, or `None` before the first datagram.
    pub fn current(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.snapshots.borrow().clone()
    }

    /// Stream of snapshots, starting with the current one if any.
    ///
    /// Slow consumers skip intermediate snapshots rather than queueing them.
    pub fn updates(&self, rate: UpdateRate) -> impl Stream<Item = Arc<TelemetrySnapshot>> + 'static {
        let snapshots = WatchStream::new(self.snapshots.clone()).filter_map(|opt| async move { opt });

        match rate.throttle_interval(NOMINAL_TELEMETRY_HZ) {
            None => snapshots.boxed(),
            Some(interval) => snapshots.throttle(interval).boxed(),
        }
    }

    /// Wait for the first snapshot.
    ///
    /// Fails with [`DroneError::Timeout`] when nothing arrives in time, including
    /// when the receive loop has already ended.
    pub async fn wait_for_first(&self, timeout: Duration) -> Result<Arc<TelemetrySnapshot>> {
        let mut snapshots = self.snapshots.clone();
        let first = async move {
            snapshots.wait_for(Option::is_some).await.ok().and_then(|snapshot| snapshot.clone())
        };

        match tokio::time::timeout(timeout, first).await {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) | Err(_) => Err(DroneError::timeout(timeout)),
        }
    }
}

async fn telemetry_task(
    socket: UdpSocket,
    snapshots: watch::Sender<Option<Arc<TelemetrySnapshot>>>,
    cancel: CancellationToken,
) {
    info!("Telemetry receiver started");
    let mut buf = vec![0u8; TELEMETRY_BUFFER_LEN];
    let mut sequence = 0u64;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Telemetry receiver cancelled");
                break;
            }
            result = socket.recv_from(&mut buf) => result,
        };

        let n = match result {
            Ok((n, _)) => n,
            Err(e) => {
                error!("Telemetry socket receive failed, snapshot will no longer update: {}", e);
                break;
            }
        };

        let text = match std::str::from_utf8(&buf[..n]) {
            Ok(text) => text,
            Err(e) => {
                warn!(bytes = n, "Discarding telemetry datagram that is not UTF-8: {}", e);
                continue;
            }
        };

        sequence += 1;
        let snapshot = TelemetrySnapshot::parse(text).with_sequence(sequence);
        trace!(sequence, fields = snapshot.len(), "Telemetry snapshot replaced");
        snapshots.send_replace(Some(Arc::new(snapshot)));
    }

    info!(snapshots = sequence, "Telemetry receiver ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeDrone, refused_socket};
    use std::net::{Ipv4Addr, SocketAddr};

    async fn listener() -> (TelemetryListener, JoinHandle<()>, SocketAddr, CancellationToken) {
        let _ = tracing_subscriber::fmt::try_init();
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.expect("bind telemetry");
        let addr = socket.local_addr().expect("local addr");
        let cancel = CancellationToken::new();
        let (listener, handle) = TelemetryListener::spawn(socket, cancel.clone());
        (listener, handle, addr, cancel)
    }

    async fn wait_for_sequence(listener: &TelemetryListener, sequence: u64) -> Arc<TelemetrySnapshot> {
        for _ in 0..100 {
            if let Some(snapshot) = listener.current() {
                if snapshot.sequence() >= sequence {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("telemetry sequence {sequence} never arrived");
    }

    #[tokio::test]
    async fn datagram_becomes_current_snapshot() {
        let (listener, _handle, addr, cancel) = listener().await;
        let drone = FakeDrone::bind().await.unwrap();
        assert!(listener.current().is_none());

        drone.send_to(addr, b"pitch:0;roll:-1;yaw:15;templ:70").await.unwrap();
        let snapshot = listener.wait_for_first(Duration::from_secs(2)).await.unwrap();

        assert_eq!(snapshot.pitch(), Some(0.0));
        assert_eq!(snapshot.roll(), Some(-1.0));
        assert_eq!(snapshot.yaw(), Some(15.0));
        assert_eq!(snapshot.get("templ"), Some(70.0));
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.sequence(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn non_utf8_datagram_is_skipped_without_stopping() {
        let (listener, handle, addr, cancel) = listener().await;
        let drone = FakeDrone::bind().await.unwrap();

        drone.send_to(addr, &[0xff, 0xfe, 0x3a, 0x31]).await.unwrap();
        drone.send_to(addr, b"bat:50;h:120").await.unwrap();

        let snapshot = wait_for_sequence(&listener, 1).await;
        assert_eq!(snapshot.battery(), Some(50.0));
        assert_eq!(snapshot.height(), Some(120.0));
        assert!(!handle.is_finished());
        cancel.cancel();
    }

    #[tokio::test]
    async fn newer_datagram_replaces_snapshot_entirely() {
        let (listener, _handle, addr, cancel) = listener().await;
        let drone = FakeDrone::bind().await.unwrap();

        drone.send_to(addr, b"bat:90;h:10").await.unwrap();
        wait_for_sequence(&listener, 1).await;
        drone.send_to(addr, b"bat:89").await.unwrap();
        let snapshot = wait_for_sequence(&listener, 2).await;

        assert_eq!(snapshot.battery(), Some(89.0));
        assert_eq!(snapshot.height(), None);
        cancel.cancel();
    }

    #[tokio::test]
    async fn wait_for_first_times_out() {
        let (listener, _handle, _, cancel) = listener().await;

        let err = listener.wait_for_first(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, DroneError::Timeout { .. }));
        cancel.cancel();
    }

    #[tokio::test]
    async fn updates_stream_yields_new_snapshots() {
        let (listener, _handle, addr, cancel) = listener().await;
        let drone = FakeDrone::bind().await.unwrap();
        let mut updates = listener.updates(UpdateRate::Native);

        drone.send_to(addr, b"tof:42").await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(2), updates.next())
            .await
            .expect("update in time")
            .expect("stream open");
        assert_eq!(snapshot.tof(), Some(42.0));
        cancel.cancel();
    }

    #[tokio::test]
    async fn receive_error_ends_the_loop() {
        let _ = tracing_subscriber::fmt::try_init();
        let socket = refused_socket().await.unwrap();
        let cancel = CancellationToken::new();
        let (listener, handle) = TelemetryListener::spawn(socket, cancel.clone());

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop ends on its own")
            .unwrap();
        assert!(!cancel.is_cancelled());
        assert!(listener.current().is_none());
        let err = listener.wait_for_first(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, DroneError::Timeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_ends_the_loop() {
        let (_listener, handle, _, cancel) = listener().await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits promptly")
            .unwrap();
    }
}

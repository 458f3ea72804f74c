//! End-to-end flight session against a scripted drone on loopback.
//!
//! The drone side answers control commands and pushes state and video datagrams;
//! `cat` plays the transcoder so raw bytes sent to the video port come back out as
//! frames unchanged.

use anyhow::{Context, Result};
use flightdeck::{ConnectionConfig, DroneClient, DroneError, ResponseMatching, UpdateRate};
use futures::StreamExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(3);

fn session_config(drone: SocketAddr) -> Result<ConnectionConfig> {
    let yaml = format!(
        r#"
host_ip: 127.0.0.1
command_port: 0
telemetry_port: 0
video_port: 0
drone_ip: {ip}
drone_port: {port}
speed: 30
command:
  poll_interval_ms: 50
shutdown:
  poll_interval_ms: 50
video:
  width: 16
  height: 8
  recv_timeout_ms: 100
  transcoder:
    program: cat
    args: []
    input_args: []
"#,
        ip = drone.ip(),
        port = drone.port()
    );
    Ok(ConnectionConfig::from_yaml_str(&yaml)?)
}

/// Scripted drone: answers every command, returns what it saw once the client
/// has been quiet for a while.
async fn scripted_drone() -> Result<(SocketAddr, JoinHandle<Vec<String>>)> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let addr = socket.local_addr()?;

    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];
        while let Ok(Ok((n, from))) =
            tokio::time::timeout(Duration::from_millis(800), socket.recv_from(&mut buf)).await
        {
            let command = String::from_utf8_lossy(&buf[..n]).into_owned();
            let reply = if command == "battery?" { "87" } else { "ok" };
            if socket.send_to(reply.as_bytes(), from).await.is_err() {
                break;
            }
            seen.push(command);
        }
        seen
    });

    Ok((addr, handle))
}

#[tokio::test]
async fn full_flight_session() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let (drone, script) = scripted_drone().await?;
    let config = session_config(drone)?;
    assert_eq!(config.command.matching, ResponseMatching::SinceSend);
    let geometry = config.video.geometry();

    let client = DroneClient::connect(config).await?;
    let addrs = client.local_addrs();
    let feeder = UdpSocket::bind("127.0.0.1:0").await?;

    assert_eq!(client.takeoff().await.as_deref(), Some("ok"));
    assert_eq!(client.forward(1.0).await.as_deref(), Some("ok"));
    assert_eq!(client.turn_right(90).await.as_deref(), Some("ok"));
    assert_eq!(
        client.send_command("battery?", flightdeck::SendMode::Blocking).await.as_deref(),
        Some("87")
    );

    // Telemetry
    let mut updates = client.telemetry_updates(UpdateRate::Native);
    feeder.send_to(b"pitch:1;roll:2;yaw:90;h:100;bat:86", addrs.telemetry).await?;
    let snapshot = tokio::time::timeout(WAIT, updates.next())
        .await
        .context("telemetry update timed out")?
        .context("telemetry stream ended")?;
    assert_eq!(snapshot.yaw(), Some(90.0));
    assert_eq!(snapshot.height(), Some(100.0));

    // Video
    let frame: Vec<u8> = (0..geometry.frame_len()).map(|i| (i % 200) as u8).collect();
    feeder.send_to(&frame, addrs.video).await?;
    let mut frames = client.frames(UpdateRate::Native);
    let encoded = tokio::time::timeout(WAIT, frames.next())
        .await
        .context("video frame timed out")?
        .context("frame stream ended")?;
    assert_eq!(&encoded.data[..2], &[0xFF, 0xD8]);
    assert_eq!(&encoded.source.data[..], &frame[..]);
    assert_eq!(encoded.source.pixel(1, 0), Some([3, 4, 5]));

    assert_eq!(client.land().await.as_deref(), Some("ok"));
    client.stop().await;
    client.stop().await;

    let seen = script.await?;
    assert_eq!(
        seen,
        ["command", "streamon", "speed 30", "takeoff", "forward 100", "cw 90", "battery?", "land"]
    );
    Ok(())
}

#[tokio::test]
async fn telemetry_wait_times_out_without_a_drone() -> Result<()> {
    let (drone, _script) = scripted_drone().await?;
    let client = DroneClient::connect(session_config(drone)?).await?;

    let err = client.wait_for_telemetry(Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(err, DroneError::Timeout { .. }));
    assert!(!err.recovery_suggestions().is_empty());

    client.stop().await;
    Ok(())
}

//! Async control, telemetry and video client for UDP-addressable drones.
//!
//! flightdeck speaks the text control protocol of small SDK drones: commands go out
//! as single UDP datagrams, replies and state broadcasts come back on their own
//! ports, and the camera streams compressed video that is decoded by an external
//! transcoder and re-encoded as JPEG stills.
//!
//! # Features
//!
//! - **Serialized commands**: at most one command in flight, bounded reply wait
//! - **Live telemetry**: the latest state datagram as a typed snapshot
//! - **Video**: bounded ingress → transcoder → JPEG pipeline with backpressure
//! - **Clean shutdown**: one cancellation token, bounded joins, no leaked sockets
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use flightdeck::{ConnectionConfig, DroneClient, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> flightdeck::Result<()> {
//!     let client = DroneClient::connect(ConnectionConfig::default()).await?;
//!
//!     client.takeoff().await;
//!     client.up(0.5).await;
//!     client.turn_right(90).await;
//!
//!     let mut telemetry = client.telemetry_updates(UpdateRate::Max(2));
//!     if let Some(snapshot) = telemetry.next().await {
//!         println!("battery: {:?}%", snapshot.battery());
//!     }
//!
//!     if let Some(frame) = client.next_encoded_frame().await {
//!         println!("frame {} is {} bytes of JPEG", frame.sequence, frame.len());
//!     }
//!
//!     client.land().await;
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub mod client;
pub mod command;
pub mod config;
mod driver;
pub mod stream;
pub mod telemetry;
pub mod video;

pub use client::{DEFAULT_DISTANCE_M, DEFAULT_TURN_DEGREES, DroneClient, LocalAddrs};
pub use command::{CommandChannel, SendMode};
pub use config::{
    CommandConfig, ConnectionConfig, DEFAULT_SPEED, ResponseMatching, ShutdownConfig,
    TranscoderConfig, VideoConfig,
};
pub use error::*;
pub use telemetry::TelemetryListener;
pub use types::*;
pub use video::VideoPipeline;

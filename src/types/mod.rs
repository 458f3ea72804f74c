//! Core data types shared by the command, telemetry and video components.
//!
//! ## Overview
//!
//! - [`Command`] is one control-protocol request; its `Display` is the wire token
//! - [`TelemetrySnapshot`] is the latest fully parsed telemetry datagram
//! - [`RawFrame`] is one fixed-size RGB24 window of transcoder output
//! - [`EncodedFrame`] is the JPEG still derived from one raw frame
//! - [`UpdateRate`] controls how often subscriber streams yield
//!
//! ## Usage Example
//!
//! ```rust
//! use flightdeck::types::{Command, Direction, TelemetrySnapshot};
//!
//! let command = Command::move_meters(Direction::Up, 0.25);
//! assert_eq!(command.to_string(), "up 25");
//!
//! let snapshot = TelemetrySnapshot::parse("pitch:0;roll:-1;bat:87");
//! assert_eq!(snapshot.battery(), Some(87.0));
//! ```

mod command;
mod frame;
mod telemetry;
mod update_rate;

pub use command::{Command, Direction, Rotation};
pub use frame::{EncodedFrame, FrameGeometry, RawFrame};
pub use telemetry::TelemetrySnapshot;
pub use update_rate::UpdateRate;

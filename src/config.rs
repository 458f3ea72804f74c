//! Client configuration
//!
//! All settings have defaults matching the reference deployment (drone access point
//! at `192.168.10.1`, host at `192.168.10.2`), so a YAML file only needs the keys it
//! changes:
//!
//! ```rust
//! use flightdeck::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_yaml_str("host_ip: 0.0.0.0\nspeed: 20\n").unwrap();
//! assert_eq!(config.speed, 20);
//! assert_eq!(config.telemetry_port, 8890);
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::types::FrameGeometry;
use crate::{DroneError, Result};

/// Default cruising speed sent during the handshake, in cm/s.
pub const DEFAULT_SPEED: i32 = 10;

/// How a command send decides that a reply belongs to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMatching {
    /// Accept only a reply that arrived after the command was transmitted.
    #[default]
    SinceSend,
    /// Accept whatever the last received reply is, however old.
    Latest,
}

/// Connection settings for one drone. Immutable once the client is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Local address the control and telemetry sockets bind to
    pub host_ip: IpAddr,
    /// Local control port (replies arrive here)
    pub command_port: u16,
    /// Local telemetry port
    pub telemetry_port: u16,
    /// Local video ingress port
    pub video_port: u16,
    /// Drone address
    pub drone_ip: IpAddr,
    /// Drone control port
    pub drone_port: u16,
    /// Cruising speed sent during the handshake (cm/s)
    pub speed: i32,
    pub command: CommandConfig,
    pub shutdown: ShutdownConfig,
    pub video: VideoConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 10, 2)),
            command_port: 8889,
            telemetry_port: 8890,
            video_port: 11111,
            drone_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 10, 1)),
            drone_port: 8889,
            speed: DEFAULT_SPEED,
            command: CommandConfig::default(),
            shutdown: ShutdownConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Parse a configuration from YAML. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| DroneError::config("YAML configuration", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| DroneError::io(format!("reading {}", path.display()), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject settings that would make the client unusable.
    ///
    /// Command arguments (speed, distances) are deliberately not range-checked here;
    /// the drone is the authority on what it accepts.
    pub fn validate(&self) -> Result<()> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(DroneError::config(
                "video",
                format!("frame size {}x{} must be non-zero", self.video.width, self.video.height),
            ));
        }
        if self.video.datagram_capacity == 0 {
            return Err(DroneError::config("video", "datagram_capacity must be non-zero"));
        }
        if self.video.queue_depth == 0 {
            return Err(DroneError::config("video", "queue_depth must be non-zero"));
        }
        if !(1..=100).contains(&self.video.jpeg_quality) {
            return Err(DroneError::config(
                "video",
                format!("jpeg_quality {} must be within 1..=100", self.video.jpeg_quality),
            ));
        }
        if self.video.transcoder.program.trim().is_empty() {
            return Err(DroneError::config("video.transcoder", "program must not be empty"));
        }
        Ok(())
    }

    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host_ip, self.command_port)
    }

    pub fn telemetry_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host_ip, self.telemetry_port)
    }

    pub fn video_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host_ip, self.video_port)
    }

    pub fn drone_addr(&self) -> SocketAddr {
        SocketAddr::new(self.drone_ip, self.drone_port)
    }
}

/// Command channel timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Interval between checks of the response cell
    pub poll_interval_ms: u64,
    /// Number of checks before a send gives up
    pub poll_attempts: u32,
    pub matching: ResponseMatching,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            poll_attempts: 4,
            matching: ResponseMatching::default(),
        }
    }
}

impl CommandConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest time a send waits for a reply.
    pub fn response_ceiling(&self) -> Duration {
        self.poll_interval() * self.poll_attempts
    }
}

/// Bounded wait shared by all background tasks during `stop()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub poll_interval_ms: u64,
    pub poll_attempts: u32,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 300, poll_attempts: 30 }
    }
}

impl ShutdownConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest `stop()` waits before aborting whatever is still running.
    pub fn ceiling(&self) -> Duration {
        self.poll_interval() * self.poll_attempts
    }
}

/// Video ingress, transcoding and encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    /// Receive timeout on the video socket
    pub recv_timeout_ms: u64,
    /// Receive buffer size per datagram
    pub datagram_capacity: usize,
    pub jpeg_quality: u8,
    /// Capacity of each bounded stage queue
    pub queue_depth: usize,
    /// Nominal frame rate of the camera, used to normalize stream throttling
    pub source_fps: f64,
    pub transcoder: TranscoderConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 720,
            recv_timeout_ms: 500,
            datagram_capacity: 2048,
            jpeg_quality: 80,
            queue_depth: 2,
            source_fps: 30.0,
            transcoder: TranscoderConfig::default(),
        }
    }
}

impl VideoConfig {
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

/// External transcoder command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub program: String,
    /// Full argument list. When absent, an ffmpeg argument list is generated for the
    /// configured frame geometry.
    pub args: Option<Vec<String>>,
    /// Extra arguments inserted before the input (e.g. hardware acceleration flags)
    pub input_args: Vec<String>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            args: None,
            input_args: vec!["-hwaccel".to_string(), "auto".to_string()],
        }
    }
}

impl TranscoderConfig {
    /// Arguments passed to the transcoder for the given output geometry.
    pub fn resolved_args(&self, geometry: FrameGeometry) -> Vec<String> {
        if let Some(args) = &self.args {
            return args.clone();
        }

        let mut args = vec!["-loglevel".to_string(), "error".to_string()];
        args.extend(self.input_args.iter().cloned());
        args.extend(
            [
                "-i",
                "pipe:0",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", geometry.width, geometry.height),
                "-f",
                "rawvideo",
                "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

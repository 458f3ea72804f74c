//! Error types for the drone client.
//!
//! Only construction-time failures (and explicit waits) are surfaced to callers.
//! Everything that happens inside the receiver loops is absorbed, logged, and turned
//! into stale state or an absent response instead of an error.
//!
//! ## Error Categories
//!
//! - **Bind Errors**: A control, telemetry or video socket could not be bound
//! - **Transcoder Errors**: The external video transcoder could not be launched
//! - **Config Errors**: Configuration could not be read or parsed
//! - **Encode Errors**: A raw frame could not be compressed
//! - **Timeout Errors**: An explicit wait ran out of time
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use flightdeck::DroneError;
//!
//! let error = DroneError::timeout(std::time::Duration::from_secs(2));
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for drone client operations.
pub type Result<T, E = DroneError> = std::result::Result<T, E>;

/// Which of the client's sockets an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    Command,
    Telemetry,
    Video,
}

impl std::fmt::Display for SocketRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SocketRole::Command => "command",
            SocketRole::Telemetry => "telemetry",
            SocketRole::Video => "video",
        };
        f.write_str(name)
    }
}

/// Main error type for drone client operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DroneError {
    #[error("Failed to bind {role} socket on {addr}")]
    Bind {
        role: SocketRole,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch transcoder '{program}'")]
    Transcoder {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Failed to encode frame {sequence}")]
    Encode {
        sequence: u64,
        #[source]
        source: image::ImageError,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Invalid command: {details}")]
    InvalidCommand { details: String },
}

impl DroneError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            DroneError::Bind { .. } => true,
            DroneError::Timeout { .. } => true,
            DroneError::Io { .. } => true,
            DroneError::Encode { .. } => true,
            DroneError::Transcoder { .. } => false,
            DroneError::Config { .. } => false,
            DroneError::InvalidCommand { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DroneError::Bind { .. } => vec![
                "Check that no other client is bound to the same port",
                "Verify the host address belongs to a local interface",
                "Join the drone's Wi-Fi network before connecting",
            ],
            DroneError::Transcoder { .. } => vec![
                "Ensure ffmpeg is installed and on PATH",
                "Point video.transcoder.program at a valid executable",
            ],
            DroneError::Io { .. } => vec![
                "Check network connectivity to the drone",
                "Retry the operation",
            ],
            DroneError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Remove unknown or mistyped keys",
            ],
            DroneError::Encode { .. } => vec![
                "Verify the transcoder emits rgb24 at the configured size",
                "Check frame width and height settings",
            ],
            DroneError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Verify the drone is powered on and in range",
            ],
            DroneError::InvalidCommand { .. } => vec![
                "Use one of: up, down, left, right, forward, back",
                "Use cw or ccw for rotations",
            ],
        }
    }

    /// Helper constructor for bind errors.
    pub fn bind_failed(role: SocketRole, addr: SocketAddr, source: std::io::Error) -> Self {
        DroneError::Bind { role, addr, source }
    }

    /// Helper constructor for I/O errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        DroneError::Io { context: context.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        DroneError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for timeout errors.
    pub fn timeout(duration: Duration) -> Self {
        DroneError::Timeout { duration }
    }

    /// Helper constructor for invalid command errors.
    pub fn invalid_command(details: impl Into<String>) -> Self {
        DroneError::InvalidCommand { details: details.into() }
    }
}

impl From<std::io::Error> for DroneError {
    fn from(err: std::io::Error) -> Self {
        DroneError::Io { context: "<unknown>".to_string(), source: err }
    }
}

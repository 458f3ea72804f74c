//! Drone client: the facade over commands, telemetry and video
//!
//! [`DroneClient::connect`] binds all three sockets, starts the transcoder and the
//! background tasks, and performs the handshake. The semantic operations translate
//! to control-protocol tokens and go through the shared [`CommandChannel`].

use futures::Stream;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{CommandChannel, SendMode};
use crate::config::{ConnectionConfig, ShutdownConfig};
use crate::driver::{Driver, DriverSockets, DriverTasks};
use crate::error::SocketRole;
use crate::telemetry::TelemetryListener;
use crate::types::{
    Command, Direction, EncodedFrame, RawFrame, Rotation, TelemetrySnapshot, UpdateRate,
};
use crate::video::{self, Transcoder, VideoPipeline};
use crate::{DroneError, Result};


/// Distance used by callers that do not pick one, in meters.
pub const DEFAULT_DISTANCE_M: f64 = 0.25;

/// Rotation used by callers that do not pick one, in degrees.
pub const DEFAULT_TURN_DEGREES: i32 = 30;

/// Addresses the client's sockets are actually bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAddrs {
    pub command: SocketAddr,
    pub telemetry: SocketAddr,
    pub video: SocketAddr,
}

/// Everything `stop()` tears down.
struct Lifecycle {
    tasks: DriverTasks,
    transcoder: Transcoder,
}

/// Connected drone client.
///
/// Share it between tasks with `Arc<DroneClient>`. Commands from any number of
/// callers are serialized by the channel's gate.
pub struct DroneClient {
    commands: CommandChannel,
    telemetry: TelemetryListener,
    video: VideoPipeline,
    local: LocalAddrs,
    shutdown: ShutdownConfig,
    cancel: CancellationToken,
    lifecycle: Mutex<Option<Lifecycle>>,
}

impl DroneClient {
    /// Bind sockets, launch the transcoder, start all loops and run the handshake.
    ///
    /// Fails if a socket cannot be bound or the transcoder cannot be launched;
    /// anything created before the failure is released again. Unanswered handshake
    /// commands are logged, not treated as errors.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        info!(drone = %config.drone_addr(), host = %config.host_ip, "Connecting to drone");

        let command = bind_udp(SocketRole::Command, config.command_addr()).await?;
        let telemetry = bind_udp(SocketRole::Telemetry, config.telemetry_addr()).await?;
        let video = video::bind_video_socket(config.video_addr())?;
        let local = LocalAddrs {
            command: local_addr(&command, SocketRole::Command)?,
            telemetry: local_addr(&telemetry, SocketRole::Telemetry)?,
            video: local_addr(&video, SocketRole::Video)?,
        };

        let (transcoder, stdin, stdout) =
            Transcoder::spawn(&config.video.transcoder, config.video.geometry())?;

        let channels = Driver::spawn(DriverSockets { command, telemetry, video }, stdin, stdout, &config);

        let client = Self {
            commands: channels.commands,
            telemetry: channels.telemetry,
            video: channels.video,
            local,
            shutdown: config.shutdown.clone(),
            cancel: channels.cancel,
            lifecycle: Mutex::new(Some(Lifecycle { tasks: channels.tasks, transcoder })),
        };

        client.handshake(config.speed).await;
        info!(
            command = %local.command,
            telemetry = %local.telemetry,
            video = %local.video,
            "Drone client connected"
        );
        Ok(client)
    }

    async fn handshake(&self, speed: i32) {
        for command in [Command::Enter, Command::StreamOn, Command::Speed(speed)] {
            match self.execute(command).await {
                Some(reply) => debug!(command = %command, reply = %reply, "Handshake step answered"),
                None => warn!(command = %command, "Handshake step got no reply"),
            }
        }
    }

    async fn execute(&self, command: Command) -> Option<String> {
        self.commands.send(&command.to_string(), SendMode::Blocking).await
    }

    pub async fn takeoff(&self) -> Option<String> {
        self.execute(Command::Takeoff).await
    }

    pub async fn land(&self) -> Option<String> {
        self.execute(Command::Land).await
    }

    /// Cut the motors immediately.
    pub async fn emergency_stop(&self) -> Option<String> {
        self.execute(Command::Emergency).await
    }

    /// Move `distance_m` meters, rounded half-to-even to whole centimeters.
    pub async fn move_by(&self, direction: Direction, distance_m: f64) -> Option<String> {
        self.execute(Command::move_meters(direction, distance_m)).await
    }

    pub async fn up(&self, distance_m: f64) -> Option<String> {
        self.move_by(Direction::Up, distance_m).await
    }

    pub async fn down(&self, distance_m: f64) -> Option<String> {
        self.move_by(Direction::Down, distance_m).await
    }

    pub async fn left(&self, distance_m: f64) -> Option<String> {
        self.move_by(Direction::Left, distance_m).await
    }

    pub async fn right(&self, distance_m: f64) -> Option<String> {
        self.move_by(Direction::Right, distance_m).await
    }

    pub async fn forward(&self, distance_m: f64) -> Option<String> {
        self.move_by(Direction::Forward, distance_m).await
    }

    pub async fn back(&self, distance_m: f64) -> Option<String> {
        self.move_by(Direction::Back, distance_m).await
    }

    pub async fn turn(&self, rotation: Rotation, degrees: i32) -> Option<String> {
        self.execute(Command::Turn { rotation, degrees }).await
    }

    /// Counter-clockwise turn.
    pub async fn turn_left(&self, degrees: i32) -> Option<String> {
        self.turn(Rotation::CounterClockwise, degrees).await
    }

    /// Clockwise turn.
    pub async fn turn_right(&self, degrees: i32) -> Option<String> {
        self.turn(Rotation::Clockwise, degrees).await
    }

    /// Set cruising speed in cm/s.
    pub async fn set_speed(&self, cm_per_s: i32) -> Option<String> {
        self.execute(Command::Speed(cm_per_s)).await
    }

    /// Send a raw protocol token.
    pub async fn send_command(&self, command: &str, mode: SendMode) -> Option<String> {
        self.commands.send(command, mode).await
    }

    /// The underlying command channel, for callers that drive it directly.
    pub fn commands(&self) -> &CommandChannel {
        &self.commands
    }

    pub fn current_telemetry(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.telemetry.current()
    }

    pub fn telemetry_updates(
        &self,
        rate: UpdateRate,
    ) -> impl Stream<Item = Arc<TelemetrySnapshot>> + 'static {
        self.telemetry.updates(rate)
    }

    /// Wait for the first telemetry datagram.
    pub async fn wait_for_telemetry(&self, timeout: Duration) -> Result<Arc<TelemetrySnapshot>> {
        self.telemetry.wait_for_first(timeout).await
    }

    /// Next JPEG frame; `None` once the client has stopped.
    pub async fn next_encoded_frame(&self) -> Option<EncodedFrame> {
        self.video.next_encoded_frame().await
    }

    /// Raw pixels of the next frame; `None` once the client has stopped.
    pub async fn next_raw_frame(&self) -> Option<RawFrame> {
        self.video.next_raw_frame().await
    }

    pub fn frames(&self, rate: UpdateRate) -> impl Stream<Item = EncodedFrame> + 'static {
        self.video.frames(rate)
    }

    pub fn local_addrs(&self) -> LocalAddrs {
        self.local
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop every loop, release the sockets and kill the transcoder.
    ///
    /// Waits a bounded time for each loop. Calling it again is a no-op.
    pub async fn stop(&self) {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Lifecycle { tasks, mut transcoder }) = lifecycle else {
            debug!("Drone client already stopped");
            return;
        };

        info!("Stopping drone client");
        self.cancel.cancel();
        self.commands.close();
        tasks.shutdown(&self.shutdown).await;
        transcoder.kill().await;
        info!("Drone client stopped");
    }
}

impl Drop for DroneClient {
    fn drop(&mut self) {
        debug!("Dropping drone client");
        // The transcoder is killed when its handle drops with the lifecycle.
        self.cancel.cancel();
    }
}

async fn bind_udp(role: SocketRole, addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr).await.map_err(|e| DroneError::bind_failed(role, addr, e))
}

fn local_addr(socket: &UdpSocket, role: SocketRole) -> Result<SocketAddr> {
    socket.local_addr().map_err(|e| DroneError::io(format!("reading {role} socket address"), e))
}

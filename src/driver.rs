//! Driver spawns and manages the client's background tasks

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{CommandChannel, CommandTasks};
use crate::config::{ConnectionConfig, ShutdownConfig};
use crate::telemetry::TelemetryListener;
use crate::video::{VideoPipeline, VideoTasks};

/// The bound sockets the driver takes ownership of.
pub struct DriverSockets {
    pub command: UdpSocket,
    pub telemetry: UdpSocket,
    pub video: UdpSocket,
}

/// Result of spawning driver tasks
pub struct DriverChannels {
    pub commands: CommandChannel,
    pub telemetry: TelemetryListener,
    pub video: VideoPipeline,
    /// Join handles, consumed by [`DriverTasks::shutdown`]
    pub tasks: DriverTasks,
    /// Cancellation token shared by every task
    pub cancel: CancellationToken,
}

/// Join handles of every background task.
pub struct DriverTasks {
    command: CommandTasks,
    telemetry: JoinHandle<()>,
    video: VideoTasks,
}

/// Spawns the receiver loops under one cancellation token
pub struct Driver;

impl Driver {
    /// Spawn all background tasks.
    ///
    /// The sockets are moved into the tasks and are closed when the tasks end.
    pub fn spawn<R, W>(
        sockets: DriverSockets,
        transcoder_in: W,
        transcoder_out: R,
        config: &ConnectionConfig,
    ) -> DriverChannels
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let peer: SocketAddr = config.drone_addr();

        let (commands, command_tasks) =
            CommandChannel::spawn(Arc::new(sockets.command), peer, &config.command, cancel.clone());
        let (telemetry, telemetry_task) = TelemetryListener::spawn(sockets.telemetry, cancel.clone());
        let (video, video_tasks) = VideoPipeline::spawn(
            sockets.video,
            transcoder_in,
            transcoder_out,
            &config.video,
            cancel.clone(),
        );

        debug!(%peer, "Driver tasks spawned");

        DriverChannels {
            commands,
            telemetry,
            video,
            tasks: DriverTasks { command: command_tasks, telemetry: telemetry_task, video: video_tasks },
            cancel,
        }
    }
}

impl DriverTasks {
    /// Wait for every task to exit after cancellation.
    ///
    /// The response receiver goes first, then the remaining tasks. All tasks share
    /// one bounded wait; any still running at the deadline are aborted. Every
    /// handle is awaited, so every socket has been dropped when this returns.
    pub async fn shutdown(self, config: &ShutdownConfig) {
        let DriverTasks { command, telemetry, video } = self;
        let tasks = vec![
            ("response receiver", command.receiver),
            ("command sender", command.sender),
            ("telemetry receiver", telemetry),
            ("video ingress", video.ingress),
            ("frame extraction", video.extraction),
            ("frame encoding", video.encoding),
        ];

        join_all_bounded(tasks, config).await;
        info!("All driver tasks stopped");
    }
}

async fn join_all_bounded(tasks: Vec<(&'static str, JoinHandle<()>)>, config: &ShutdownConfig) {
    let deadline = Instant::now() + config.ceiling();
    for (name, handle) in tasks {
        join_bounded(name, handle, deadline, config.poll_interval()).await;
    }
}

async fn join_bounded(
    name: &'static str,
    handle: JoinHandle<()>,
    deadline: Instant,
    poll_interval: Duration,
) {
    while !handle.is_finished() && Instant::now() < deadline {
        tokio::time::sleep(poll_interval.min(deadline - Instant::now())).await;
    }

    if !handle.is_finished() {
        warn!(task = name, "Task did not stop in time, aborting");
        handle.abort();
    }

    match handle.await {
        Ok(()) => debug!(task = name, "Task stopped"),
        Err(e) if e.is_cancelled() => debug!(task = name, "Task aborted"),
        Err(e) => error!(task = name, "Task panicked: {}", e),
    }
}

//! Command channel: one command in flight, replies matched by arrival
//!
//! The control protocol carries no request identifiers. The drone answers each
//! command with a short text datagram, and the channel treats the most recently
//! received datagram as "the" response. To keep that guess honest, only one command
//! may be outstanding at a time: callers acquire a single-permit gate, hand the
//! command (and the permit) to the sender task, and wait for its verdict.
//!
//! ```text
//! caller ──permit──▶ job queue ──▶ sender task ──send_to──▶ drone
//!                                      │
//!                                      └── polls ◀── response cell ◀── receiver task
//! ```
//!
//! The permit travels inside the job, so a caller that gives up early never leaves
//! the gate held: the permit is released when the sender task finishes the exchange.

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{CommandConfig, ResponseMatching};

/// Receive buffer for command replies.
pub const RESPONSE_BUFFER_LEN: usize = 3000;

/// What a send does when another command is already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Wait for the gate.
    #[default]
    Blocking,
    /// Give up immediately and send nothing.
    NonBlocking,
}

struct CommandJob {
    command: String,
    permit: OwnedSemaphorePermit,
    reply: oneshot::Sender<Option<String>>,
}

/// Handle for sending commands. Cheap to clone; all clones share one gate.
#[derive(Clone)]
pub struct CommandChannel {
    gate: Arc<Semaphore>,
    jobs: mpsc::Sender<CommandJob>,
    responses: watch::Receiver<Option<Bytes>>,
}

/// Join handles of the command channel's background tasks.
pub struct CommandTasks {
    pub receiver: JoinHandle<()>,
    pub sender: JoinHandle<()>,
}

impl CommandChannel {
    /// Start the sender and response-receiver tasks on an already bound socket.
    pub fn spawn(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        config: &CommandConfig,
        cancel: CancellationToken,
    ) -> (Self, CommandTasks) {
        let (response_tx, response_rx) = watch::channel(None);
        let (job_tx, job_rx) = mpsc::channel(1);

        let receiver = tokio::spawn(response_receiver_task(
            socket.clone(),
            response_tx,
            cancel.clone(),
        ));
        let sender = tokio::spawn(sender_task(
            socket,
            peer,
            job_rx,
            response_rx.clone(),
            config.clone(),
            cancel,
        ));

        let channel = Self { gate: Arc::new(Semaphore::new(1)), jobs: job_tx, responses: response_rx };
        (channel, CommandTasks { receiver, sender })
    }

    /// Send one command and wait for its reply.
    ///
    /// Returns `None` when no reply arrived in time, when `mode` is
    /// [`SendMode::NonBlocking`] and another command is in flight, or when the
    /// channel has been closed. None of these are errors: the caller decides
    /// whether to retry.
    pub async fn send(&self, command: &str, mode: SendMode) -> Option<String> {
        let permit = match mode {
            SendMode::Blocking => match self.gate.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(command, "Command channel closed");
                    return None;
                }
            },
            SendMode::NonBlocking => match self.gate.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => {
                    warn!(command, status = "not_acquired", "Command already in flight, not sending");
                    return None;
                }
                Err(TryAcquireError::Closed) => {
                    debug!(command, "Command channel closed");
                    return None;
                }
            },
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = CommandJob { command: command.to_string(), permit, reply: reply_tx };
        if self.jobs.send(job).await.is_err() {
            debug!(command, "Command sender has stopped");
            return None;
        }

        reply_rx.await.ok().flatten()
    }

    /// Whether a command currently holds the gate.
    pub fn in_flight(&self) -> bool {
        !self.gate.is_closed() && self.gate.available_permits() == 0
    }

    /// The most recently received reply, however old.
    pub fn last_response(&self) -> Option<String> {
        self.responses.borrow().as_deref().map(decode)
    }

    /// Refuse all further sends. Sends already waiting for the gate return `None`.
    pub fn close(&self) {
        self.gate.close();
    }

    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Owns the transmit side of the socket; runs one exchange at a time.
async fn sender_task(
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    mut jobs: mpsc::Receiver<CommandJob>,
    mut responses: watch::Receiver<Option<Bytes>>,
    config: CommandConfig,
    cancel: CancellationToken,
) {
    info!(%peer, "Command sender started");
    let mut sent = 0u64;

    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let CommandJob { command, permit, reply } = job;
        let response = tokio::select! {
            _ = cancel.cancelled() => None,
            response = exchange(&socket, peer, &command, &mut responses, &config) => response,
        };
        sent += 1;

        // The caller may have given up; the permit is released either way.
        drop(permit);
        let _ = reply.send(response);
    }

    info!(commands = sent, "Command sender ended");
}

async fn exchange(
    socket: &UdpSocket,
    peer: SocketAddr,
    command: &str,
    responses: &mut watch::Receiver<Option<Bytes>>,
    config: &CommandConfig,
) -> Option<String> {
    if config.matching == ResponseMatching::SinceSend {
        // Anything already in the cell predates this command.
        responses.mark_unchanged();
    }

    if let Err(e) = socket.send_to(command.as_bytes(), peer).await {
        error!(command, %peer, "Failed to send command: {}", e);
        return None;
    }
    debug!(command, %peer, "Command sent");

    let interval = config.poll_interval();
    for attempt in 0..=config.poll_attempts {
        if let Some(response) = check_response(responses, config.matching) {
            debug!(command, response = %response, attempt, "Command answered");
            return Some(response);
        }
        if attempt < config.poll_attempts {
            tokio::time::sleep(interval).await;
        }
    }

    warn!(
        command,
        waited = ?(interval * config.poll_attempts),
        "No response to command"
    );
    None
}

fn check_response(
    responses: &mut watch::Receiver<Option<Bytes>>,
    matching: ResponseMatching,
) -> Option<String> {
    match matching {
        ResponseMatching::SinceSend => {
            if !responses.has_changed().unwrap_or(false) {
                return None;
            }
            responses.borrow_and_update().as_deref().map(decode)
        }
        ResponseMatching::Latest => responses.borrow().as_deref().map(decode),
    }
}

/// Every datagram on the control socket replaces the response cell.
async fn response_receiver_task(
    socket: Arc<UdpSocket>,
    responses: watch::Sender<Option<Bytes>>,
    cancel: CancellationToken,
) {
    info!("Response receiver started");
    let mut buf = vec![0u8; RESPONSE_BUFFER_LEN];
    let mut received = 0u64;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Response receiver cancelled");
                break;
            }
            result = socket.recv_from(&mut buf) => result,
        };

        match result {
            Ok((n, from)) => {
                received += 1;
                let payload = Bytes::copy_from_slice(&buf[..n]);
                info!(%from, response = %String::from_utf8_lossy(&payload), "Response received");
                trace!(bytes = n, count = received, "Response cell updated");
                responses.send_replace(Some(payload));
            }
            Err(e) => {
                error!("Control socket receive failed, no further responses will arrive: {}", e);
                break;
            }
        }
    }

    info!(responses = received, "Response receiver ended");
}

//! Multi-consumer queue of encoded frames
//!
//! Waiting consumers park on a [`Notify`], never on the receiver itself. The
//! receiver lock is only taken for a non-blocking `try_recv`, so a consumer that
//! parks and is then left unpolled cannot starve the others.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::{SendError, TryRecvError};
use tokio::sync::{Notify, mpsc};

use crate::types::EncodedFrame;

/// Bounded queue with one producer side and any number of consumers.
pub(crate) fn frame_queue(depth: usize) -> (FrameSink, FrameQueue) {
    let (tx, rx) = mpsc::channel(depth);
    let ready = Arc::new(Notify::new());
    let sink = FrameSink { tx: Some(tx), ready: ready.clone() };
    (sink, FrameQueue { frames: Mutex::new(rx), ready })
}

/// Producer side, owned by the encoding stage.
pub(crate) struct FrameSink {
    tx: Option<mpsc::Sender<EncodedFrame>>,
    ready: Arc<Notify>,
}

impl FrameSink {
    /// Wait for room in the queue, then wake every parked consumer.
    pub(crate) async fn send(&self, frame: EncodedFrame) -> Result<(), SendError<EncodedFrame>> {
        match &self.tx {
            Some(tx) => tx.send(frame).await?,
            None => return Err(SendError(frame)),
        }
        self.ready.notify_waiters();
        Ok(())
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        // Close first so woken consumers observe the disconnect.
        drop(self.tx.take());
        self.ready.notify_waiters();
    }
}

/// Consumer side. Each frame goes to exactly one caller of [`FrameQueue::next`].
pub(crate) struct FrameQueue {
    frames: Mutex<mpsc::Receiver<EncodedFrame>>,
    ready: Arc<Notify>,
}

impl FrameQueue {
    /// Next frame, or `None` once the producer is gone and the queue is empty.
    pub(crate) async fn next(&self) -> Option<EncodedFrame> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Registered before the check so a frame queued in between still wakes us.
            notified.as_mut().enable();

            match self.try_next() {
                Ok(frame) => return Some(frame),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => notified.await,
            }
        }
    }

    fn try_next(&self) -> Result<EncodedFrame, TryRecvError> {
        let mut frames = self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        frames.try_recv()
    }
}

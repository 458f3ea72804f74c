//! Video pipeline: UDP ingress → transcoder → frame extraction → JPEG encoding
//!
//! Each stage is its own task joined to the next by a bounded queue, so a slow
//! consumer applies backpressure all the way back to the transcoder instead of
//! buffering frames without limit.
//!
//! ```text
//! UDP ──▶ ingress ──▶ transcoder stdin
//!                     transcoder stdout ──▶ extraction ─[raw]─▶ encoding ─[jpeg]─▶ consumers
//! ```
//!
//! Consumers share one output queue. Several concurrent consumers each receive a
//! disjoint share of the frames, first come first served; nothing is broadcast.
//! A consumer that stops polling holds no frame and no lock.

mod encode;
mod extract;
mod ingress;
mod queue;
mod transcoder;

pub use encode::encode_jpeg;
pub use extract::FrameExtractor;
pub use ingress::bind_video_socket;
pub use transcoder::Transcoder;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::VideoConfig;
use crate::types::{EncodedFrame, FrameGeometry, RawFrame, UpdateRate};

/// Consumer side of the video pipeline. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct VideoPipeline {
    encoded: Arc<queue::FrameQueue>,
    geometry: FrameGeometry,
    source_fps: f64,
}

/// Join handles of the pipeline stages.
pub struct VideoTasks {
    pub ingress: JoinHandle<()>,
    pub extraction: JoinHandle<()>,
    pub encoding: JoinHandle<()>,
}

impl VideoPipeline {
    /// Start all stages.
    ///
    /// `transcoder_in` receives the compressed stream and `transcoder_out` yields
    /// raw RGB24 frames; normally these are the transcoder's stdin and stdout.
    pub fn spawn<R, W>(
        socket: UdpSocket,
        transcoder_in: W,
        transcoder_out: R,
        config: &VideoConfig,
        cancel: CancellationToken,
    ) -> (Self, VideoTasks)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let geometry = config.geometry();
        let (raw_tx, raw_rx) = mpsc::channel(config.queue_depth);
        let (encoded_tx, encoded_rx) = queue::frame_queue(config.queue_depth);

        let ingress = tokio::spawn(ingress::ingress_task(
            socket,
            transcoder_in,
            config.datagram_capacity,
            config.recv_timeout(),
            cancel.clone(),
        ));
        let extraction = tokio::spawn(extract::extraction_task(
            FrameExtractor::new(transcoder_out, geometry),
            raw_tx,
            cancel.clone(),
        ));
        let encoding = tokio::spawn(encode::encoding_task(
            raw_rx,
            encoded_tx,
            config.jpeg_quality,
            cancel,
        ));

        let pipeline = Self {
            encoded: Arc::new(encoded_rx),
            geometry,
            source_fps: config.source_fps,
        };
        (pipeline, VideoTasks { ingress, extraction, encoding })
    }

    /// Wait for the next encoded frame. `None` once the pipeline has shut down.
    pub async fn next_encoded_frame(&self) -> Option<EncodedFrame> {
        self.encoded.next().await
    }

    /// Wait for the next frame and return its raw pixels.
    pub async fn next_raw_frame(&self) -> Option<RawFrame> {
        self.next_encoded_frame().await.map(|frame| frame.source)
    }

    /// Encoded frames as a stream.
    ///
    /// A limited rate takes at most one frame per interval from the shared queue;
    /// frames in between stay queued for other consumers.
    pub fn frames(&self, rate: UpdateRate) -> BoxStream<'static, EncodedFrame> {
        let queue = self.encoded.clone();

        match rate.throttle_interval(self.source_fps) {
            None => stream::unfold(queue, |queue| async move {
                let frame = queue.next().await;
                frame.map(|frame| (frame, queue))
            })
            .boxed(),
            Some(period) => stream::unfold((queue, None), move |(queue, ticks)| async move {
                let mut ticks = ticks.unwrap_or_else(|| {
                    let mut ticks = tokio::time::interval(period);
                    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticks
                });
                ticks.tick().await;
                let frame = queue.next().await;
                frame.map(|frame| (frame, (queue, Some(ticks))))
            })
            .boxed(),
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn source_fps(&self) -> f64 {
        self.source_fps
    }
}

//! Frame extraction: fixed-size windows cut from the transcoder's output

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::types::{FrameGeometry, RawFrame};

/// Accumulates transcoder output until a whole frame is available.
///
/// The output has no framing: every `width * height * 3` bytes is one frame. A
/// partially filled window survives empty reads and errors, so a stalled pipe
/// resumes exactly where it left off.
pub struct FrameExtractor<R> {
    reader: R,
    geometry: FrameGeometry,
    buffer: Vec<u8>,
    filled: usize,
    next_sequence: u64,
}

impl<R: AsyncRead + Unpin> FrameExtractor<R> {
    pub fn new(reader: R, geometry: FrameGeometry) -> Self {
        Self { reader, geometry, buffer: vec![0; geometry.frame_len()], filled: 0, next_sequence: 0 }
    }

    /// Read until the current window is full.
    ///
    /// Returns `Ok(None)` on a zero-byte read; the bytes gathered so far are kept
    /// for the next call. Cancel safe.
    pub async fn next_frame(&mut self) -> io::Result<Option<RawFrame>> {
        let frame_len = self.buffer.len();
        while self.filled < frame_len {
            let n = self.reader.read(&mut self.buffer[self.filled..]).await?;
            if n == 0 {
                return Ok(None);
            }
            self.filled += n;
        }

        let data = std::mem::replace(&mut self.buffer, vec![0; frame_len]);
        self.filled = 0;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Ok(RawFrame::new(data, sequence, self.geometry))
    }

    /// Bytes of the next frame received so far.
    pub fn pending_bytes(&self) -> usize {
        self.filled
    }

    pub fn frames_extracted(&self) -> u64 {
        self.next_sequence
    }
}

/// Feed extracted frames into `frames` until cancelled or the encoder goes away.
///
/// Empty reads and read errors are retried with exponential backoff.
pub(crate) async fn extraction_task<R>(
    mut extractor: FrameExtractor<R>,
    frames: mpsc::Sender<RawFrame>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    info!(frame_len = extractor.geometry.frame_len(), "Frame extraction started");
    let mut error_count = 0u32;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Frame extraction cancelled");
                break;
            }
            result = extractor.next_frame() => result,
        };

        match result {
            Ok(Some(frame)) => {
                error_count = 0;
                trace!(sequence = frame.sequence, "Raw frame extracted");
                let sent = tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = frames.send(frame) => sent,
                };
                if sent.is_err() {
                    debug!("Frame encoder dropped, stopping extraction");
                    break;
                }
                continue;
            }
            Ok(None) => {
                error_count += 1;
                debug!(
                    pending = extractor.pending_bytes(),
                    error_count, "Transcoder output empty, retrying"
                );
            }
            Err(e) => {
                error_count += 1;
                warn!(error_count, "Transcoder read failed: {}", e);
            }
        }

        // Exponential backoff: 100ms, 200ms, 400ms, ...
        let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
    }

    info!(frames = extractor.frames_extracted(), "Frame extraction ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ChunkedReader, TEST_GEOMETRY, frame_pattern};
    use proptest::prelude::*;

    async fn drain<R: AsyncRead + Unpin>(extractor: &mut FrameExtractor<R>) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        let mut idle = 0;
        while idle < 3 {
            match extractor.next_frame().await.unwrap() {
                Some(frame) => frames.push(frame),
                None => idle += 1,
            }
        }
        frames
    }

    #[tokio::test]
    async fn whole_frames_in_one_read() {
        let data = frame_pattern(TEST_GEOMETRY, 2);
        let mut extractor = FrameExtractor::new(ChunkedReader::new([data]), TEST_GEOMETRY);

        let frames = drain(&mut extractor).await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].data.iter().all(|&b| b == 0));
        assert!(frames[1].data.iter().all(|&b| b == 1));
        assert_eq!(frames[1].sequence, 1);
    }

    #[tokio::test]
    async fn empty_read_keeps_partial_window() {
        let data = frame_pattern(TEST_GEOMETRY, 1);
        let (head, tail) = data.split_at(10);
        let reader = ChunkedReader::new([head.to_vec(), Vec::new(), tail.to_vec()]);
        let mut extractor = FrameExtractor::new(reader, TEST_GEOMETRY);

        assert!(extractor.next_frame().await.unwrap().is_none());
        assert_eq!(extractor.pending_bytes(), 10);

        let frame = extractor.next_frame().await.unwrap().expect("frame after resume");
        assert_eq!(frame.data.len(), TEST_GEOMETRY.frame_len());
        assert_eq!(extractor.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn trailing_partial_window_is_not_emitted() {
        let mut data = frame_pattern(TEST_GEOMETRY, 1);
        data.extend_from_slice(&[9; 5]);
        let mut extractor = FrameExtractor::new(ChunkedReader::new([data]), TEST_GEOMETRY);

        let frames = drain(&mut extractor).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(extractor.pending_bytes(), 5);
    }

    #[tokio::test]
    async fn task_retries_until_the_window_fills() {
        let data = frame_pattern(TEST_GEOMETRY, 1);
        let (head, tail) = data.split_at(40);
        let reader = ChunkedReader::new([head.to_vec(), Vec::new(), tail.to_vec()]);
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(extraction_task(
            FrameExtractor::new(reader, TEST_GEOMETRY),
            tx,
            cancel.clone(),
        ));

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame in time")
            .expect("channel open");
        assert_eq!(frame.sequence, 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    proptest! {
        #[test]
        fn arbitrary_chunking_yields_exactly_one_frame_per_window(
            frames in 1usize..5,
            extra in 0usize..96,
            sizes in prop::collection::vec(1usize..200, 0..40),
        ) {
            let mut data = frame_pattern(TEST_GEOMETRY, frames);
            data.extend(std::iter::repeat_n(0xAA, extra % TEST_GEOMETRY.frame_len()));
            let reader = ChunkedReader::split(&data, &sizes);

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let extracted = runtime.block_on(async {
                let mut extractor = FrameExtractor::new(reader, TEST_GEOMETRY);
                drain(&mut extractor).await
            });

            prop_assert_eq!(extracted.len(), frames);
            for (n, frame) in extracted.iter().enumerate() {
                prop_assert_eq!(frame.sequence, n as u64);
                prop_assert_eq!(frame.data.len(), TEST_GEOMETRY.frame_len());
                prop_assert!(frame.data.iter().all(|&b| b == n as u8));
            }
        }
    }
}

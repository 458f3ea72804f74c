//! JPEG encoding of raw frames

use bytes::Bytes;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::queue::FrameSink;
use crate::types::{EncodedFrame, RawFrame};
use crate::{DroneError, Result};

/// Compress one frame. Stateless: the output depends only on the frame.
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Bytes> {
    let mut out = Vec::with_capacity(frame.data.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&frame.data, frame.geometry.width, frame.geometry.height, ExtendedColorType::Rgb8)
        .map_err(|source| DroneError::Encode { sequence: frame.sequence, source })?;
    Ok(Bytes::from(out))
}

/// Encode every raw frame on the blocking pool and queue the result.
///
/// A frame that fails to encode is dropped; the next one is tried as usual.
pub(crate) async fn encoding_task(
    mut raw: mpsc::Receiver<RawFrame>,
    encoded: FrameSink,
    quality: u8,
    cancel: CancellationToken,
) {
    info!(quality, "Frame encoder started");
    let mut count = 0u64;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Frame encoder cancelled");
                break;
            }
            frame = raw.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let sequence = frame.sequence;
        let source = frame.clone();
        let encoding = tokio::task::spawn_blocking(move || encode_jpeg(&source, quality));
        let encoded_data = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(sequence, "Frame encoder cancelled mid-frame");
                break;
            }
            result = encoding => result,
        };
        let data = match encoded_data {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                warn!(sequence, "Dropping frame: {}", e);
                continue;
            }
            Err(e) => {
                error!(sequence, "Encoder task failed: {}", e);
                continue;
            }
        };

        count += 1;
        trace!(sequence, bytes = data.len(), "Frame encoded");
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = encoded.send(EncodedFrame { data, sequence, source: frame }) => sent,
        };
        if sent.is_err() {
            debug!("Encoded frame consumers gone, stopping encoder");
            break;
        }
    }

    info!(frames = count, "Frame encoder ended");
}

//! Video frame types for the transcoding pipeline

use bytes::Bytes;
use std::sync::Arc;

/// Fixed pixel dimensions of the raw frames emitted by the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    /// Bytes per pixel (interleaved RGB)
    pub const CHANNELS: usize = 3;

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of one frame window in bytes
    pub const fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::CHANNELS
    }
}

/// One decoded frame: exactly `width * height * 3` bytes of RGB24.
///
/// Pixel data is shared (zero-copy via Arc), so clones are cheap.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Interleaved RGB pixel data
    pub data: Arc<[u8]>,

    /// Position of this frame in the transcoder's output (0-based)
    pub sequence: u64,

    pub geometry: FrameGeometry,
}

impl RawFrame {
    /// Create a frame from a complete window.
    ///
    /// Returns `None` when `data` is not exactly one window long.
    pub fn new(data: Vec<u8>, sequence: u64, geometry: FrameGeometry) -> Option<Self> {
        if data.len() != geometry.frame_len() {
            return None;
        }
        Some(Self { data: data.into(), sequence, geometry })
    }

    /// RGB triple at (x, y), or `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        let offset = (y as usize * self.geometry.width as usize + x as usize)
            * FrameGeometry::CHANNELS;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }
}

/// A JPEG still derived from exactly one [`RawFrame`].
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Compressed image bytes
    pub data: Bytes,

    /// Sequence number of the source raw frame
    pub sequence: u64,

    /// The raw frame this image was encoded from
    pub source: RawFrame,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

/// Frame data with zero-copy semantics
///
/// Frames are produced by an external capture pipeline and never mutated
/// afterwards. Cloning a frame only bumps reference counts.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Monotonically increasing, starting at 1
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Tightly packed 8-bit RGB
    Rgb24,
    /// Encoded JPEG (MJPEG cameras hand these out directly)
    Jpeg,
    /// Encoded PNG
    Png,
}

impl Frame {
    pub fn new(sequence: u64, width: u32, height: u32, format: PixelFormat, data: Bytes) -> Self {
        Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
                format,
                captured_at: Utc::now(),
            }),
            timestamp: Instant::now(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("format", &self.meta.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

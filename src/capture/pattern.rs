//! Synthetic frame source: a moving colour gradient at a fixed frame rate.

use std::time::Duration;

use bytes::Bytes;
use tracing::{info, instrument};

use crate::{
    capture::frame::{Frame, PixelFormat},
    CaptureConfig,
};

/// Test-pattern capture with the same shape as a camera source
pub struct PatternCapture {
    config: CaptureConfig,
    sequence: u64,
    interval: tokio::time::Interval,
}

impl PatternCapture {
    pub fn new(config: CaptureConfig) -> Self {
        info!(
            "Initializing test pattern capture: {}x{} @ {}fps",
            config.width, config.height, config.fps
        );
        let period = Duration::from_secs_f64(1.0 / f64::from(config.fps.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        Self {
            config,
            sequence: 0,
            interval,
        }
    }

    /// Wait for the next frame slot and render it
    #[instrument(skip(self), level = "trace")]
    pub async fn capture_frame(&mut self) -> Frame {
        self.interval.tick().await;
        self.sequence += 1;
        self.render(self.sequence)
    }

    fn render(&self, sequence: u64) -> Frame {
        let (w, h) = (self.config.width, self.config.height);
        let shift = (sequence % 256) as u32;
        let mut data = Vec::with_capacity(w as usize * h as usize * 3);
        for y in 0..h {
            for x in 0..w {
                data.push(((x * 255 / w.max(1) + shift) % 256) as u8);
                data.push(((y * 255 / h.max(1) + shift) % 256) as u8);
                data.push(shift as u8);
            }
        }
        Frame::new(sequence, w, h, PixelFormat::Rgb24, Bytes::from(data))
    }
}

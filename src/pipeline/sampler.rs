//! Fixed-stride frame selection in front of the scheduler

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use tracing::{info, trace};

use crate::capture::Frame;
use crate::pipeline::scheduler::CandidateSink;

/// Forwards every Kth frame (by sequence number) as an inference candidate.
///
/// `offer` never blocks on the backend: non-selected frames are counted and
/// dropped, selected ones go to the sink, which decides admission on its own.
pub struct FrameSampler {
    every_n: AtomicUsize,
    sink: Arc<dyn CandidateSink>,
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    offered: AtomicU64,
    forwarded: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub offered: u64,
    pub forwarded: u64,
    pub discarded: u64,
}

impl FrameSampler {
    pub fn new(every_n: i64, sink: Arc<dyn CandidateSink>) -> Self {
        Self {
            every_n: AtomicUsize::new(clamp_stride(every_n)),
            sink,
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Returns true if the frame was forwarded as a candidate
    pub fn offer(&self, frame: Frame) -> bool {
        self.stats.offered.fetch_add(1, Ordering::Relaxed);

        let every_n = self.every_n.load(Ordering::Acquire) as u64;
        let seq = frame.sequence();
        if seq == 0 || seq % every_n != 0 {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("scenecast_frames_skipped_total").increment(1);
            return false;
        }

        self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        let outcome = self.sink.submit(frame);
        trace!("Candidate {} -> {:?}", seq, outcome);
        true
    }

    /// Change the stride; values below 1 are clamped to 1.
    /// Takes effect from the next offered frame.
    pub fn set_every_n(&self, every_n: i64) -> usize {
        let stride = clamp_stride(every_n);
        let previous = self.every_n.swap(stride, Ordering::AcqRel);
        if previous != stride {
            info!("Processing every {} frame(s) (was {})", stride, previous);
        }
        stride
    }

    pub fn every_n(&self) -> usize {
        self.every_n.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            offered: self.stats.offered.load(Ordering::Relaxed),
            forwarded: self.stats.forwarded.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
        }
    }
}

fn clamp_stride(every_n: i64) -> usize {
    usize::try_from(every_n).unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use crate::pipeline::scheduler::SubmitOutcome;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u64>>);

    impl CandidateSink for Recorder {
        fn submit(&self, frame: Frame) -> SubmitOutcome {
            self.0.lock().unwrap().push(frame.sequence());
            SubmitOutcome::Accepted
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, 1, 1, PixelFormat::Jpeg, Bytes::new())
    }

    #[test]
    fn stride_of_thirty_over_301_frames() {
        let sink = Arc::new(Recorder::default());
        let sampler = FrameSampler::new(30, sink.clone());

        let forwarded = (1..=301).filter(|seq| sampler.offer(frame(*seq))).count();

        assert_eq!(forwarded, 10);
        assert_eq!(*sink.0.lock().unwrap(), (1..=10).map(|i| i * 30).collect::<Vec<u64>>());
        assert_eq!(
            sampler.stats(),
            SamplerStats {
                offered: 301,
                forwarded: 10,
                discarded: 291
            }
        );
    }

    #[test]
    fn non_positive_stride_forwards_every_frame() {
        let sink = Arc::new(Recorder::default());
        let sampler = FrameSampler::new(0, sink.clone());
        assert_eq!(sampler.every_n(), 1);
        assert_eq!(sampler.set_every_n(-5), 1);
        assert!((1..=5).all(|seq| sampler.offer(frame(seq))));
        assert_eq!(sink.0.lock().unwrap().len(), 5);
    }

    #[test]
    fn stride_change_applies_from_next_frame() {
        let sink = Arc::new(Recorder::default());
        let sampler = FrameSampler::new(10, sink.clone());
        for seq in 1..=15 {
            sampler.offer(frame(seq));
        }
        sampler.set_every_n(4);
        for seq in 16..=24 {
            sampler.offer(frame(seq));
        }
        assert_eq!(*sink.0.lock().unwrap(), vec![10, 16, 20, 24]);
    }
}

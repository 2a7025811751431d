//! Fixed-capacity result history for latency and throughput statistics

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use serde::Serialize;

use crate::inference::SharedResult;

/// Bounded FIFO of the most recent results.
///
/// Pushing into a full window evicts the oldest entry.
pub struct RollingMetrics {
    ring: HeapRb<SharedResult>,
    total_recorded: u64,
}

/// Statistics derived from the current window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub count: usize,
    pub last_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub success_count: usize,
    pub failure_count: usize,
    pub throughput_per_sec: f64,
}

impl RollingMetrics {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            total_recorded: 0,
        }
    }

    /// Record a result, returning the evicted one if the window was full
    pub fn push(&mut self, result: SharedResult) -> Option<SharedResult> {
        self.total_recorded += 1;
        self.ring.push_overwrite(result)
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    /// Results ever recorded, including evicted ones
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &SharedResult> + '_ {
        self.ring.iter()
    }

    pub fn latest(&self) -> Option<&SharedResult> {
        self.ring.iter().last()
    }

    pub fn summary(&self) -> MetricsSummary {
        let count = self.len();
        if count == 0 {
            return MetricsSummary::default();
        }

        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = 0.0_f64;
        let mut success_count = 0;
        for r in self.ring.iter() {
            let ms = r.latency_ms();
            sum += ms;
            min = min.min(ms);
            max = max.max(ms);
            if r.success {
                success_count += 1;
            }
        }

        let throughput_per_sec = match (self.ring.iter().next(), self.latest()) {
            (Some(oldest), Some(newest)) => {
                let span_ms = (newest.completed_at - oldest.requested_at).num_milliseconds();
                if span_ms > 0 {
                    count as f64 * 1000.0 / span_ms as f64
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        MetricsSummary {
            count,
            last_latency_ms: self.latest().map(|r| r.latency_ms()).unwrap_or_default(),
            avg_latency_ms: sum / count as f64,
            min_latency_ms: min,
            max_latency_ms: max,
            success_count,
            failure_count: count - success_count,
            throughput_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, PixelFormat};
    use crate::error::ErrorKind;
    use crate::inference::{InferenceRequest, InferenceResult};
    use crate::prompt::PromptConfig;
    use bytes::Bytes;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn result(seq: u64, latency_ms: u64, ok: bool) -> SharedResult {
        let frame = Frame::new(seq, 1, 1, PixelFormat::Jpeg, Bytes::new());
        let cfg = PromptConfig {
            prompt: "p".into(),
            max_tokens: 1,
            model: "m".into(),
        };
        let req = InferenceRequest::new(frame, &cfg);
        let latency = Duration::from_millis(latency_ms);
        Arc::new(if ok {
            InferenceResult::success(&req, format!("r{seq}"), Utc::now(), latency)
        } else {
            let reason = "down".to_string();
            InferenceResult::failure(&req, ErrorKind::Connection, reason, Utc::now(), latency)
        })
    }

    #[test]
    fn window_keeps_most_recent_entries() {
        let mut metrics = RollingMetrics::new(100);
        for seq in 1..=250 {
            metrics.push(result(seq, 10, true));
        }
        assert_eq!(metrics.len(), 100);
        assert_eq!(metrics.capacity(), 100);
        assert_eq!(metrics.total_recorded(), 250);
        let seqs: Vec<u64> = metrics.iter().map(|r| r.frame_sequence).collect();
        assert_eq!(seqs, (151..=250).collect::<Vec<_>>());
    }

    #[test]
    fn eviction_returns_oldest() {
        let mut metrics = RollingMetrics::new(2);
        assert!(metrics.push(result(1, 1, true)).is_none());
        assert!(metrics.push(result(2, 1, true)).is_none());
        let evicted = metrics.push(result(3, 1, true)).unwrap();
        assert_eq!(evicted.frame_sequence, 1);
    }

    #[test]
    fn summary_over_mixed_results() {
        let mut metrics = RollingMetrics::new(10);
        metrics.push(result(1, 40, true));
        metrics.push(result(2, 60, false));
        metrics.push(result(3, 50, true));
        let s = metrics.summary();
        assert_eq!(s.count, 3);
        assert_eq!(s.success_count, 2);
        assert_eq!(s.failure_count, 1);
        assert!((s.avg_latency_ms - 50.0).abs() < 1e-9);
        assert!((s.min_latency_ms - 40.0).abs() < 1e-9);
        assert!((s.max_latency_ms - 60.0).abs() < 1e-9);
        assert!((s.last_latency_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let metrics = RollingMetrics::new(5);
        assert!(metrics.is_empty());
        assert_eq!(metrics.summary(), MetricsSummary::default());
    }
}

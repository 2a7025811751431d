//! Single-flight admission control for inference calls.
//!
//! At most one backend call is outstanding process-wide. Candidates arriving
//! while a call is in flight are dropped on the spot, never queued, so a slow
//! backend never builds a backlog of stale frames.
//!
//! There is exactly one scheduler per process and every listener shares its
//! state. Isolating tenants would mean keying this state by session and
//! holding one scheduler per session; the admission and fan-out logic would
//! stay as is.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use crossbeam::utils::CachePadded;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, instrument, trace, warn};

use crate::broadcast::{BroadcastHub, ResultEvent};
use crate::capture::Frame;
use crate::error::ErrorKind;
use crate::inference::{InferenceClient, InferenceRequest, InferenceResult, SharedResult};
use crate::pipeline::rolling::{MetricsSummary, RollingMetrics};
use crate::prompt::PromptStore;

/// What happened to a submitted candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// An inference call was started for this frame
    Accepted,
    /// Another call was in flight; the frame was discarded
    DroppedBusy,
}

/// Receiver of candidate frames
pub trait CandidateSink: Send + Sync {
    fn submit(&self, frame: Frame) -> SubmitOutcome;
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub timeout: Duration,
    pub metrics_window: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            metrics_window: 100,
        }
    }
}

/// Point-in-time view of the scheduler state
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub busy: bool,
    pub processed: u64,
    pub dropped: u64,
    pub last_result: Option<SharedResult>,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    dropped: AtomicU64,
}

struct Shared {
    client: Arc<dyn InferenceClient>,
    prompts: Arc<PromptStore>,
    hub: Arc<BroadcastHub>,
    runtime: Handle,

    /// Sole admission gate
    busy: AtomicBool,
    idle: Notify,

    counters: CachePadded<Counters>,
    metrics: Mutex<RollingMetrics>,
    last_result: ArcSwapOption<InferenceResult>,
    timeout_ms: AtomicU64,
}

impl Shared {
    fn metrics(&self) -> MutexGuard<'_, RollingMetrics> {
        self.metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Record, then publish. Runs exactly once per accepted candidate.
    fn complete(&self, result: InferenceResult) {
        let result = Arc::new(result);
        let processed = self.counters.processed.fetch_add(1, Ordering::AcqRel) + 1;

        let summary = {
            let mut metrics = self.metrics();
            metrics.push(result.clone());
            metrics.summary()
        };
        self.last_result.store(Some(result.clone()));

        let outcome = if result.success { "ok" } else { "error" };
        metrics::counter!("scenecast_inference_total", "outcome" => outcome).increment(1);
        metrics::histogram!("scenecast_inference_latency_ms").record(result.latency_ms());

        let event = ResultEvent {
            text: result.text.clone(),
            success: result.success,
            error_kind: result.error_kind,
            error: result.error.clone(),
            latency_ms: result.latency_ms(),
            avg_latency_ms: summary.avg_latency_ms,
            processed_count: processed,
            dropped_count: self.counters.dropped.load(Ordering::Acquire),
            frame_sequence: result.frame_sequence,
            model: result.model.clone(),
            timestamp: result.requested_at,
        };
        self.hub.publish(&event);
    }
}

/// Holds the busy flag for one call; dropping it releases the flag on every
/// exit path, including unwinding out of the backend call.
struct InflightGuard {
    shared: Arc<Shared>,
}

impl InflightGuard {
    fn try_acquire(shared: &Arc<Shared>) -> Option<Self> {
        shared
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                shared: shared.clone(),
            })
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.shared.busy.store(false, Ordering::Release);
        self.shared.idle.notify_waiters();
    }
}

/// Cheap to clone; all clones share the same single-flight state.
#[derive(Clone)]
pub struct InferenceScheduler {
    shared: Arc<Shared>,
}

impl InferenceScheduler {
    /// Must be called from within a Tokio runtime; calls are spawned onto it
    /// whichever thread later submits.
    pub fn new(
        client: Arc<dyn InferenceClient>,
        prompts: Arc<PromptStore>,
        hub: Arc<BroadcastHub>,
        options: SchedulerOptions,
    ) -> Self {
        debug!(
            "Scheduler using {} (timeout {:?}, window {})",
            client.client_name(),
            options.timeout,
            options.metrics_window
        );
        Self {
            shared: Arc::new(Shared {
                client,
                prompts,
                hub,
                runtime: Handle::current(),
                busy: AtomicBool::new(false),
                idle: Notify::new(),
                counters: CachePadded::new(Counters::default()),
                metrics: Mutex::new(RollingMetrics::new(options.metrics_window)),
                last_result: ArcSwapOption::empty(),
                timeout_ms: AtomicU64::new(duration_ms(options.timeout)),
            }),
        }
    }

    /// Try to start an inference call for `frame`.
    ///
    /// Returns immediately. The call runs on the scheduler's runtime, so any
    /// thread may submit, including ones foreign to Tokio.
    pub fn submit(&self, frame: Frame) -> SubmitOutcome {
        let Some(guard) = InflightGuard::try_acquire(&self.shared) else {
            let dropped = self.shared.counters.dropped.fetch_add(1, Ordering::AcqRel) + 1;
            metrics::counter!("scenecast_frames_dropped_busy_total").increment(1);
            trace!("Frame {} dropped while busy ({} total)", frame.sequence(), dropped);
            return SubmitOutcome::DroppedBusy;
        };

        let config = self.shared.prompts.current();
        let request = InferenceRequest::new(frame, &config);
        debug!("Frame {} accepted for inference", request.frame.sequence());

        self.shared.runtime.spawn(run_inference(guard, request));
        SubmitOutcome::Accepted
    }

    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// Resolve once no call is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            busy: self.is_busy(),
            processed: self.shared.counters.processed.load(Ordering::Acquire),
            dropped: self.shared.counters.dropped.load(Ordering::Acquire),
            last_result: self.last_result(),
        }
    }

    pub fn last_result(&self) -> Option<SharedResult> {
        self.shared.last_result.load_full()
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.shared.metrics().summary()
    }

    /// Window contents, oldest first
    pub fn recent_results(&self) -> Vec<SharedResult> {
        self.shared.metrics().iter().cloned().collect()
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout()
    }

    /// Applies from the next accepted call
    pub fn set_timeout(&self, timeout: Duration) {
        self.shared.timeout_ms.store(duration_ms(timeout), Ordering::Relaxed);
        debug!("Inference timeout set to {:?}", timeout);
    }
}

impl CandidateSink for InferenceScheduler {
    fn submit(&self, frame: Frame) -> SubmitOutcome {
        InferenceScheduler::submit(self, frame)
    }
}

#[instrument(skip_all, fields(seq = request.frame.sequence()))]
async fn run_inference(guard: InflightGuard, request: InferenceRequest) {
    let shared = guard.shared.clone();
    let timeout = shared.timeout();

    let requested_at = Utc::now();
    let start = tokio::time::Instant::now();
    // Expiry drops the in-flight future, which aborts the HTTP exchange
    let call = tokio::time::timeout(timeout, shared.client.infer(&request));
    let outcome = AssertUnwindSafe(call).catch_unwind().await;
    let latency = start.elapsed();

    let result = match outcome {
        Ok(Ok(Ok(text))) => InferenceResult::success(&request, text, requested_at, latency),
        Ok(Ok(Err(e))) => {
            warn!("Inference failed after {:?}: {}", latency, e);
            InferenceResult::from_client_error(&request, &e, requested_at, latency)
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!("Inference call panicked after {:?}: {}", latency, reason);
            InferenceResult::failure(
                &request,
                ErrorKind::Panic,
                format!("backend call panicked: {reason}"),
                requested_at,
                latency,
            )
        }
        Ok(Err(_)) => {
            warn!("Inference timed out after {:?}", timeout);
            InferenceResult::failure(
                &request,
                ErrorKind::Timeout,
                format!("no response within {} ms", timeout.as_millis()),
                requested_at,
                latency,
            )
        }
    };

    shared.complete(result);
    // Busy is released only after the result is recorded and published
    drop(guard);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}

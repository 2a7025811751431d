#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use scenecast::pipeline::SchedulerOptions;
use scenecast::{
    BroadcastHub, Frame, FrameSampler, InferenceClient, InferenceError, InferenceRequest,
    InferenceScheduler, PixelFormat, PromptConfig, PromptStore,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn frame(seq: u64) -> Frame {
    Frame::new(seq, 2, 2, PixelFormat::Jpeg, Bytes::from_static(b"\xff\xd8test"))
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Unreachable,
}

/// Backend stand-in with a fixed latency; tracks call concurrency
pub struct MockVlm {
    delay: Duration,
    behavior: Behavior,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockVlm {
    pub fn new(delay_ms: u64, behavior: Behavior) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            behavior,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for MockVlm {
    fn client_name(&self) -> String {
        "mock-vlm".into()
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.behavior {
            Behavior::Succeed => Ok(format!("scene at frame {}", request.frame.sequence())),
            Behavior::Unreachable => Err(InferenceError::Connection("connection refused".into())),
        }
    }
}

pub struct Harness {
    pub client: Arc<MockVlm>,
    pub prompts: Arc<PromptStore>,
    pub hub: Arc<BroadcastHub>,
    pub scheduler: InferenceScheduler,
    pub sampler: Arc<FrameSampler>,
}

pub fn harness(client: MockVlm, every_n: i64, subscriber_buffer: usize) -> Harness {
    let client = Arc::new(client);
    let prompts = Arc::new(
        PromptStore::new(PromptConfig {
            prompt: "Describe the scene.".into(),
            max_tokens: 64,
            model: "test-vlm".into(),
        })
        .expect("valid prompt"),
    );
    let hub = Arc::new(BroadcastHub::new(subscriber_buffer));
    let scheduler = InferenceScheduler::new(
        client.clone(),
        prompts.clone(),
        hub.clone(),
        SchedulerOptions {
            timeout: Duration::from_secs(5),
            metrics_window: 100,
        },
    );
    let sampler = Arc::new(FrameSampler::new(every_n, Arc::new(scheduler.clone())));

    Harness {
        client,
        prompts,
        hub,
        scheduler,
        sampler,
    }
}

//! Live scene description: sample camera frames, run them through a
//! vision-language model one call at a time, and fan the text out to listeners.

pub mod broadcast;
pub mod capture;
pub mod config;
pub mod control;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod prompt;

use serde::{Deserialize, Serialize};

pub use broadcast::{BroadcastHub, ResultEvent, Subscription};
pub use capture::{Frame, PixelFormat};
pub use control::{ControlCommand, Controller};
pub use error::{ConfigError, ControlError, ErrorKind, InferenceError};
pub use inference::{InferenceClient, InferenceRequest, InferenceResult, OpenAiClient};
pub use pipeline::{FrameSampler, InferenceScheduler, RollingMetrics, SubmitOutcome};
pub use prompt::{PromptConfig, PromptStore};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub prompt: PromptSettings,
    pub pipeline: PipelineConfig,
    pub broadcast: BroadcastConfig,
    pub capture: CaptureConfig,
    pub low_power: LowPowerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// OpenAI-compatible API root, e.g. `http://localhost:8000/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub text: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub process_every: u32,
    pub metrics_window: usize,
    pub inference_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Events buffered per subscriber before it counts as stalled
    pub subscriber_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Reduced workload for CPU-only boards (Raspberry Pi and similar)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LowPowerConfig {
    /// `None` means detect from the host
    pub enabled: Option<bool>,
    pub process_every: u32,
    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            api_key: None,
            model: "llama3.2-vision:11b".into(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            text: "Describe what you see in this image in one sentence.".into(),
            max_tokens: 512,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            process_every: 30,
            metrics_window: 100,
            inference_timeout_ms: 30_000,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 16,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for LowPowerConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            process_every: 60,
            max_tokens: 100,
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::capture::Frame;
use crate::error::{ErrorKind, InferenceError};
use crate::prompt::PromptConfig;

/// One attempted call: the frame plus the configuration snapshot taken at start
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub frame: Frame,
    pub prompt: String,
    pub max_tokens: u32,
    pub model: String,
}

impl InferenceRequest {
    pub fn new(frame: Frame, config: &PromptConfig) -> Self {
        Self {
            frame,
            prompt: config.prompt.clone(),
            max_tokens: config.max_tokens,
            model: config.model.clone(),
        }
    }
}

/// Outcome of one completed attempt, success or failure
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub text: String,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub frame_sequence: u64,
    pub model: String,
    pub requested_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(rename = "latency_ms", serialize_with = "serialize_ms")]
    pub latency: Duration,
}

impl InferenceResult {
    pub fn success(
        request: &InferenceRequest,
        text: String,
        requested_at: DateTime<Utc>,
        latency: Duration,
    ) -> Self {
        Self {
            text,
            success: true,
            error_kind: None,
            error: None,
            frame_sequence: request.frame.sequence(),
            model: request.model.clone(),
            requested_at,
            completed_at: Utc::now(),
            latency,
        }
    }

    pub fn failure(
        request: &InferenceRequest,
        kind: ErrorKind,
        error: String,
        requested_at: DateTime<Utc>,
        latency: Duration,
    ) -> Self {
        Self {
            text: String::new(),
            success: false,
            error_kind: Some(kind),
            error: Some(error),
            frame_sequence: request.frame.sequence(),
            model: request.model.clone(),
            requested_at,
            completed_at: Utc::now(),
            latency,
        }
    }

    pub fn from_client_error(
        request: &InferenceRequest,
        err: &InferenceError,
        requested_at: DateTime<Utc>,
        latency: Duration,
    ) -> Self {
        Self::failure(request, err.kind(), err.to_string(), requested_at, latency)
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Shared handle to a recorded result
pub type SharedResult = Arc<InferenceResult>;

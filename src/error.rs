//! Error taxonomy shared across the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single backend call, as reported by an [`InferenceClient`].
///
/// [`InferenceClient`]: crate::inference::InferenceClient
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("backend unreachable: {0}")]
    Connection(String),

    #[error("unexpected response from backend: {0}")]
    Protocol(String),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl InferenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Encode(_) => ErrorKind::Encode,
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_body() {
            Self::Protocol(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// Category of a failed attempt, carried into results and onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Protocol,
    Backend,
    Encode,
    /// The scheduler's per-call bound expired first
    Timeout,
    /// The client panicked mid-call
    Panic,
}

/// Rejected configuration, either at load time or at the control boundary.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("max_tokens must be positive, got {0}")]
    InvalidMaxTokens(i64),

    #[error("sample rate must be at least 1 frame, got {0}")]
    InvalidSampleRate(i64),

    #[error("model identifier must not be empty")]
    EmptyModel,

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Failure to apply a control message; prior configuration is left intact.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("malformed control message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Why a subscriber was dropped from the fan-out set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachableReason {
    /// Outbound buffer full; the subscriber is not draining
    Stalled,
    /// Receiving side is gone
    Disconnected,
}

/// Local to the broadcast hub; never surfaces to the publisher's caller as a failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("subscriber {id} unreachable ({reason:?})")]
pub struct SubscriberUnreachable {
    pub id: u64,
    pub reason: UnreachableReason,
}

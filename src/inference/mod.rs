pub mod client;
pub mod types;
pub mod wire;

pub use client::{InferenceClient, OpenAiClient};
pub use types::{InferenceRequest, InferenceResult, SharedResult};

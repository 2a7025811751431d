use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument};

use super::types::InferenceRequest;
use super::wire::{ChatRequest, ChatResponse, ErrorEnvelope};
use crate::capture::encode;
use crate::error::InferenceError;
use crate::BackendConfig;

/// Sends one (image, prompt) pair to a vision-language model.
///
/// Implementations are stateless: each call stands alone and the caller's
/// model and token budget are forwarded unchanged.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    fn client_name(&self) -> String;

    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

/// Client for any server exposing `POST {base_url}/chat/completions`
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &BackendConfig) -> Result<Self, InferenceError> {
        // No overall timeout here; the scheduler bounds each call.
        let client = Client::builder()
            .user_agent(concat!("scenecast/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| InferenceError::Connection(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        info!("Inference backend: {}", endpoint);

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    fn client_name(&self) -> String {
        format!("openai-compatible ({})", self.endpoint)
    }

    #[instrument(
        skip(self, request),
        fields(seq = request.frame.sequence(), model = %request.model)
    )]
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let image = encode::to_data_uri(&request.frame)?;
        let body = ChatRequest::vision(&request.model, &request.prompt, image, request.max_tokens);

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!("Backend answered {} ({} bytes)", status, bytes.len());

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .map(|env| env.error.into_message())
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
            return Err(InferenceError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| InferenceError::Protocol(format!("invalid completion body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                InferenceError::Protocol("completion contained no message content".into())
            })
    }
}
